use chrono::Utc;
use futures::future::{join_all, try_join3};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::generation::{GenerationTracker, Ticket};
use super::snapshot::{OperationOutcome, OperationView, ViewSnapshot};
use super::Result;
use crate::attach::{patch_body, AttachmentEngine, PrimaryDescriptor, SharedDescriptor, SharedKind};
use crate::poller::{Operation, OperationPoller};
use crate::query::{self, PageResult, QueryClient, QueryOptions, ResourceDescriptor};
use crate::stages::{RequestGraphResponse, StageGraphBuilder, TaskStage};

const ATTACHMENTS_KEY: &str = "attachments";
const STAGES_KEY: &str = "stages";

fn operation_key(key: &str) -> String {
    format!("operation:{}", key)
}

fn patch_key(primary_link: &str) -> String {
    format!("patch:{}", primary_link)
}

/// One list to load as part of [`ViewSynchronizer::load_all`].
#[derive(Debug, Clone)]
pub struct ListLoad {
    pub key: String,
    pub collection: String,
    pub options: QueryOptions,
    pub limit: usize,
}

impl ListLoad {
    pub fn new(key: impl Into<String>, collection: impl Into<String>, limit: usize) -> Self {
        Self {
            key: key.into(),
            collection: collection.into(),
            options: QueryOptions::default(),
            limit,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// Collections read by [`ViewSynchronizer::load_attachments`].
#[derive(Debug, Clone)]
pub struct AttachmentSources {
    pub primaries: String,
    pub networks: String,
    pub volumes: String,
}

impl Default for AttachmentSources {
    fn default() -> Self {
        Self {
            primaries: "/resources/container-descriptions".to_string(),
            networks: "/resources/container-network-descriptions".to_string(),
            volumes: "/resources/container-volume-descriptions".to_string(),
        }
    }
}

#[derive(Default)]
struct SyncState {
    snapshot: ViewSnapshot,
    engine: AttachmentEngine,
}

pub struct ViewSynchronizer {
    client: Arc<QueryClient>,
    poller: OperationPoller,
    stage_builder: StageGraphBuilder,
    generations: GenerationTracker,
    state: Mutex<SyncState>,
    publisher: watch::Sender<Arc<ViewSnapshot>>,
    polls: Mutex<HashMap<String, CancellationToken>>,
}

impl ViewSynchronizer {
    pub fn new(client: Arc<QueryClient>) -> Self {
        let config = client.context().config();
        let poller = OperationPoller::new(Arc::clone(&client), &config.poller);
        let stage_builder = StageGraphBuilder::new(config.stages);
        let (publisher, _) = watch::channel(Arc::new(ViewSnapshot::default()));

        Self {
            client,
            poller,
            stage_builder,
            generations: GenerationTracker::new(),
            state: Mutex::new(SyncState::default()),
            publisher,
            polls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_poller(mut self, poller: OperationPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewSnapshot>> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> Arc<ViewSnapshot> {
        self.publisher.borrow().clone()
    }

    /// Tag a request for `key`; any earlier ticket for that key becomes stale.
    pub fn begin(&self, key: &str) -> Ticket {
        self.generations.begin(key)
    }

    /// Mutate state and publish the result as a new snapshot version.
    fn update<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        state.snapshot.version += 1;
        state.snapshot.updated_at = Some(Utc::now());
        self.publisher.send_replace(Arc::new(state.snapshot.clone()));
        result
    }

    // ─────────────────────────────────────────────────────────
    // Lists
    // ─────────────────────────────────────────────────────────

    pub async fn load_list(
        &self,
        key: &str,
        collection: &str,
        options: &QueryOptions,
        limit: usize,
    ) -> Result<bool> {
        let ticket = self.begin(key);
        self.mark_loading(key);
        let result = self.client.list(collection, options, limit).await;
        self.apply(&ticket, result, false)
    }

    /// Load several lists concurrently; results come back in input order.
    pub async fn load_all(&self, loads: &[ListLoad]) -> Vec<Result<bool>> {
        join_all(
            loads
                .iter()
                .map(|load| self.load_list(&load.key, &load.collection, &load.options, load.limit)),
        )
        .await
    }

    /// Append the next page of `key`. `Ok(false)` when there is no next page.
    pub async fn load_next_page(&self, key: &str) -> Result<bool> {
        let token = self
            .snapshot()
            .list(key)
            .and_then(|list| list.next_page_token.clone());
        let Some(token) = token else {
            debug!(key, "No next page to load");
            return Ok(false);
        };

        let ticket = self.begin(key);
        self.mark_loading(key);
        let result = self.client.load_next_page(&token).await;
        self.apply(&ticket, result, true)
    }

    /// Apply a list result as a full replacement. Stale tickets are ignored,
    /// errors included, and return `Ok(false)`.
    pub fn apply_page(
        &self,
        ticket: &Ticket,
        result: query::Result<PageResult<ResourceDescriptor>>,
    ) -> Result<bool> {
        self.apply(ticket, result, false)
    }

    fn mark_loading(&self, key: &str) {
        self.update(|state| {
            let list = state.snapshot.lists.entry(key.to_string()).or_default();
            list.loading = true;
            list.error = None;
        });
    }

    fn apply(
        &self,
        ticket: &Ticket,
        result: query::Result<PageResult<ResourceDescriptor>>,
        merge: bool,
    ) -> Result<bool> {
        if !self.generations.is_current(ticket) {
            debug!(key = %ticket.key, generation = %ticket.generation, "Discarding stale list response");
            return Ok(false);
        }

        match result {
            Ok(page) => {
                self.update(|state| {
                    let list = state.snapshot.lists.entry(ticket.key.clone()).or_default();
                    if merge {
                        merge_items(&mut list.items, page.items);
                    } else {
                        list.items = page.items;
                    }
                    list.next_page_token = page.next_page_token;
                    list.total_count = page.total_count;
                    list.loading = false;
                    list.error = None;
                });
                Ok(true)
            }
            Err(e) => {
                warn!(key = %ticket.key, error = %e, "List load failed");
                self.update(|state| {
                    let list = state.snapshot.lists.entry(ticket.key.clone()).or_default();
                    list.loading = false;
                    list.error = Some(e.to_string());
                });
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Attachments
    // ─────────────────────────────────────────────────────────

    /// Load every page of the primaries and the shared catalog, then rebuild
    /// the graph. A partial catalog would turn valid links into dangling ones,
    /// so any failed page fails the whole load.
    pub async fn load_attachments(&self, sources: &AttachmentSources, limit: usize) -> Result<bool> {
        let ticket = self.begin(ATTACHMENTS_KEY);
        self.update(|state| {
            state.snapshot.attachments_loading = true;
            state.snapshot.attachments_error = None;
        });

        let result = try_join3(
            self.list_all(&sources.primaries, limit),
            self.list_all(&sources.networks, limit),
            self.list_all(&sources.volumes, limit),
        )
        .await;

        if !self.generations.is_current(&ticket) {
            debug!("Discarding stale attachment load");
            return Ok(false);
        }
        let (primaries, networks, volumes) = match result {
            Ok(collections) => collections,
            Err(e) => {
                warn!(error = %e, "Attachment load failed");
                self.update(|state| {
                    state.snapshot.attachments_loading = false;
                    state.snapshot.attachments_error = Some(e.to_string());
                });
                return Err(e.into());
            }
        };

        let primaries = primaries.iter().map(PrimaryDescriptor::from_resource).collect();
        let catalog = networks
            .iter()
            .map(|r| SharedDescriptor::from_resource(r, SharedKind::Network))
            .chain(
                volumes
                    .iter()
                    .map(|r| SharedDescriptor::from_resource(r, SharedKind::Volume)),
            )
            .collect();

        self.set_attachments(primaries, catalog);
        Ok(true)
    }

    /// Every item of a collection, following next-page links to the end.
    async fn list_all(&self, collection: &str, limit: usize) -> query::Result<Vec<ResourceDescriptor>> {
        let mut page = self.client.list(collection, &QueryOptions::default(), limit).await?;
        let mut items = std::mem::take(&mut page.items);

        while let Some(token) = page.next_page_token.take() {
            page = self.client.load_next_page(&token).await?;
            merge_items(&mut items, std::mem::take(&mut page.items));
            if page.next_page_token.as_ref() == Some(&token) {
                warn!(collection, link = %token.link, "Next page link does not advance, stopping");
                break;
            }
        }

        debug!(collection, items = items.len(), "Loaded full collection");
        Ok(items)
    }

    pub fn set_attachments(&self, primaries: Vec<PrimaryDescriptor>, catalog: Vec<SharedDescriptor>) {
        self.update(|state| {
            state.engine = AttachmentEngine::new(primaries, catalog);
            state.snapshot.attachments = state.engine.graph().clone();
            state.snapshot.attachments_loading = false;
            state.snapshot.attachments_error = None;
        });
    }

    /// Attach locally, publish, then PATCH the primary. `Ok(false)` when the
    /// edge already existed and nothing was sent.
    pub async fn attach(&self, primary_link: &str, shared_link: &str) -> Result<bool> {
        self.change_attachment(primary_link, |engine| engine.attach(primary_link, shared_link))
            .await
    }

    pub async fn detach(&self, primary_link: &str, shared_link: &str) -> Result<bool> {
        self.change_attachment(primary_link, |engine| engine.detach(primary_link, shared_link))
            .await
    }

    async fn change_attachment(
        &self,
        primary_link: &str,
        change: impl FnOnce(&mut AttachmentEngine) -> bool,
    ) -> Result<bool> {
        let body = {
            let mut state = self.state.lock();
            if !change(&mut state.engine) {
                return Ok(false);
            }
            state.engine.primary(primary_link).map(patch_body)
        };
        let Some(body) = body else {
            return Ok(false);
        };

        let ticket = self.begin(&patch_key(primary_link));
        self.update(|state| state.snapshot.attachments = state.engine.graph().clone());

        match self.client.patch_document(primary_link, body).await {
            Ok(Some(document)) if self.generations.is_current(&ticket) => {
                let resource = ResourceDescriptor::from_document(primary_link, document);
                self.update(|state| {
                    state.engine.upsert_primary(PrimaryDescriptor::from_resource(&resource));
                    state.snapshot.attachments = state.engine.graph().clone();
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(primary = primary_link, error = %e, "Attachment patch failed");
                return Err(e.into());
            }
        }
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────

    /// Poll `status_url` to completion, mirroring progress into the snapshot
    /// under `key`. `Ok(None)` means the poll was cancelled.
    pub async fn await_operation(&self, key: &str, status_url: &str) -> Result<Option<Value>> {
        let ticket = self.begin(&operation_key(key));
        let handle = self.poller.poll(status_url);
        if let Some(previous) = self
            .polls
            .lock()
            .insert(key.to_string(), handle.cancellation_token())
        {
            previous.cancel();
        }
        self.update(|state| {
            state.snapshot.operations.insert(
                key.to_string(),
                OperationView {
                    operation: Operation::new(status_url),
                    outcome: OperationOutcome::Pending,
                },
            );
        });

        let mut progress = handle.progress();
        let outcome = handle.outcome();
        tokio::pin!(outcome);
        let mut watching = true;

        let outcome = loop {
            tokio::select! {
                result = &mut outcome => break result,
                changed = progress.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let operation = progress.borrow_and_update().clone();
                    self.record_operation(&ticket, key, operation, None);
                }
            }
        };

        let operation = progress.borrow().clone();
        if self.generations.is_current(&ticket) {
            self.polls.lock().remove(key);
        }

        match outcome {
            None => {
                debug!(key, "Operation poll cancelled");
                Ok(None)
            }
            Some(Ok(result)) => {
                info!(key, status_url, "Operation resolved");
                self.record_operation(&ticket, key, operation, Some(OperationOutcome::Resolved));
                Ok(Some(result))
            }
            Some(Err(e)) => {
                let reason = e.to_string();
                self.record_operation(&ticket, key, operation, Some(OperationOutcome::Rejected { reason }));
                Err(e.into())
            }
        }
    }

    fn record_operation(
        &self,
        ticket: &Ticket,
        key: &str,
        operation: Operation,
        outcome: Option<OperationOutcome>,
    ) {
        if !self.generations.is_current(ticket) {
            return;
        }
        self.update(|state| {
            if let Some(view) = state.snapshot.operations.get_mut(key) {
                view.operation = operation;
                if let Some(outcome) = outcome {
                    view.outcome = outcome;
                }
            }
        });
    }

    /// Stop polling `key` and drop it from the snapshot. Returns `false` when
    /// no poll was running.
    pub fn cancel_operation(&self, key: &str) -> bool {
        let Some(token) = self.polls.lock().remove(key) else {
            return false;
        };
        token.cancel();
        self.generations.invalidate(&operation_key(key));
        self.update(|state| {
            state.snapshot.operations.remove(key);
        });
        debug!(key, "Operation cancelled");
        true
    }

    // ─────────────────────────────────────────────────────────
    // Stage graph
    // ─────────────────────────────────────────────────────────

    pub async fn load_stage_graph(&self, request_id: &str) -> Result<bool> {
        let ticket = self.begin(STAGES_KEY);
        let path = &self.client.context().config().backend.request_graph_path;
        let uri = format!("{}?requestId={}", path, urlencoding::encode(request_id));

        let result = self.client.get_json(&uri).await;
        if !self.generations.is_current(&ticket) {
            debug!(request_id, "Discarding stale request graph");
            return Ok(false);
        }

        let response: RequestGraphResponse = serde_json::from_value(result?)?;
        let stages = response.flatten();
        debug!(request_id, tasks = response.tasks.len(), stages = stages.len(), "Loaded request graph");
        self.apply_stages(&stages);
        Ok(true)
    }

    /// Rebuild the stage graph wholesale from `stages`.
    pub fn apply_stages(&self, stages: &[TaskStage]) {
        let graph = self.stage_builder.build(stages);
        if graph.skipped > 0 {
            debug!(skipped = graph.skipped, "Stage graph is incomplete");
        }
        self.update(|state| state.snapshot.stage_graph = Some(graph));
    }

    /// Cancel running polls, forget pending requests and reset the view.
    pub fn close(&self) {
        for (_, token) in self.polls.lock().drain() {
            token.cancel();
        }
        self.generations.clear();
        self.update(|state| {
            let version = state.snapshot.version;
            *state = SyncState::default();
            state.snapshot.version = version;
        });
        debug!("View synchronizer closed");
    }
}

impl Drop for ViewSynchronizer {
    fn drop(&mut self) {
        for (_, token) in self.polls.get_mut().drain() {
            token.cancel();
        }
    }
}

/// Append `incoming`, keeping the first occurrence of each self link.
fn merge_items(items: &mut Vec<ResourceDescriptor>, incoming: Vec<ResourceDescriptor>) {
    for item in incoming {
        if !items.iter().any(|existing| existing.self_link == item.self_link) {
            items.push(item);
        }
    }
}
