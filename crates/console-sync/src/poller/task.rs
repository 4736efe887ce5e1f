//! Task: the cancellable polling loop and its handle.
//!
//! One status request is in flight at a time; the next tick is only awaited
//! after the previous response arrived, however slow the backend is.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::operation::{parse_stage, Operation, Stage};
use super::PollError;
use crate::conf::PollerConfig;
use crate::query::{QueryClient, QueryError};

/// Terminal result of a poll that was not cancelled.
pub type PollOutcome = Result<Value, PollError>;

/// `tokio::time::interval` rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        warn!(?interval, min = ?MIN_INTERVAL, "Poll interval too small, clamping");
        MIN_INTERVAL
    } else {
        interval
    }
}

#[derive(Clone)]
pub struct OperationPoller {
    client: Arc<QueryClient>,
    interval: Duration,
    max_duration: Option<Duration>,
}

impl OperationPoller {
    pub fn new(client: Arc<QueryClient>, config: &PollerConfig) -> Self {
        Self {
            client,
            interval: clamp_interval(config.interval()),
            max_duration: config.max_duration(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = clamp_interval(interval);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `status_url` on a background task.
    pub fn poll(&self, status_url: impl Into<String>) -> PollHandle {
        let status_url = status_url.into();
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(Operation::new(status_url.clone()));

        let worker = PollWorker {
            client: Arc::clone(&self.client),
            interval: self.interval,
            max_duration: self.max_duration,
            status_url,
            cancel: cancel.clone(),
            progress: progress_tx,
        };

        let status_url = worker.status_url.clone();
        PollHandle {
            _guard: cancel.clone().drop_guard(),
            cancel,
            status_url,
            task: tokio::spawn(worker.run()),
            progress: progress_rx,
        }
    }
}

/// Owns the background poll. Dropping the handle, or the future returned by
/// [`PollHandle::outcome`], cancels the worker.
pub struct PollHandle {
    cancel: CancellationToken,
    _guard: DropGuard,
    status_url: String,
    task: JoinHandle<Option<PollOutcome>>,
    progress: watch::Receiver<Operation>,
}

impl PollHandle {
    /// Stop polling at the next tick boundary. A cancelled poll yields no outcome.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest observed operation state.
    pub fn operation(&self) -> Operation {
        self.progress.borrow().clone()
    }

    pub fn progress(&self) -> watch::Receiver<Operation> {
        self.progress.clone()
    }

    /// Wait for the poll to end. `None` means it was cancelled.
    pub async fn outcome(self) -> Option<PollOutcome> {
        let PollHandle {
            _guard,
            status_url,
            task,
            ..
        } = self;
        join_outcome(&status_url, task.await)
    }
}

fn join_outcome(
    status_url: &str,
    joined: Result<Option<PollOutcome>, JoinError>,
) -> Option<PollOutcome> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            error!(status_url, "Poll task panicked: {}", e);
            Some(Err(PollError::TaskFailed {
                status_url: status_url.to_string(),
                detail: e.to_string(),
            }))
        }
        Err(_) => None,
    }
}

struct PollWorker {
    client: Arc<QueryClient>,
    interval: Duration,
    max_duration: Option<Duration>,
    status_url: String,
    cancel: CancellationToken,
    progress: watch::Sender<Operation>,
}

impl PollWorker {
    async fn run(self) -> Option<PollOutcome> {
        debug!(
            status_url = %self.status_url,
            interval_ms = self.interval.as_millis() as u64,
            "Starting operation poll"
        );

        let started = Instant::now();
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(status_url = %self.status_url, "Poll cancelled");
                    return None;
                }
                _ = interval.tick() => {}
            }

            if let Some(limit) = self.max_duration {
                if started.elapsed() >= limit {
                    warn!(status_url = %self.status_url, ?limit, "Poll exceeded maximum duration");
                    return Some(Err(PollError::TimedOut {
                        status_url: self.status_url.clone(),
                        limit,
                    }));
                }
            }

            let response = self.client.get_json(&self.status_url).await;

            // Cooperative: an in-flight read completes, but its result is dropped
            if self.cancel.is_cancelled() {
                debug!(status_url = %self.status_url, "Poll cancelled");
                return None;
            }

            let payload = match response {
                Ok(payload) => payload,
                Err(QueryError::Decode(e)) => {
                    return Some(Err(self.malformed(e.to_string())));
                }
                Err(e) => return Some(Err(PollError::Query(e))),
            };

            let Some(stage) = parse_stage(&payload) else {
                return Some(Err(self.malformed(format!("no recognizable stage in {}", payload))));
            };

            self.progress.send_modify(|op| op.observe(stage, &payload));

            match stage {
                Stage::Created | Stage::Started => {
                    debug!(status_url = %self.status_url, %stage, "Operation pending");
                }
                Stage::Finished => {
                    info!(status_url = %self.status_url, "Operation finished");
                    return Some(Ok(payload));
                }
                Stage::Failed => {
                    let op = self.progress.borrow().clone();
                    warn!(status_url = %self.status_url, failure = op.failure_detail(), "Operation failed");
                    return Some(Err(PollError::OperationFailed(Box::new(op))));
                }
                Stage::Cancelled => {
                    let op = self.progress.borrow().clone();
                    warn!(status_url = %self.status_url, "Operation cancelled by backend");
                    return Some(Err(PollError::OperationCancelled(Box::new(op))));
                }
            }
        }
    }

    fn malformed(&self, detail: String) -> PollError {
        warn!(status_url = %self.status_url, %detail, "Malformed status response");
        PollError::MalformedStatusResponse {
            status_url: self.status_url.clone(),
            detail,
        }
    }
}
