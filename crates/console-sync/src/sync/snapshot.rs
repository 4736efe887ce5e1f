use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::attach::AttachmentGraph;
use crate::poller::{count_running, Operation};
use crate::query::{PageToken, ResourceDescriptor};
use crate::stages::StageGraph;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub items: Vec<ResourceDescriptor>,
    pub next_page_token: Option<PageToken>,
    pub total_count: u64,
    pub loading: bool,
    pub error: Option<String>,
}

impl ListView {
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum OperationOutcome {
    Pending,
    Resolved,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationView {
    pub operation: Operation,
    pub outcome: OperationOutcome,
}

/// Immutable view state handed to presentation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub lists: BTreeMap<String, ListView>,
    pub attachments: AttachmentGraph,
    pub attachments_loading: bool,
    pub attachments_error: Option<String>,
    pub stage_graph: Option<StageGraph>,
    pub operations: BTreeMap<String, OperationView>,
}

impl ViewSnapshot {
    pub fn list(&self, key: &str) -> Option<&ListView> {
        self.lists.get(key)
    }

    pub fn operation(&self, key: &str) -> Option<&OperationView> {
        self.operations.get(key)
    }

    /// Items of a list of request statuses that have not reached a terminal stage.
    pub fn running_in(&self, key: &str) -> usize {
        self.lists.get(key).map_or(0, |list| {
            let payloads: Vec<serde_json::Value> = list
                .items
                .iter()
                .map(|item| serde_json::Value::Object(item.payload.clone()))
                .collect();
            count_running(&payloads)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn running_counts_non_terminal_statuses() {
        let mut snapshot = ViewSnapshot::default();
        let items = ["STARTED", "FINISHED", "CREATED", "FAILED"]
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                ResourceDescriptor::from_document(
                    &format!("/request-status/{i}"),
                    json!({"taskInfo": {"stage": stage}}),
                )
            })
            .collect();
        snapshot.lists.insert(
            "requests".to_string(),
            ListView {
                items,
                ..Default::default()
            },
        );

        assert_eq!(snapshot.running_in("requests"), 2);
        assert_eq!(snapshot.running_in("missing"), 0);
    }
}
