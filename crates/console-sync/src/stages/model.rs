use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::poller::Stage;

/// Identity of a stage: the same task/sub-stage pair can recur at a later time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageKey {
    pub task_link: String,
    pub sub_stage: String,
    pub update_time_micros: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSource {
    pub task_link: String,
    pub sub_stage: String,
    pub update_time_micros: i64,
}

impl TransitionSource {
    pub fn key(&self) -> StageKey {
        StageKey {
            task_link: self.task_link.clone(),
            sub_stage: self.sub_stage.clone(),
            update_time_micros: self.update_time_micros,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStage {
    pub task_link: String,
    pub sub_stage: String,
    pub stage: Stage,
    pub update_time_micros: i64,
    pub transition_source: Option<TransitionSource>,
}

impl TaskStage {
    pub fn new(
        task_link: impl Into<String>,
        sub_stage: impl Into<String>,
        stage: Stage,
        update_time_micros: i64,
    ) -> Self {
        Self {
            task_link: task_link.into(),
            sub_stage: sub_stage.into(),
            stage,
            update_time_micros,
            transition_source: None,
        }
    }

    pub fn from_source(mut self, source: TransitionSource) -> Self {
        self.transition_source = Some(source);
        self
    }

    pub fn key(&self) -> StageKey {
        StageKey {
            task_link: self.task_link.clone(),
            sub_stage: self.sub_stage.clone(),
            update_time_micros: self.update_time_micros,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Request graph wire format
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestGraphResponse {
    #[serde(default)]
    pub tasks: Vec<TaskHistory>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHistory {
    pub document_self_link: String,
    #[serde(default)]
    stages: Vec<WireStage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStage {
    #[serde(default)]
    task_sub_stage: Value,
    #[serde(default)]
    task_info: Value,
    #[serde(default)]
    document_self_link: Option<String>,
    #[serde(default)]
    document_update_time_micros: i64,
    #[serde(default)]
    transition_source: Option<WireSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSource {
    document_self_link: String,
    #[serde(default)]
    sub_stage: Value,
    #[serde(default)]
    document_update_time_micros: i64,
}

/// Sub-stages are usually enum names, but the backend types them loosely.
fn sub_stage_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl TaskHistory {
    pub fn stages(&self) -> Vec<TaskStage> {
        self.stages
            .iter()
            .filter_map(|wire| {
                let Some(stage) = wire
                    .task_info
                    .get("stage")
                    .and_then(Value::as_str)
                    .and_then(Stage::parse)
                else {
                    debug!(task = %self.document_self_link, "Dropping stage record without a stage");
                    return None;
                };
                let task_link = wire
                    .document_self_link
                    .clone()
                    .unwrap_or_else(|| self.document_self_link.clone());
                Some(TaskStage {
                    task_link,
                    sub_stage: sub_stage_id(&wire.task_sub_stage),
                    stage,
                    update_time_micros: wire.document_update_time_micros,
                    transition_source: wire.transition_source.as_ref().map(|src| TransitionSource {
                        task_link: src.document_self_link.clone(),
                        sub_stage: sub_stage_id(&src.sub_stage),
                        update_time_micros: src.document_update_time_micros,
                    }),
                })
            })
            .collect()
    }
}

impl RequestGraphResponse {
    /// Every stage of every task, in response order.
    pub fn flatten(&self) -> Vec<TaskStage> {
        self.tasks.iter().flat_map(TaskHistory::stages).collect()
    }
}

// ─────────────────────────────────────────────────────────
// Layout output
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageNode {
    pub key: StageKey,
    pub stage: Stage,
    pub label: String,
    pub color: &'static str,
    pub position: Position,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageEdge {
    pub from: StageKey,
    pub to: StageKey,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StageGraph {
    pub nodes: Vec<StageNode>,
    pub edges: Vec<StageEdge>,
    /// Task links in first-placement order; a node's lane is its x / lane width.
    pub lanes: Vec<String>,
    /// Stages left out because their transition source was never placed.
    pub skipped: usize,
}

impl StageGraph {
    pub fn node(&self, key: &StageKey) -> Option<&StageNode> {
        self.nodes.iter().find(|n| &n.key == key)
    }

    pub fn is_complete(&self) -> bool {
        self.skipped == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_request_graph_response() {
        let response: RequestGraphResponse = serde_json::from_value(json!({
            "tasks": [{
                "documentSelfLink": "/request/reservation-tasks/r1",
                "stages": [
                    {
                        "taskSubStage": "CREATED",
                        "taskInfo": {"stage": "CREATED"},
                        "documentUpdateTimeMicros": 100
                    },
                    {
                        "taskSubStage": "RESERVED",
                        "taskInfo": {"stage": "STARTED"},
                        "documentSelfLink": "/request/reservation-tasks/r1",
                        "documentUpdateTimeMicros": 200,
                        "transitionSource": {
                            "documentSelfLink": "/request/reservation-tasks/r1",
                            "subStage": "CREATED",
                            "documentUpdateTimeMicros": 100
                        }
                    },
                    {"taskSubStage": "BROKEN", "taskInfo": {}}
                ]
            }]
        }))
        .unwrap();

        let stages = response.flatten();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].task_link, "/request/reservation-tasks/r1");
        assert_eq!(stages[1].stage, Stage::Started);
        assert_eq!(
            stages[1].transition_source.as_ref().map(TransitionSource::key),
            Some(stages[0].key())
        );
    }

    #[test]
    fn non_string_sub_stage_is_stringified() {
        assert_eq!(sub_stage_id(&json!(3)), "3");
        assert_eq!(sub_stage_id(&json!(null)), "");
    }
}
