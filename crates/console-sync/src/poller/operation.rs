//! Operation: task stage lifecycle and status payload inspection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Created,
    Started,
    Finished,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(Stage::Created),
            "STARTED" => Some(Stage::Started),
            "FINISHED" => Some(Stage::Finished),
            "FAILED" => Some(Stage::Failed),
            "CANCELLED" => Some(Stage::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Created => "CREATED",
            Stage::Started => "STARTED",
            Stage::Finished => "FINISHED",
            Stage::Failed => "FAILED",
            Stage::Cancelled => "CANCELLED",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Stage::Created | Stage::Started)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Stage::Failed | Stage::Cancelled)
    }

    pub fn is_finished(self) -> bool {
        self == Stage::Finished
    }

    pub fn is_terminal(self) -> bool {
        !self.is_running()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a `{taskInfo: {stage}}` status payload.
pub fn parse_stage(payload: &Value) -> Option<Stage> {
    payload
        .get("taskInfo")?
        .get("stage")?
        .as_str()
        .and_then(Stage::parse)
}

/// `taskInfo.failure.message`, if the backend attached one.
pub fn failure_message(payload: &Value) -> Option<String> {
    payload
        .pointer("/taskInfo/failure/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Number of request-status documents still in CREATED or STARTED.
pub fn count_running<'a>(payloads: impl IntoIterator<Item = &'a Value>) -> usize {
    payloads
        .into_iter()
        .filter(|p| parse_stage(p).is_some_and(Stage::is_running))
        .count()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub status_url: String,
    pub stage: Stage,
    pub result: Option<Value>,
    pub failure: Option<String>,
    /// Completed status reads.
    pub ticks: u32,
}

impl Operation {
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            status_url: status_url.into(),
            stage: Stage::Created,
            result: None,
            failure: None,
            ticks: 0,
        }
    }

    pub fn failure_detail(&self) -> &str {
        self.failure.as_deref().unwrap_or("no failure message")
    }

    pub(crate) fn observe(&mut self, stage: Stage, payload: &Value) {
        self.ticks += 1;
        self.stage = stage;
        if stage.is_finished() {
            self.result = Some(payload.clone());
        }
        if stage.is_failed() {
            self.failure = failure_message(payload);
        }
    }
}
