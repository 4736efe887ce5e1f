//! Poller module: tracks long-running backend operations to a terminal stage.

pub mod operation;
pub mod task;

pub use operation::{count_running, failure_message, parse_stage, Operation, Stage};
pub use task::{OperationPoller, PollHandle, PollOutcome};

use std::time::Duration;
use thiserror::Error;

use crate::query::QueryError;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Operation {} failed: {}", .0.status_url, .0.failure_detail())]
    OperationFailed(Box<Operation>),

    #[error("Operation {} was cancelled by the backend", .0.status_url)]
    OperationCancelled(Box<Operation>),

    #[error("Malformed status response from {status_url}: {detail}")]
    MalformedStatusResponse { status_url: String, detail: String },

    #[error("Polling {status_url} exceeded {limit:?}")]
    TimedOut { status_url: String, limit: Duration },

    #[error("Poll task for {status_url} died: {detail}")]
    TaskFailed { status_url: String, detail: String },

    #[error("Status request failed: {0}")]
    Query(#[from] QueryError),
}

impl PollError {
    /// The last observed operation state, when the backend reported one.
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            PollError::OperationFailed(op) | PollError::OperationCancelled(op) => Some(op),
            _ => None,
        }
    }

    /// Protocol drift is handled exactly like a reported failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PollError::OperationFailed(_)
                | PollError::MalformedStatusResponse { .. }
                | PollError::TaskFailed { .. }
        )
    }
}
