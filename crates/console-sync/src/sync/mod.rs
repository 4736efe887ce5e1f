//! Sync module: the per-screen owner of all view state.
//!
//! The synchronizer issues queries, applies only the newest response per
//! view key, and publishes immutable [`ViewSnapshot`]s on a watch channel.

pub mod generation;
pub mod snapshot;
pub mod synchronizer;

pub use generation::{Generation, GenerationTracker, Ticket};
pub use snapshot::{ListView, OperationOutcome, OperationView, ViewSnapshot};
pub use synchronizer::{AttachmentSources, ListLoad, ViewSynchronizer};

use thiserror::Error;

use crate::poller::PollError;
use crate::query::QueryError;

/// Standard Result type for the sync module
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    #[error("Operation failed: {0}")]
    Poll(#[from] PollError),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}
