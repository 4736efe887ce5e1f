//! Query module: filter construction, paged list requests and single
//! document reads/patches against the document store.

pub mod client;
pub mod filter;
pub mod page;

pub use client::QueryClient;
pub use filter::{build_filter, Occurrence, QueryOptions, ALL_FIELDS};
pub use page::{document_id, PageResult, PageToken, ResourceDescriptor};

use thiserror::Error;

use crate::client::TransportError;

/// Standard Result type for the query module
pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query failed with status {status}: {body}")]
    QueryFailed { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl QueryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::QueryFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for the 401/403 responses that also raised the session signal.
    pub fn is_session_expired(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
