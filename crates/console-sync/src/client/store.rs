//! Store trait: abstract interface for all document store traffic.
//!
//! `live.rs` provides the reqwest-backed implementation.
//! `fake.rs` provides a test double.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    pub method: Method,
    /// Path and query string relative to the backend base URL.
    pub uri: String,
    pub body: Option<Value>,
}

impl StoreRequest {
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            uri: uri.into(),
            body: None,
        }
    }

    pub fn post(uri: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            uri: uri.into(),
            body: Some(body),
        }
    }

    pub fn patch(uri: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Patch,
            uri: uri.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResponse {
    pub status: u16,
    pub body: String,
}

impl StoreResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, 401 | 403)
    }
}

pub type StoreFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StoreResponse, TransportError>> + Send + 'a>>;

/// Unified async interface over the document store.
///
/// Object-safe thanks to the boxed future return.
/// Implementations must be `Send + Sync` so they can live behind `Arc<dyn DocumentStore>`.
pub trait DocumentStore: Send + Sync {
    fn send(&self, request: StoreRequest) -> StoreFuture<'_>;
}
