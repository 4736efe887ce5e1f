//! Fake: test double for document store traffic.
//!
//! Provides a deterministic [`FakeStore`] that implements [`DocumentStore`]
//! from canned responses. Every request is recorded so tests can assert on
//! exactly what went over the wire.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use super::error::TransportError;
use super::store::{DocumentStore, Method, StoreFuture, StoreRequest, StoreResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
enum UriMatch {
    Exact(String),
    Prefix(String),
}

impl UriMatch {
    fn matches(&self, uri: &str) -> bool {
        match self {
            UriMatch::Exact(expected) => expected == uri,
            UriMatch::Prefix(prefix) => uri.starts_with(prefix.as_str()),
        }
    }
}

/// Canned responses for one `(method, uri)` route. The last response repeats.
struct Route {
    method: Method,
    uri: UriMatch,
    responses: VecDeque<StoreResponse>,
}

impl Route {
    fn next_response(&mut self) -> Option<StoreResponse> {
        if self.responses.len() > 1 {
            self.responses.pop_front()
        } else {
            self.responses.front().cloned()
        }
    }
}

#[derive(Default)]
struct Inner {
    routes: Vec<Route>,
    requests: Vec<StoreRequest>,
}

/// A fake document store for deterministic testing.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response for an exact `(method, uri)` match.
    pub fn respond(&self, method: Method, uri: &str, status: u16, body: Value) {
        self.push(method, UriMatch::Exact(uri.to_string()), status, body.to_string());
    }

    /// Queue a JSON response for any uri starting with `prefix`.
    pub fn respond_prefix(&self, method: Method, prefix: &str, status: u16, body: Value) {
        self.push(method, UriMatch::Prefix(prefix.to_string()), status, body.to_string());
    }

    /// Queue a raw (possibly non-JSON) body for an exact match.
    pub fn respond_raw(&self, method: Method, uri: &str, status: u16, body: &str) {
        self.push(method, UriMatch::Exact(uri.to_string()), status, body.to_string());
    }

    fn push(&self, method: Method, uri: UriMatch, status: u16, body: String) {
        let mut inner = self.inner.lock();
        let response = StoreResponse::new(status, body);
        match inner
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.uri == uri)
        {
            Some(route) => route.responses.push_back(response),
            None => inner.routes.push(Route {
                method,
                uri,
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// All requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.inner.lock().requests.clone()
    }

    pub fn request_count(&self, method: Method, uri: &str) -> usize {
        self.inner
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.uri == uri)
            .count()
    }

    fn answer(&self, request: StoreRequest) -> Result<StoreResponse, TransportError> {
        let mut inner = self.inner.lock();
        let found = inner
            .routes
            .iter_mut()
            .find(|r| r.method == request.method && r.uri.matches(&request.uri))
            .and_then(Route::next_response);
        let description = format!("no canned response for {} {}", request.method, request.uri);
        inner.requests.push(request);
        found.ok_or(TransportError::ConnectionFailed(description))
    }
}

impl DocumentStore for FakeStore {
    fn send(&self, request: StoreRequest) -> StoreFuture<'_> {
        let result = self.answer(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_response_repeats() {
        let store = FakeStore::new();
        store.respond(Method::Get, "/a", 200, json!({"n": 1}));
        store.respond(Method::Get, "/a", 200, json!({"n": 2}));

        let first = store.send(StoreRequest::get("/a")).await.unwrap();
        let second = store.send(StoreRequest::get("/a")).await.unwrap();
        let third = store.send(StoreRequest::get("/a")).await.unwrap();

        assert_eq!(first.body, r#"{"n":1}"#);
        assert_eq!(second.body, r#"{"n":2}"#);
        assert_eq!(third.body, r#"{"n":2}"#);
        assert_eq!(store.request_count(Method::Get, "/a"), 3);
    }

    #[tokio::test]
    async fn unmatched_request_is_recorded_and_fails() {
        let store = FakeStore::new();
        store.respond_prefix(Method::Get, "/resources/", 200, json!({}));

        assert!(store.send(StoreRequest::get("/resources/x?y=1")).await.is_ok());
        let err = store
            .send(StoreRequest::patch("/resources/x", json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert_eq!(store.requests().len(), 2);
    }
}
