//! Query client: list/page/get/patch against the document store.
//!
//! Status handling lives in one place ([`QueryClient::execute`]) so that every
//! caller, the poller included, raises the session signal on 401/403.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::filter::{build_filter, QueryOptions};
use super::page::{ListResponse, PageResult, PageToken, ResourceDescriptor};
use super::{QueryError, Result};
use crate::client::{DocumentStore, StoreRequest, StoreResponse};
use crate::context::ConsoleContext;

const LIMIT_PARAM: &str = "$limit";
const EXPAND_PARAM: &str = "expand";
const DOCUMENT_TYPE_PARAM: &str = "documentType";
const COUNT_PARAM: &str = "$count";
const ORDER_BY_PARAM: &str = "$orderby";
const FILTER_PARAM: &str = "$filter";

#[derive(Clone)]
pub struct QueryClient {
    store: Arc<dyn DocumentStore>,
    context: ConsoleContext,
}

impl QueryClient {
    pub fn new(store: Arc<dyn DocumentStore>, context: ConsoleContext) -> Self {
        Self { store, context }
    }

    pub fn context(&self) -> &ConsoleContext {
        &self.context
    }

    /// Relative list URI, exactly as it would be sent with GET.
    pub fn list_uri(collection_link: &str, options: &QueryOptions, page_limit: usize) -> String {
        let mut params = vec![
            (LIMIT_PARAM, page_limit.to_string()),
            (EXPAND_PARAM, "true".to_string()),
            (DOCUMENT_TYPE_PARAM, "true".to_string()),
            (COUNT_PARAM, "true".to_string()),
        ];
        if let Some(order_by) = &options.order_by {
            params.push((ORDER_BY_PARAM, order_by.clone()));
        }
        if let Some(filter) = build_filter(options) {
            params.push((FILTER_PARAM, filter));
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", collection_link, query)
    }

    /// GET the uri, or reroute it through the long-query endpoint when the
    /// full URL would exceed the configured length.
    pub fn route(&self, uri: String) -> StoreRequest {
        let backend = &self.context.config().backend;
        let full_length = backend.base_url.trim_end_matches('/').len() + uri.len();

        if full_length > backend.max_url_length {
            debug!(
                length = full_length,
                limit = backend.max_url_length,
                "Query URL too long, using long-query endpoint"
            );
            StoreRequest::post(backend.long_query_path.clone(), json!({ "uri": uri }))
        } else {
            StoreRequest::get(uri)
        }
    }

    pub async fn list(
        &self,
        collection_link: &str,
        options: &QueryOptions,
        page_limit: usize,
    ) -> Result<PageResult<ResourceDescriptor>> {
        let uri = Self::list_uri(collection_link, options, page_limit);
        let response = self.execute(self.route(uri)).await?;
        let page = decode::<ListResponse>(&response)?.into_page(page_limit);

        debug!(
            collection = collection_link,
            items = page.items.len(),
            total = page.total_count,
            more = page.has_more(),
            "Loaded page"
        );
        Ok(page)
    }

    pub async fn load_next_page(&self, token: &PageToken) -> Result<PageResult<ResourceDescriptor>> {
        let separator = if token.link.contains('?') { '&' } else { '?' };
        let uri = format!("{}{}{}=true", token.link, separator, DOCUMENT_TYPE_PARAM);

        let response = self.execute(self.route(uri)).await?;
        Ok(decode::<ListResponse>(&response)?.into_page(token.limit))
    }

    pub async fn get_json(&self, uri: &str) -> Result<Value> {
        let response = self.execute(StoreRequest::get(uri)).await?;
        decode(&response)
    }

    pub async fn get_document(&self, link: &str) -> Result<ResourceDescriptor> {
        let document = self.get_json(link).await?;
        Ok(ResourceDescriptor::from_document(link, document))
    }

    /// PATCH a partial body. `Ok(None)` means the backend answered 304: the
    /// document already had these values.
    pub async fn patch_document(&self, link: &str, diff: Value) -> Result<Option<Value>> {
        let response = self.execute(StoreRequest::patch(link, diff)).await?;
        if response.is_not_modified() {
            debug!(link, "Patch was a no-op (304)");
            return Ok(None);
        }
        if response.body.trim().is_empty() {
            return Ok(None);
        }
        decode(&response).map(Some)
    }

    async fn execute(&self, request: StoreRequest) -> Result<StoreResponse> {
        let method = request.method;
        let uri = request.uri.clone();
        let response = self.store.send(request).await?;

        if response.is_success() || response.is_not_modified() {
            return Ok(response);
        }

        if response.is_unauthorized() {
            self.context.session().expire(response.status);
        }

        warn!(method = %method, uri = %uri, status = response.status, "Request failed");
        Err(QueryError::QueryFailed {
            status: response.status,
            body: response.body,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: &StoreResponse) -> Result<T> {
    if response.is_not_modified() {
        return Err(QueryError::QueryFailed {
            status: response.status,
            body: response.body.clone(),
        });
    }
    Ok(serde_json::from_str(&response.body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FakeStore, Method};
    use crate::conf::ConsoleConfig;
    use crate::context::SessionState;
    use crate::query::Occurrence;
    use tokio_test::{assert_err, assert_ok};

    const CONTAINERS: &str = "/resources/container-descriptions";

    fn client_with(store: Arc<FakeStore>) -> QueryClient {
        QueryClient::new(store, ConsoleContext::new(ConsoleConfig::default()))
    }

    fn one_page() -> Value {
        json!({
            "documentLinks": ["/resources/container-descriptions/wp"],
            "documents": {
                "/resources/container-descriptions/wp": {"name": "wordpress"}
            },
            "nextPageLink": "/core/query-page/1?peer=a",
            "totalCount": 3
        })
    }

    // ─────────────────────────────────────────────────────────
    // URI construction
    // ─────────────────────────────────────────────────────────

    #[test]
    fn list_uri_without_filter() {
        let uri = QueryClient::list_uri(CONTAINERS, &QueryOptions::default(), 20);
        assert_eq!(
            uri,
            "/resources/container-descriptions?$limit=20&expand=true&documentType=true&$count=true"
        );
    }

    #[test]
    fn list_uri_encodes_filter_and_order() {
        let options = QueryOptions::new(Occurrence::Any)
            .filter("name", "wp")
            .ordered_by("name asc");
        let uri = QueryClient::list_uri(CONTAINERS, &options, 5);
        assert!(uri.ends_with("&$orderby=name%20asc&$filter=name%20eq%20%27%2Awp%2A%27"));
    }

    // ─────────────────────────────────────────────────────────
    // list / next page
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn list_reassembles_page() {
        let store = Arc::new(FakeStore::new());
        let uri = QueryClient::list_uri(CONTAINERS, &QueryOptions::default(), 1);
        store.respond(Method::Get, &uri, 200, one_page());
        let client = client_with(store.clone());

        let page = assert_ok!(client.list(CONTAINERS, &QueryOptions::default(), 1).await);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].document_id, "wp");
        assert_eq!(page.total_count, 3);
        assert!(page.has_more());
    }

    #[tokio::test]
    async fn next_page_appends_document_type() {
        let store = Arc::new(FakeStore::new());
        store.respond(
            Method::Get,
            "/core/query-page/1?peer=a&documentType=true",
            200,
            json!({"documentLinks": [], "documents": {}, "totalCount": 3}),
        );
        let client = client_with(store.clone());
        let token = PageToken {
            link: "/core/query-page/1?peer=a".to_string(),
            limit: 1,
        };

        let page = assert_ok!(client.load_next_page(&token).await);
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn long_query_is_rerouted_through_post() {
        let store = Arc::new(FakeStore::new());
        store.respond(Method::Post, "/long-uri-get", 200, one_page());
        let client = client_with(store.clone());

        // Pad a single filter value until the encoded URL is 2100 characters
        let base_len = "http://localhost:8282".len();
        let one_char = QueryClient::list_uri(CONTAINERS, &QueryOptions::default().filter("name", "a"), 20);
        let filler = "a".repeat(2100 - base_len - one_char.len() + 1);
        let options = QueryOptions::default().filter("name", filler.as_str());
        let expected_uri = QueryClient::list_uri(CONTAINERS, &options, 20);
        assert_eq!(base_len + expected_uri.len(), 2100);

        let page = assert_ok!(client.list(CONTAINERS, &options, 20).await);
        assert_eq!(page.items.len(), 1);

        let requests = store.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].body, Some(json!({ "uri": expected_uri })));
    }

    #[tokio::test]
    async fn next_page_long_link_is_rerouted() {
        let store = Arc::new(FakeStore::new());
        store.respond(Method::Post, "/long-uri-get", 200, one_page());
        let client = client_with(store.clone());

        let token = PageToken {
            link: format!("/core/query-page/{}", "p".repeat(2000)),
            limit: 20,
        };
        let expected_uri = format!("{}?documentType=true", token.link);

        let page = assert_ok!(client.load_next_page(&token).await);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_page_token.unwrap().limit, 20);

        let requests = store.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].uri, "/long-uri-get");
        assert_eq!(requests[0].body, Some(json!({ "uri": expected_uri })));
    }

    #[tokio::test]
    async fn short_query_stays_get() {
        let store = Arc::new(FakeStore::new());
        let client = client_with(store.clone());
        let request = client.route("/resources/x?$limit=1".to_string());
        assert_eq!(request.method, Method::Get);
        assert!(request.body.is_none());
    }

    // ─────────────────────────────────────────────────────────
    // Failures
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn server_error_surfaces_status_and_body() {
        let store = Arc::new(FakeStore::new());
        store.respond_raw(Method::Get, "/resources/x", 500, "boom");
        let client = client_with(store);

        let err = assert_err!(client.get_json("/resources/x").await);
        match err {
            QueryError::QueryFailed { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_raises_session_signal_and_still_errors() {
        let store = Arc::new(FakeStore::new());
        store.respond_raw(Method::Get, "/resources/x", 401, "");
        let client = client_with(store);
        let session = client.context().session().subscribe();

        let err = assert_err!(client.get_json("/resources/x").await);
        assert!(err.is_session_expired());
        assert_eq!(*session.borrow(), SessionState::Expired { status: 401 });
    }

    #[tokio::test]
    async fn forbidden_raises_session_signal() {
        let store = Arc::new(FakeStore::new());
        store.respond_raw(Method::Get, &QueryClient::list_uri(CONTAINERS, &QueryOptions::default(), 20), 403, "denied");
        let client = client_with(store);
        let session = client.context().session().subscribe();

        let err = assert_err!(client.list(CONTAINERS, &QueryOptions::default(), 20).await);
        assert_eq!(err.status(), Some(403));
        assert!(err.is_session_expired());
        assert_eq!(*session.borrow(), SessionState::Expired { status: 403 });
    }

    #[tokio::test]
    async fn patch_not_modified_is_a_no_op() {
        let store = Arc::new(FakeStore::new());
        store.respond_raw(Method::Patch, "/resources/x", 304, "");
        let client = client_with(store);

        let result = assert_ok!(client.patch_document("/resources/x", json!({"a": 1})).await);
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn patch_returns_updated_document() {
        let store = Arc::new(FakeStore::new());
        store.respond(Method::Patch, "/resources/x", 200, json!({"a": 1}));
        let client = client_with(store);

        let result = assert_ok!(client.patch_document("/resources/x", json!({"a": 1})).await);
        assert_eq!(result, Some(json!({"a": 1})));
    }
}
