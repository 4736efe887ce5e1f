//! Live: implements `DocumentStore` over HTTP with reqwest.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, PRAGMA};
use tracing::trace;

use super::error::TransportError;
use super::store::{DocumentStore, Method, StoreFuture, StoreRequest, StoreResponse};
use crate::conf::BackendConfig;

/// Asks the backend to refresh its index before answering, so a list issued
/// right after a write observes that write.
const FORCE_INDEX_UPDATE: &str = "xn-force-index-update";

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        if config.base_url.is_empty() {
            return Err(TransportError::InvalidConfig(
                "backend base_url is empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(PRAGMA, HeaderValue::from_static(FORCE_INDEX_UPDATE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: StoreRequest) -> Result<StoreResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.uri);
        trace!(method = %request.method, url = %url, "Sending request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
        };
        let builder = match request.body {
            Some(ref body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(StoreResponse { status, body })
    }
}

impl DocumentStore for HttpStore {
    fn send(&self, request: StoreRequest) -> StoreFuture<'_> {
        Box::pin(self.execute(request))
    }
}
