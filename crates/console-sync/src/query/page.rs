//! Page: list response decoding and the normalized paged result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Suffix of a document link after its last `/`.
pub fn document_id(link: &str) -> &str {
    match link.rfind('/') {
        Some(idx) => &link[idx + 1..],
        None => link,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub self_link: String,
    pub document_id: String,
    pub payload: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn from_document(link: &str, document: Value) -> Self {
        let payload = match document {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            self_link: link.to_string(),
            document_id: document_id(link).to_string(),
            payload,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }
}

/// Opaque continuation for the next page: the server's `nextPageLink` plus the
/// limit of the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub link: String,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<PageToken>,
    pub total_count: u64,
}

impl<T> PageResult<T> {
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

impl<T> Default for PageResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_page_token: None,
            total_count: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    document_links: Vec<String>,
    #[serde(default)]
    documents: HashMap<String, Value>,
    #[serde(default)]
    next_page_link: Option<String>,
    #[serde(default)]
    total_count: Option<u64>,
}

impl ListResponse {
    /// Reassemble documents in `documentLinks` order, capped at `limit`.
    pub(crate) fn into_page(self, limit: usize) -> PageResult<ResourceDescriptor> {
        let ListResponse {
            document_links,
            mut documents,
            next_page_link,
            total_count,
        } = self;

        let mut items: Vec<ResourceDescriptor> = document_links
            .iter()
            .filter_map(|link| match documents.remove(link) {
                Some(doc) => Some(ResourceDescriptor::from_document(link, doc)),
                None => {
                    debug!(link = %link, "List response has no document for link");
                    None
                }
            })
            .collect();

        if items.len() > limit {
            warn!(
                returned = items.len(),
                limit, "Backend returned more documents than requested, truncating"
            );
            items.truncate(limit);
        }

        let total_count = total_count.unwrap_or(document_links.len() as u64);
        let next_page_token = next_page_link
            .filter(|link| !link.is_empty())
            .map(|link| PageToken { link, limit });

        PageResult {
            items,
            next_page_token,
            total_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> ListResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn document_id_is_last_segment() {
        assert_eq!(document_id("/resources/containers/abc-123"), "abc-123");
        assert_eq!(document_id("abc"), "abc");
        assert_eq!(document_id("/trailing/"), "");
    }

    #[test]
    fn documents_follow_link_order() {
        let page = response(json!({
            "documentLinks": ["/c/2", "/c/1"],
            "documents": {
                "/c/1": {"name": "one"},
                "/c/2": {"name": "two"}
            },
            "totalCount": 2
        }))
        .into_page(10);

        let names: Vec<_> = page.items.iter().filter_map(|i| i.name()).collect();
        assert_eq!(names, ["two", "one"]);
        assert_eq!(page.items[0].document_id, "2");
        assert_eq!(page.total_count, 2);
        assert!(!page.has_more());
    }

    #[test]
    fn next_page_link_becomes_token() {
        let page = response(json!({
            "documentLinks": ["/c/1"],
            "documents": {"/c/1": {}},
            "nextPageLink": "/core/query-page/42",
            "totalCount": 7
        }))
        .into_page(1);

        assert_eq!(page.items.len(), 1);
        assert_eq!(
            page.next_page_token,
            Some(PageToken {
                link: "/core/query-page/42".to_string(),
                limit: 1
            })
        );
        assert_eq!(page.total_count, 7);
    }

    #[test]
    fn items_never_exceed_limit() {
        let page = response(json!({
            "documentLinks": ["/c/1", "/c/2", "/c/3"],
            "documents": {"/c/1": {}, "/c/2": {}, "/c/3": {}},
            "nextPageLink": ""
        }))
        .into_page(2);

        assert_eq!(page.items.len(), 2);
        assert!(page.next_page_token.is_none());
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn links_without_documents_are_skipped() {
        let page = response(json!({
            "documentLinks": ["/c/1", "/c/missing"],
            "documents": {"/c/1": {"name": "one"}}
        }))
        .into_page(10);

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].self_link, "/c/1");
    }
}
