//! Paginated catalog sources.
//!
//! A [`CatalogSource`] issues exactly one request per call and reports the
//! transport status, the decoded body and any `Retry-After` hint. Rate
//! limiting and retry policy live in [`crate::fetcher`].

mod http;

pub use http::{HttpCatalogSource, PRODUCTS_QUERY};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::Result;

/// Error code the Storefront API uses to signal an exhausted rate budget
pub const THROTTLED_CODE: &str = "THROTTLED";

/// One raw response from the catalog API
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Transport status code
    pub status: u16,
    /// Decoded body; an empty object when the body was not valid JSON
    pub body: Value,
    /// Server-provided wait before retrying
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Throttled by status (429) or by a payload error marker
    pub fn is_throttled(&self) -> bool {
        self.status == 429 || has_throttled_marker(&self.body)
    }

    /// A payload carrying a non-empty `errors` array
    pub fn has_errors(&self) -> bool {
        self.body
            .get("errors")
            .and_then(Value::as_array)
            .is_some_and(|errors| !errors.is_empty())
    }
}

fn has_throttled_marker(body: &Value) -> bool {
    let Some(errors) = body.get("errors").and_then(Value::as_array) else {
        return false;
    };
    errors.iter().any(|error| {
        let code = error
            .get("code")
            .or_else(|| error.get("extensions").and_then(|e| e.get("code")));
        code.and_then(Value::as_str) == Some(THROTTLED_CODE)
    })
}

/// Trait for paginated catalog sources
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Request the page that follows `cursor` (the first page when `None`)
    async fn fetch(&self, storefront_id: &str, cursor: Option<&str>) -> Result<RawResponse>;
}

/// A successfully decoded page of product records
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPage {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
    pub records: Vec<Value>,
    /// Only reported on the first page
    pub total_count: Option<u64>,
}

impl CatalogPage {
    /// Extract the `data.products` connection from a response body.
    ///
    /// Returns `None` when the expected payload is missing.
    pub fn from_body(body: &Value) -> Option<Self> {
        let products = body.get("data")?.get("products")?;
        if !products.is_object() {
            return None;
        }

        let page_info = products.get("pageInfo");
        let has_next_page = page_info
            .and_then(|p| p.get("hasNextPage"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let end_cursor = page_info
            .and_then(|p| p.get("endCursor"))
            .and_then(Value::as_str)
            .map(String::from);

        let records = if let Some(nodes) = products.get("nodes").and_then(Value::as_array) {
            nodes.clone()
        } else if let Some(edges) = products.get("edges").and_then(Value::as_array) {
            edges.iter().filter_map(|e| e.get("node").cloned()).collect()
        } else {
            return None;
        };

        Some(Self {
            has_next_page,
            end_cursor,
            records,
            total_count: products.get("totalCount").and_then(Value::as_u64),
        })
    }
}
