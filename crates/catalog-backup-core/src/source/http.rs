//! Storefront GraphQL catalog source over HTTP.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{CatalogSource, RawResponse};
use crate::config::ApiConfig;
use crate::{Error, Result};

/// Products query issued for every page.
///
/// The Storefront API's product connection has no `totalCount` field, so
/// runs against it report progress without an estimate (0). Sources that do
/// return `totalCount` on a page get it picked up by [`super::CatalogPage`].
pub const PRODUCTS_QUERY: &str = r#"
query CatalogBackupProducts($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id
      handle
      title
      vendor
      productType
      description
      tags
      availableForSale
      createdAt
      updatedAt
      priceRange {
        minVariantPrice { amount currencyCode }
        maxVariantPrice { amount currencyCode }
      }
      images(first: 250) {
        nodes { id url altText width height }
      }
      variants(first: 250) {
        nodes {
          id
          title
          sku
          availableForSale
          price { amount currencyCode }
          compareAtPrice { amount currencyCode }
          selectedOptions { name value }
          image { id url altText width height }
        }
      }
    }
  }
}
"#;

/// Catalog source backed by the public Storefront GraphQL endpoint
pub struct HttpCatalogSource {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpCatalogSource {
    /// Create a new HTTP catalog source
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Endpoint for a storefront, derived from its id unless a base URL is configured
    pub fn endpoint(&self, storefront_id: &str) -> String {
        let base = match &self.config.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", storefront_id),
        };
        format!("{}/api/{}/graphql.json", base, self.config.api_version)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self, storefront_id: &str, cursor: Option<&str>) -> Result<RawResponse> {
        let url = self.endpoint(storefront_id);
        let payload = json!({
            "query": PRODUCTS_QUERY,
            "variables": {
                "first": self.config.page_size,
                "after": cursor,
            }
        });

        debug!("POST {} (after={:?})", url, cursor);

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await?;

        let body = match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    "Unparseable response body from {} (status {}): {}",
                    url, status, e
                );
                json!({})
            }
        };

        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// `Retry-After` in whole or fractional seconds; HTTP-date values are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = value.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_millis((secs * 1000.0) as u64))
    } else {
        None
    }
}
