//! Rate-limited page fetching.
//!
//! Wraps a [`CatalogSource`] with the upstream courtesy policy: a fixed delay
//! before every request after the first, and a single bounded retry when the
//! API reports that the rate budget is exhausted.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::source::{CatalogSource, RawResponse};
use crate::Result;

/// Classified result of fetching one page
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 2xx without an error payload
    Success(Value),
    /// Still throttled after the one permitted retry
    Throttled {
        /// Wait applied before the retry
        waited: Duration,
    },
    /// Any other non-success response, surfaced verbatim
    Failed { status: u16, body: Value },
}

/// Fetches pages for one backup run, honoring the courtesy delay and
/// throttle backoff.
pub struct PageFetcher {
    source: Arc<dyn CatalogSource>,
    courtesy_delay: Duration,
    default_throttle_wait: Duration,
    requests_issued: u64,
}

impl PageFetcher {
    pub fn new(source: Arc<dyn CatalogSource>, config: &RateLimitConfig) -> Self {
        Self {
            source,
            courtesy_delay: config.courtesy_delay(),
            default_throttle_wait: config.default_throttle_wait(),
            requests_issued: 0,
        }
    }

    /// Number of requests sent so far, retries included
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }

    /// Fetch the page after `cursor`.
    ///
    /// Transport failures are returned as errors; every HTTP-level outcome
    /// is returned as a [`FetchOutcome`].
    pub async fn fetch_page(
        &mut self,
        storefront_id: &str,
        cursor: Option<&str>,
    ) -> Result<FetchOutcome> {
        let response = self.request(storefront_id, cursor).await?;
        if !response.is_throttled() {
            return Ok(classify(response));
        }

        let wait = response.retry_after.unwrap_or(self.default_throttle_wait);
        warn!(
            "{}: throttled by catalog API (status {}), retrying once in {:?}",
            storefront_id, response.status, wait
        );
        tokio::time::sleep(wait).await;

        let retry = self.send(storefront_id, cursor).await?;
        if retry.is_throttled() {
            warn!("{}: still throttled after retry", storefront_id);
            return Ok(FetchOutcome::Throttled { waited: wait });
        }

        Ok(classify(retry))
    }

    /// Issue one request, applying the courtesy delay to all but the first
    async fn request(&mut self, storefront_id: &str, cursor: Option<&str>) -> Result<RawResponse> {
        if self.requests_issued > 0 && !self.courtesy_delay.is_zero() {
            debug!("Courtesy delay {:?} before next page", self.courtesy_delay);
            tokio::time::sleep(self.courtesy_delay).await;
        }
        self.send(storefront_id, cursor).await
    }

    async fn send(&mut self, storefront_id: &str, cursor: Option<&str>) -> Result<RawResponse> {
        self.requests_issued += 1;
        self.source.fetch(storefront_id, cursor).await
    }
}

fn classify(response: RawResponse) -> FetchOutcome {
    if response.is_success() && !response.has_errors() {
        FetchOutcome::Success(response.body)
    } else {
        FetchOutcome::Failed {
            status: response.status,
            body: response.body,
        }
    }
}
