//! Backup engine orchestration.
//!
//! Drives the paginated catalog API to completion for one storefront:
//! fetch a page, transform it, upsert it atomically, checkpoint, report
//! progress, repeat. Natural completion reconciles removals; every other
//! ending leaves stored products untouched.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::control::{PartialReason, RunControl, RunOutcome, StopRequest};
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::fetcher::{FetchOutcome, PageFetcher};
use crate::model::{now, BackupCursor, BackupStatus, LogLevel, NewLogEntry, Product, Storefront};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::source::{CatalogPage, CatalogSource};
use crate::store::CatalogStore;
use crate::transform::transform_product;
use crate::Result;

/// Backup engine for storefront catalogs
pub struct BackupEngine {
    config: Config,
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn CatalogSource>,
    notifier: Arc<dyn Notifier>,
    checkpoints: CheckpointStore,
}

/// A page that could not be applied, with what to log about it
struct PageFailure {
    reason: PartialReason,
    message: String,
    detail: Option<String>,
}

impl BackupEngine {
    /// Create a new backup engine
    pub fn new(
        config: Config,
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn CatalogSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(store.clone());
        Self {
            config,
            store,
            source,
            notifier,
            checkpoints,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run (or resume) the backup of one storefront.
    ///
    /// Never fails: every failure is converted into a persisted status, a log
    /// entry and, where applicable, a notification.
    pub async fn run(&self, storefront_id: &str, control: &RunControl) -> RunOutcome {
        match self.run_internal(storefront_id, control).await {
            Ok(outcome) => outcome,
            Err(e) => self.handle_failure(storefront_id, e).await,
        }
    }

    async fn run_internal(&self, storefront_id: &str, control: &RunControl) -> Result<RunOutcome> {
        let started = now();

        let mut storefront = self
            .store
            .get_storefront(storefront_id)
            .await?
            .unwrap_or_else(|| Storefront::new(storefront_id, started));
        storefront.backup_status = BackupStatus::InProgress;
        self.store.put_storefront(&storefront).await?;

        let (mut cursor, created) = self.checkpoints.load_or_create(storefront_id, started).await?;
        match &cursor.cursor {
            Some(token) => {
                self.log(
                    storefront_id,
                    LogLevel::Info,
                    "Resuming backup",
                    Some(format!(
                        "cursor={} products_fetched={}",
                        token, cursor.products_fetched
                    )),
                )
                .await
            }
            None if created => {
                self.log(storefront_id, LogLevel::Info, "Backup started", None)
                    .await
            }
            None => {
                self.log(
                    storefront_id,
                    LogLevel::Info,
                    "Restarting backup from the first page",
                    None,
                )
                .await
            }
        }

        let mut fetcher = PageFetcher::new(self.source.clone(), &self.config.rate_limit);

        let stop = loop {
            if let Some(stop) = control.signal().take_stop() {
                break Some(stop);
            }

            let outcome = fetcher
                .fetch_page(storefront_id, cursor.cursor.as_deref())
                .await?;

            let page = match decode_page(outcome) {
                Ok(page) => page,
                Err(failure) => return self.stop_partial(&mut storefront, failure).await,
            };

            self.apply_page(&cursor, &page).await?;

            cursor.products_fetched += page.records.len() as u64;
            if let Some(end_cursor) = &page.end_cursor {
                cursor.cursor = Some(end_cursor.clone());
            }
            if cursor.total_products.is_none() {
                cursor.total_products = page.total_count;
            }
            self.checkpoints.save(&cursor).await?;

            control.report_progress(
                cursor.products_fetched,
                cursor.total_products.unwrap_or(0),
            );

            if !page.has_next_page {
                break None;
            }
        };

        match stop {
            Some(StopRequest::Cancel) => {
                storefront.backup_status = BackupStatus::Partial;
                self.store.put_storefront(&storefront).await?;
                self.checkpoints.clear(storefront_id).await?;
                self.log(
                    storefront_id,
                    LogLevel::Info,
                    "Backup cancelled by user",
                    Some(format!("products_fetched={}", cursor.products_fetched)),
                )
                .await;
                Ok(RunOutcome::Partial(PartialReason::Cancelled))
            }
            Some(StopRequest::Pause) => {
                storefront.backup_status = BackupStatus::Paused;
                self.store.put_storefront(&storefront).await?;
                self.log(
                    storefront_id,
                    LogLevel::Info,
                    format!("Backup paused after {} products", cursor.products_fetched),
                    cursor.cursor.as_ref().map(|c| format!("cursor={}", c)),
                )
                .await;
                Ok(RunOutcome::Paused {
                    products_fetched: cursor.products_fetched,
                })
            }
            None => self.complete(storefront, &cursor).await,
        }
    }

    /// Transform and upsert one page as a single atomic batch, stamped with
    /// the cursor's traversal id
    async fn apply_page(&self, cursor: &BackupCursor, page: &CatalogPage) -> Result<()> {
        let storefront_id = cursor.storefront_id.as_str();
        let written_at = now();
        let products: Vec<Product> = page
            .records
            .iter()
            .filter_map(|raw| transform_product(storefront_id, raw, written_at))
            .map(|mut product| {
                product.traversal_id = Some(cursor.traversal_id.clone());
                product
            })
            .collect();

        let skipped = page.records.len() - products.len();
        if skipped > 0 {
            warn!(
                "{}: skipped {} records without an id",
                storefront_id, skipped
            );
        }

        self.store.upsert_products(&products).await?;

        debug!(
            "{}: applied page of {} records",
            storefront_id,
            page.records.len()
        );
        Ok(())
    }

    /// Natural completion: soft-delete what this traversal did not see,
    /// recompute stats, finalize status.
    async fn complete(&self, mut storefront: Storefront, cursor: &BackupCursor) -> Result<RunOutcome> {
        let completed_at = now();
        let products = self.store.list_products(&storefront.id).await?;

        // Every page of this traversal, including pages applied before a
        // pause or restart, carries the cursor's traversal id.
        let mut removed = Vec::new();
        let mut active_count = 0u64;
        let mut size_bytes = 0u64;
        for mut product in products {
            if !product.is_active() {
                continue;
            }
            if product.traversal_id.as_deref() != Some(cursor.traversal_id.as_str()) {
                product.removed_at = Some(completed_at);
                removed.push(product);
            } else {
                active_count += 1;
                size_bytes += product.estimated_size();
            }
        }

        self.store.upsert_products(&removed).await?;

        storefront.product_count = active_count;
        storefront.size_bytes = size_bytes;
        storefront.backup_status = BackupStatus::Complete;
        storefront.last_backup_at = Some(completed_at);
        self.store.put_storefront(&storefront).await?;
        self.checkpoints.clear(&storefront.id).await?;

        self.log(
            &storefront.id,
            LogLevel::Info,
            format!("Backup complete: {} products", active_count),
            Some(format!(
                "fetched={} removed={} size_bytes={}",
                cursor.products_fetched,
                removed.len(),
                size_bytes
            )),
        )
        .await;

        self.notifier.notify(&Notification::new(
            &storefront.id,
            NotificationKind::Completed {
                products: active_count,
            },
        ));

        Ok(RunOutcome::Completed {
            products: active_count,
            removed: removed.len() as u64,
        })
    }

    /// Stop the run as partial after an API-level failure; the cursor is kept
    async fn stop_partial(
        &self,
        storefront: &mut Storefront,
        failure: PageFailure,
    ) -> Result<RunOutcome> {
        storefront.backup_status = BackupStatus::Partial;
        self.store.put_storefront(storefront).await?;

        self.log(
            &storefront.id,
            LogLevel::Error,
            failure.message.clone(),
            failure.detail,
        )
        .await;

        self.notifier.notify(&Notification::new(
            &storefront.id,
            NotificationKind::Failed {
                message: failure.message,
            },
        ));

        Ok(RunOutcome::Partial(failure.reason))
    }

    /// Classify an unexpected error. Data already written is kept.
    async fn handle_failure(&self, storefront_id: &str, err: crate::Error) -> RunOutcome {
        error!("{}: backup failed: {}", storefront_id, err);

        self.mark_partial(storefront_id).await;

        if err.is_quota_exceeded() {
            self.log(
                storefront_id,
                LogLevel::Error,
                "Storage quota exceeded; products saved so far were kept",
                Some(err.to_string()),
            )
            .await;
            self.notifier.notify(&Notification::new(
                storefront_id,
                NotificationKind::QuotaExceeded,
            ));
            return RunOutcome::Partial(PartialReason::QuotaExceeded);
        }

        self.log(
            storefront_id,
            LogLevel::Error,
            format!("Backup failed: {}", err),
            None,
        )
        .await;
        RunOutcome::Partial(PartialReason::Unexpected(err.to_string()))
    }

    /// Record a run that ended abnormally (its task panicked or was aborted)
    pub(crate) async fn abandon(&self, storefront_id: &str, reason: &str) -> RunOutcome {
        self.mark_partial(storefront_id).await;
        self.log(
            storefront_id,
            LogLevel::Error,
            "Backup aborted unexpectedly",
            Some(reason.to_string()),
        )
        .await;
        RunOutcome::Partial(PartialReason::Unexpected(reason.to_string()))
    }

    async fn mark_partial(&self, storefront_id: &str) {
        let result: Result<()> = async {
            let mut storefront = self
                .store
                .get_storefront(storefront_id)
                .await?
                .unwrap_or_else(|| Storefront::new(storefront_id, now()));
            storefront.backup_status = BackupStatus::Partial;
            self.store.put_storefront(&storefront).await
        }
        .await;

        if let Err(e) = result {
            warn!("{}: could not mark backup partial: {}", storefront_id, e);
        }
    }

    /// Discard the resumable state of a backup that has no run in flight.
    ///
    /// Returns `false` when the storefront had no cursor.
    pub async fn discard_resumable(&self, storefront_id: &str) -> Result<bool> {
        let Some(cursor) = self.store.get_cursor(storefront_id).await? else {
            return Ok(false);
        };

        if let Some(mut storefront) = self.store.get_storefront(storefront_id).await? {
            storefront.backup_status = BackupStatus::Partial;
            self.store.put_storefront(&storefront).await?;
        }
        self.checkpoints.clear(storefront_id).await?;

        self.log(
            storefront_id,
            LogLevel::Info,
            "Backup cancelled by user",
            Some(format!("products_fetched={}", cursor.products_fetched)),
        )
        .await;
        Ok(true)
    }

    /// Mark a backup with no run in flight as paused, keeping its cursor.
    ///
    /// Used when a run stopped because the storefront became unreachable.
    /// Returns `false` when the storefront had no cursor to resume from.
    pub async fn pause_resumable(&self, storefront_id: &str) -> Result<bool> {
        if self.store.get_cursor(storefront_id).await?.is_none() {
            return Ok(false);
        }

        let mut storefront = self
            .store
            .get_storefront(storefront_id)
            .await?
            .unwrap_or_else(|| Storefront::new(storefront_id, now()));
        storefront.backup_status = BackupStatus::Paused;
        self.store.put_storefront(&storefront).await?;
        Ok(true)
    }

    /// Append a persisted log entry and mirror it as a tracing event
    pub async fn log(
        &self,
        storefront_id: &str,
        level: LogLevel,
        message: impl Into<String>,
        detail: Option<String>,
    ) {
        let message = message.into();
        match (level, &detail) {
            (LogLevel::Info, Some(d)) => info!("{}: {} ({})", storefront_id, message, d),
            (LogLevel::Info, None) => info!("{}: {}", storefront_id, message),
            (LogLevel::Warn, Some(d)) => warn!("{}: {} ({})", storefront_id, message, d),
            (LogLevel::Warn, None) => warn!("{}: {}", storefront_id, message),
            (LogLevel::Error, Some(d)) => error!("{}: {} ({})", storefront_id, message, d),
            (LogLevel::Error, None) => error!("{}: {}", storefront_id, message),
        }

        let entry = NewLogEntry {
            storefront_id: storefront_id.to_string(),
            timestamp: now(),
            level,
            message,
            detail,
        };
        if let Err(e) = self.store.append_log(entry).await {
            warn!("{}: failed to persist log entry: {}", storefront_id, e);
        }
    }
}

/// Turn a fetch outcome into an applicable page or the reason the run stops
fn decode_page(outcome: FetchOutcome) -> std::result::Result<CatalogPage, PageFailure> {
    let body = match outcome {
        FetchOutcome::Success(body) => body,
        FetchOutcome::Throttled { waited } => {
            return Err(PageFailure {
                reason: PartialReason::Throttled,
                message: "Rate limit still exceeded after retry".to_string(),
                detail: Some(format!("waited_ms={}", waited.as_millis())),
            })
        }
        FetchOutcome::Failed { status, body } => {
            return Err(PageFailure {
                reason: PartialReason::Api { status },
                message: format!("Catalog API returned HTTP {}", status),
                detail: Some(body.to_string()),
            })
        }
    };

    let Some(page) = CatalogPage::from_body(&body) else {
        return Err(PageFailure {
            reason: PartialReason::MissingData,
            message: "Catalog API response is missing product data".to_string(),
            detail: Some(body.to_string()),
        });
    };

    if page.has_next_page && page.end_cursor.is_none() {
        return Err(PageFailure {
            reason: PartialReason::MissingData,
            message: "Catalog API reported more pages without a continuation cursor".to_string(),
            detail: None,
        });
    }

    Ok(page)
}
