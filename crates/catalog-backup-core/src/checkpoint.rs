//! Backup cursor persistence.
//!
//! Thin adapter over the record store for the per-storefront pagination
//! checkpoint. A cursor exists exactly while a traversal can be resumed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::model::BackupCursor;
use crate::store::CatalogStore;
use crate::Result;

/// Checkpoint store for backup cursors
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn CatalogStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Load the storefront's cursor, or create and persist a fresh one.
    ///
    /// The boolean is `true` when the cursor was newly created.
    pub async fn load_or_create(
        &self,
        storefront_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(BackupCursor, bool)> {
        if let Some(cursor) = self.store.get_cursor(storefront_id).await? {
            return Ok((cursor, false));
        }

        let cursor = BackupCursor::new(storefront_id, now);
        self.store.put_cursor(&cursor).await?;
        debug!("{}: created backup cursor", storefront_id);
        Ok((cursor, true))
    }

    /// Persist the cursor; returns once the write is committed
    pub async fn save(&self, cursor: &BackupCursor) -> Result<()> {
        self.store.put_cursor(cursor).await?;
        debug!(
            "{}: checkpoint at {:?} ({} products)",
            cursor.storefront_id, cursor.cursor, cursor.products_fetched
        );
        Ok(())
    }

    /// Discard the storefront's cursor
    pub async fn clear(&self, storefront_id: &str) -> Result<()> {
        self.store.delete_cursor(storefront_id).await
    }

    /// Every persisted cursor, i.e. every resumable backup
    pub async fn list(&self) -> Result<Vec<BackupCursor>> {
        self.store.list_cursors().await
    }
}
