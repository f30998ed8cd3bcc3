//! In-memory record store for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::CatalogStore;
use crate::error::StorageError;
use crate::model::{BackupCursor, LogEntry, NewLogEntry, Product, Storefront};
use crate::Result;

#[derive(Default)]
struct Tables {
    storefronts: BTreeMap<String, Storefront>,
    products: BTreeMap<String, Product>,
    cursors: BTreeMap<String, BackupCursor>,
    logs: Vec<LogEntry>,
    next_log_id: i64,
}

/// In-memory record store
///
/// Does not persist data between runs. An optional product capacity makes
/// the store report quota exhaustion the way a full disk would.
#[derive(Default)]
pub struct MemoryCatalogStore {
    tables: Mutex<Tables>,
    product_capacity: Option<usize>,
}

impl MemoryCatalogStore {
    /// Create a new, unbounded in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses writes past `capacity` products
    pub fn with_product_capacity(capacity: usize) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            product_capacity: Some(capacity),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn get_storefront(&self, id: &str) -> Result<Option<Storefront>> {
        Ok(self.tables.lock().storefronts.get(id).cloned())
    }

    async fn put_storefront(&self, storefront: &Storefront) -> Result<()> {
        self.tables
            .lock()
            .storefronts
            .insert(storefront.id.clone(), storefront.clone());
        Ok(())
    }

    async fn list_storefronts(&self) -> Result<Vec<Storefront>> {
        Ok(self.tables.lock().storefronts.values().cloned().collect())
    }

    async fn delete_storefront(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.storefronts.remove(id);
        tables.cursors.remove(id);
        tables.products.retain(|_, p| p.storefront_id != id);
        tables.logs.retain(|l| l.storefront_id != id);
        Ok(())
    }

    async fn get_cursor(&self, storefront_id: &str) -> Result<Option<BackupCursor>> {
        Ok(self.tables.lock().cursors.get(storefront_id).cloned())
    }

    async fn put_cursor(&self, cursor: &BackupCursor) -> Result<()> {
        self.tables
            .lock()
            .cursors
            .insert(cursor.storefront_id.clone(), cursor.clone());
        Ok(())
    }

    async fn delete_cursor(&self, storefront_id: &str) -> Result<()> {
        self.tables.lock().cursors.remove(storefront_id);
        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<BackupCursor>> {
        Ok(self.tables.lock().cursors.values().cloned().collect())
    }

    async fn upsert_products(&self, products: &[Product]) -> Result<()> {
        let mut tables = self.tables.lock();

        if let Some(capacity) = self.product_capacity {
            let new_keys = products
                .iter()
                .filter(|p| !tables.products.contains_key(&p.id))
                .count();
            if tables.products.len() + new_keys > capacity {
                return Err(StorageError::QuotaExceeded(format!(
                    "in-memory store limited to {} products",
                    capacity
                ))
                .into());
            }
        }

        for product in products {
            tables.products.insert(product.id.clone(), product.clone());
        }
        Ok(())
    }

    async fn list_products(&self, storefront_id: &str) -> Result<Vec<Product>> {
        Ok(self
            .tables
            .lock()
            .products
            .values()
            .filter(|p| p.storefront_id == storefront_id)
            .cloned()
            .collect())
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<i64> {
        let mut tables = self.tables.lock();
        tables.next_log_id += 1;
        let id = tables.next_log_id;
        tables.logs.push(LogEntry {
            id,
            storefront_id: entry.storefront_id,
            timestamp: entry.timestamp,
            level: entry.level,
            message: entry.message,
            detail: entry.detail,
        });
        Ok(id)
    }

    async fn list_logs(&self, storefront_id: &str, limit: usize) -> Result<Vec<LogEntry>> {
        Ok(self
            .tables
            .lock()
            .logs
            .iter()
            .rev()
            .filter(|l| l.storefront_id == storefront_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn prune_logs(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock();
        let count = tables.logs.len();
        tables.logs.retain(|l| l.timestamp >= before);
        Ok((count - tables.logs.len()) as u64)
    }
}
