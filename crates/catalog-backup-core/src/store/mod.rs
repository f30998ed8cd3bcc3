//! Persistent record store.
//!
//! Four collections: storefronts, products (indexed by storefront), backup
//! cursors and append-only log entries. Multi-record writes go through
//! [`CatalogStore::upsert_products`], which is all-or-nothing.

mod memory;
mod sqlite;

pub use memory::MemoryCatalogStore;
pub use sqlite::SqliteCatalogStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{BackupCursor, LogEntry, NewLogEntry, Product, Storefront};
use crate::Result;

/// Trait for record store backends
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Get a storefront by id
    async fn get_storefront(&self, id: &str) -> Result<Option<Storefront>>;

    /// Insert or replace a storefront
    async fn put_storefront(&self, storefront: &Storefront) -> Result<()>;

    /// All known storefronts, ordered by id
    async fn list_storefronts(&self) -> Result<Vec<Storefront>>;

    /// Remove a storefront together with its products, cursor and logs
    async fn delete_storefront(&self, id: &str) -> Result<()>;

    /// Get the backup cursor for a storefront
    async fn get_cursor(&self, storefront_id: &str) -> Result<Option<BackupCursor>>;

    /// Insert or replace a backup cursor
    async fn put_cursor(&self, cursor: &BackupCursor) -> Result<()>;

    /// Delete the backup cursor for a storefront (no-op when absent)
    async fn delete_cursor(&self, storefront_id: &str) -> Result<()>;

    /// All persisted backup cursors
    async fn list_cursors(&self) -> Result<Vec<BackupCursor>>;

    /// Insert or replace products as one atomic batch
    async fn upsert_products(&self, products: &[Product]) -> Result<()>;

    /// All products of a storefront, soft-deleted ones included
    async fn list_products(&self, storefront_id: &str) -> Result<Vec<Product>>;

    /// Append a log entry, returning its assigned id
    async fn append_log(&self, entry: NewLogEntry) -> Result<i64>;

    /// Most recent log entries of a storefront, newest first
    async fn list_logs(&self, storefront_id: &str, limit: usize) -> Result<Vec<LogEntry>>;

    /// Delete log entries older than `before`, returning how many were removed
    async fn prune_logs(&self, before: DateTime<Utc>) -> Result<u64>;
}
