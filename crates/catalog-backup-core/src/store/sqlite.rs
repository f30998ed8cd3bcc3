//! SQLite-based record store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::CatalogStore;
use crate::error::StorageError;
use crate::model::{BackupCursor, BackupStatus, LogEntry, LogLevel, NewLogEntry, Product, Storefront};
use crate::{Error, Result};

type StorefrontRow = (String, String, Option<i64>, String, i64, i64, i64);
type CursorRow = (String, Option<String>, String, i64, i64, Option<i64>);
type LogRow = (i64, String, i64, String, String, Option<String>);

/// SQLite-based record store
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Open (or create) the database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        info!("Opened catalog store at {}", db_path.display());
        Ok(store)
    }

    /// Initialize the database schema
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storefronts (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                last_backup_at INTEGER,
                backup_status TEXT NOT NULL DEFAULT 'never',
                product_count INTEGER NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                storefront_id TEXT NOT NULL,
                sniffer_updated_at INTEGER NOT NULL,
                traversal_id TEXT,
                removed_at INTEGER,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backup_cursors (
                storefront_id TEXT PRIMARY KEY,
                cursor TEXT,
                traversal_id TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                products_fetched INTEGER NOT NULL DEFAULT 0,
                total_products INTEGER
            );

            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                storefront_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                detail TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_products_storefront ON products(storefront_id);
            CREATE INDEX IF NOT EXISTS idx_logs_storefront ON logs(storefront_id);
            CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Close the underlying connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Backend(format!("timestamp out of range: {}", millis)).into())
}

fn to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn storefront_from_row(row: StorefrontRow) -> Result<Storefront> {
    let (id, domain, last_backup_at, status, product_count, size_bytes, created_at) = row;
    Ok(Storefront {
        id,
        domain,
        last_backup_at: last_backup_at.map(from_millis).transpose()?,
        backup_status: BackupStatus::from_str(&status).map_err(StorageError::Backend)?,
        product_count: to_u64(product_count),
        size_bytes: to_u64(size_bytes),
        created_at: from_millis(created_at)?,
    })
}

fn cursor_from_row(row: CursorRow) -> Result<BackupCursor> {
    let (storefront_id, cursor, traversal_id, started_at, products_fetched, total_products) = row;
    Ok(BackupCursor {
        storefront_id,
        cursor,
        traversal_id,
        started_at: from_millis(started_at)?,
        products_fetched: to_u64(products_fetched),
        total_products: total_products.map(to_u64),
    })
}

fn log_from_row(row: LogRow) -> Result<LogEntry> {
    let (id, storefront_id, timestamp, level, message, detail) = row;
    Ok(LogEntry {
        id,
        storefront_id,
        timestamp: from_millis(timestamp)?,
        level: LogLevel::from_str(&level).map_err(StorageError::Backend)?,
        message,
        detail,
    })
}

fn products_from_rows(rows: Vec<(String,)>) -> Result<Vec<Product>> {
    rows.into_iter()
        .map(|(data,)| serde_json::from_str(&data).map_err(Error::from))
        .collect()
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn get_storefront(&self, id: &str) -> Result<Option<Storefront>> {
        let row: Option<StorefrontRow> = sqlx::query_as(
            "SELECT id, domain, last_backup_at, backup_status, product_count, size_bytes, created_at FROM storefronts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(storefront_from_row).transpose()
    }

    async fn put_storefront(&self, storefront: &Storefront) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO storefronts (id, domain, last_backup_at, backup_status, product_count, size_bytes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                domain = excluded.domain,
                last_backup_at = excluded.last_backup_at,
                backup_status = excluded.backup_status,
                product_count = excluded.product_count,
                size_bytes = excluded.size_bytes,
                created_at = excluded.created_at
            "#,
        )
        .bind(&storefront.id)
        .bind(&storefront.domain)
        .bind(storefront.last_backup_at.map(|t| t.timestamp_millis()))
        .bind(storefront.backup_status.as_str())
        .bind(storefront.product_count as i64)
        .bind(storefront.size_bytes as i64)
        .bind(storefront.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_storefronts(&self) -> Result<Vec<Storefront>> {
        let rows: Vec<StorefrontRow> = sqlx::query_as(
            "SELECT id, domain, last_backup_at, backup_status, product_count, size_bytes, created_at FROM storefronts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(storefront_from_row).collect()
    }

    async fn delete_storefront(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM products WHERE storefront_id = ?",
            "DELETE FROM backup_cursors WHERE storefront_id = ?",
            "DELETE FROM logs WHERE storefront_id = ?",
            "DELETE FROM storefronts WHERE id = ?",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!("Deleted storefront {} and all of its records", id);
        Ok(())
    }

    async fn get_cursor(&self, storefront_id: &str) -> Result<Option<BackupCursor>> {
        let row: Option<CursorRow> = sqlx::query_as(
            "SELECT storefront_id, cursor, traversal_id, started_at, products_fetched, total_products FROM backup_cursors WHERE storefront_id = ?",
        )
        .bind(storefront_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(cursor_from_row).transpose()
    }

    async fn put_cursor(&self, cursor: &BackupCursor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backup_cursors (storefront_id, cursor, traversal_id, started_at, products_fetched, total_products)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(storefront_id) DO UPDATE SET
                cursor = excluded.cursor,
                traversal_id = excluded.traversal_id,
                started_at = excluded.started_at,
                products_fetched = excluded.products_fetched,
                total_products = excluded.total_products
            "#,
        )
        .bind(&cursor.storefront_id)
        .bind(cursor.cursor.as_deref())
        .bind(&cursor.traversal_id)
        .bind(cursor.started_at.timestamp_millis())
        .bind(cursor.products_fetched as i64)
        .bind(cursor.total_products.map(|t| t as i64))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_cursor(&self, storefront_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM backup_cursors WHERE storefront_id = ?")
            .bind(storefront_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<BackupCursor>> {
        let rows: Vec<CursorRow> = sqlx::query_as(
            "SELECT storefront_id, cursor, traversal_id, started_at, products_fetched, total_products FROM backup_cursors ORDER BY storefront_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(cursor_from_row).collect()
    }

    async fn upsert_products(&self, products: &[Product]) -> Result<()> {
        if products.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for product in products {
            let data = serde_json::to_string(product)?;
            sqlx::query(
                r#"
                INSERT INTO products (id, storefront_id, sniffer_updated_at, traversal_id, removed_at, data)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    storefront_id = excluded.storefront_id,
                    sniffer_updated_at = excluded.sniffer_updated_at,
                    traversal_id = excluded.traversal_id,
                    removed_at = excluded.removed_at,
                    data = excluded.data
                "#,
            )
            .bind(&product.id)
            .bind(&product.storefront_id)
            .bind(product.sniffer_updated_at.timestamp_millis())
            .bind(product.traversal_id.as_deref())
            .bind(product.removed_at.map(|t| t.timestamp_millis()))
            .bind(data)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Upserted {} products", products.len());
        Ok(())
    }

    async fn list_products(&self, storefront_id: &str) -> Result<Vec<Product>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM products WHERE storefront_id = ? ORDER BY id")
                .bind(storefront_id)
                .fetch_all(&self.pool)
                .await?;

        products_from_rows(rows)
    }

    async fn append_log(&self, entry: NewLogEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO logs (storefront_id, timestamp, level, message, detail) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.storefront_id)
        .bind(entry.timestamp.timestamp_millis())
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(entry.detail.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_logs(&self, storefront_id: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, storefront_id, timestamp, level, message, detail FROM logs WHERE storefront_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(storefront_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(log_from_row).collect()
    }

    async fn prune_logs(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM logs WHERE timestamp < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
