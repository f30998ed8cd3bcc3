//! Catalog Backup Core Library
//!
//! This crate backs up the public product catalog of a storefront into a
//! local SQLite store, page by page, with a persisted cursor so a backup can
//! be paused, survive a crash and pick up where it left off.

pub mod backup;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod notify;
pub mod recovery;
pub mod source;
pub mod store;
pub mod transform;

pub use backup::{
    no_progress, BackupEngine, BackupManager, PartialReason, ProgressFn, RunHandle, RunOutcome,
};
pub use checkpoint::CheckpointStore;
pub use config::Config;
pub use error::{Error, Result, StorageError};
pub use model::{BackupCursor, BackupStatus, LogEntry, LogLevel, Product, Storefront};
pub use notify::{Notification, NotificationKind, Notifier, TracingNotifier};
pub use recovery::{
    schedule_offline_retry, ConnectivityProbe, HttpConnectivityProbe, RecoveryCoordinator,
};
pub use source::{CatalogSource, HttpCatalogSource};
pub use store::{CatalogStore, MemoryCatalogStore, SqliteCatalogStore};
