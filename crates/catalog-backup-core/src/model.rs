//! Persisted record structures: storefronts, products, cursors and log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Current time truncated to millisecond precision, the resolution the
/// store persists timestamps at.
pub fn now() -> DateTime<Utc> {
    let millis = Utc::now().timestamp_millis();
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

/// Composite product key: `{storefront_id}::{source_id}`
pub fn product_key(storefront_id: &str, source_id: &str) -> String {
    format!("{}::{}", storefront_id, source_id)
}

/// Backup state of a storefront
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupStatus {
    #[default]
    Never,
    InProgress,
    Paused,
    Partial,
    Complete,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Never => "never",
            BackupStatus::InProgress => "in-progress",
            BackupStatus::Paused => "paused",
            BackupStatus::Partial => "partial",
            BackupStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(BackupStatus::Never),
            "in-progress" => Ok(BackupStatus::InProgress),
            "paused" => Ok(BackupStatus::Paused),
            "partial" => Ok(BackupStatus::Partial),
            "complete" => Ok(BackupStatus::Complete),
            other => Err(format!("unknown backup status: {}", other)),
        }
    }
}

/// A storefront whose catalog is being backed up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storefront {
    /// Canonical storefront id (domain-like)
    pub id: String,

    /// Domain requests are addressed to
    pub domain: String,

    /// Completion time of the last full traversal
    #[serde(default)]
    pub last_backup_at: Option<DateTime<Utc>>,

    pub backup_status: BackupStatus,

    /// Products not soft-deleted, as of the last completed run
    pub product_count: u64,

    /// Estimated serialized size of those products
    pub size_bytes: u64,

    pub created_at: DateTime<Utc>,
}

impl Storefront {
    /// Create a storefront that has never been backed up
    pub fn new(id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            domain: id.to_string(),
            last_backup_at: None,
            backup_status: BackupStatus::Never,
            product_count: 0,
            size_bytes: 0,
            created_at,
        }
    }
}

/// Resumable pagination position for one storefront
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupCursor {
    pub storefront_id: String,

    /// Continuation token of the last applied page; `None` before the first page
    #[serde(default)]
    pub cursor: Option<String>,

    /// Identity of the traversal this cursor belongs to; every product the
    /// traversal writes carries it
    pub traversal_id: String,

    /// Start of the traversal this cursor belongs to
    pub started_at: DateTime<Utc>,

    pub products_fetched: u64,

    /// Upstream total, when the API reported one
    #[serde(default)]
    pub total_products: Option<u64>,
}

impl BackupCursor {
    pub fn new(storefront_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            storefront_id: storefront_id.to_string(),
            cursor: None,
            traversal_id: Uuid::new_v4().to_string(),
            started_at,
            products_fetched: 0,
            total_products: None,
        }
    }
}

/// Monetary amount as a decimal string plus currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: String,
    #[serde(default)]
    pub currency_code: Option<String>,
}

/// Product image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Selected option on a variant (e.g. Size = M)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

/// Product variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub available_for_sale: Option<bool>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub compare_at_price: Option<Money>,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
    #[serde(default)]
    pub image: Option<Image>,
}

/// A backed-up catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Composite key, see [`product_key`]
    pub id: String,
    pub storefront_id: String,
    /// Upstream product id
    pub source_id: String,

    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub available_for_sale: Option<bool>,
    #[serde(default)]
    pub source_created_at: Option<String>,
    #[serde(default)]
    pub source_updated_at: Option<String>,
    #[serde(default)]
    pub min_price: Option<Money>,
    #[serde(default)]
    pub max_price: Option<Money>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub images: Vec<Image>,

    /// When this copy was last written by a backup run
    pub sniffer_updated_at: DateTime<Utc>,

    /// Traversal that last wrote this copy
    #[serde(default)]
    pub traversal_id: Option<String>,

    /// Set when the product disappeared upstream (soft delete)
    #[serde(default)]
    pub removed_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }

    /// Serialized size used for the storefront's storage estimate
    pub fn estimated_size(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }
}

/// Severity of a persisted log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Log entry to be appended; the store assigns the id
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub storefront_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<String>,
}

/// Persisted, append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub storefront_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub detail: Option<String>,
}
