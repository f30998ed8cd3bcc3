//! User-facing notifications for terminal backup outcomes.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What a notification reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// Backup finished; `products` active products stored
    Completed { products: u64 },
    /// Backup stopped on an API or transport failure
    Failed { message: String },
    /// Backup stopped because local storage is full
    QuotaExceeded,
}

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub storefront_id: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(storefront_id: &str, kind: NotificationKind) -> Self {
        Self {
            storefront_id: storefront_id.to_string(),
            kind,
        }
    }

    /// Short title suitable for a desktop or chat alert
    pub fn title(&self) -> &'static str {
        match self.kind {
            NotificationKind::Completed { .. } => "Backup complete",
            NotificationKind::Failed { .. } => "Backup failed",
            NotificationKind::QuotaExceeded => "Backup stopped: storage full",
        }
    }

    /// Message body
    pub fn message(&self) -> String {
        match &self.kind {
            NotificationKind::Completed { products } => {
                format!("Backed up {} products from {}", products, self.storefront_id)
            }
            NotificationKind::Failed { message } => {
                format!("Backup of {} stopped: {}", self.storefront_id, message)
            }
            NotificationKind::QuotaExceeded => format!(
                "Local storage is full. Products already saved from {} were kept; free up space and resume.",
                self.storefront_id
            ),
        }
    }
}

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Notifier that emits notifications as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification.kind {
            NotificationKind::Completed { .. } => {
                info!("[notify] {}: {}", notification.title(), notification.message())
            }
            _ => warn!("[notify] {}: {}", notification.title(), notification.message()),
        }
    }
}
