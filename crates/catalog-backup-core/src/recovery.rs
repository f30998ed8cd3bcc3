//! Startup recovery and offline retry.
//!
//! Every persisted backup cursor marks a traversal that did not finish:
//! the process was killed, the run was paused, or it stopped partway on an
//! upstream failure. On startup all of them are resumed without asking.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backup::{BackupManager, ProgressFn, RunHandle};
use crate::config::ApiConfig;
use crate::model::{now, LogLevel};
use crate::{Error, Result};

/// Resumes interrupted backups on process start
pub struct RecoveryCoordinator {
    manager: Arc<BackupManager>,
}

impl RecoveryCoordinator {
    pub fn new(manager: Arc<BackupManager>) -> Self {
        Self { manager }
    }

    /// Resume every persisted cursor; `progress_for` supplies a fresh
    /// progress callback per storefront.
    pub async fn recover<F>(&self, progress_for: F) -> Result<Vec<RunHandle>>
    where
        F: Fn(&str) -> ProgressFn,
    {
        let engine = self.manager.engine();
        let config = engine.config();

        if config.logs.retention_days > 0 {
            let cutoff = now() - chrono::Duration::days(i64::from(config.logs.retention_days));
            let pruned = engine.store().prune_logs(cutoff).await?;
            if pruned > 0 {
                info!("Pruned {} log entries older than {}", pruned, cutoff);
            }
        }

        let cursors = engine.checkpoints().list().await?;
        if cursors.is_empty() {
            debug!("No interrupted backups found");
            return Ok(Vec::new());
        }

        if !config.recovery.auto_resume {
            info!(
                "Auto-resume disabled; {} interrupted backups left paused",
                cursors.len()
            );
            return Ok(Vec::new());
        }

        info!("Resuming {} interrupted backups", cursors.len());

        let mut handles = Vec::with_capacity(cursors.len());
        for cursor in cursors {
            engine
                .log(
                    &cursor.storefront_id,
                    LogLevel::Info,
                    "Backup was interrupted, auto-resuming",
                    Some(format!(
                        "cursor={} products_fetched={} at={}",
                        cursor.cursor.as_deref().unwrap_or("<start>"),
                        cursor.products_fetched,
                        now().to_rfc3339()
                    )),
                )
                .await;

            let progress = progress_for(&cursor.storefront_id);
            handles.push(self.manager.resume(&cursor.storefront_id, progress).await);
        }

        Ok(handles)
    }
}

/// Connectivity check used while a backup is paused offline
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self, storefront_id: &str) -> bool;
}

/// Probe that issues a `HEAD` against the storefront's root.
///
/// Any HTTP response counts as online; only transport failures count as
/// offline.
pub struct HttpConnectivityProbe {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpConnectivityProbe {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn probe_url(&self, storefront_id: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}/", base.trim_end_matches('/')),
            None => format!("https://{}/", storefront_id),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn is_online(&self, storefront_id: &str) -> bool {
        let url = self.probe_url(storefront_id);
        match self.client.head(&url).send().await {
            Ok(response) => {
                debug!("Probe {} -> {}", url, response.status());
                true
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Probe connectivity every `interval` and resume the storefront's backup
/// once it is reachable again.
///
/// The task yields the resumed run, or `None` if the backup was cancelled
/// meanwhile and there is nothing to resume.
pub fn schedule_offline_retry(
    manager: Arc<BackupManager>,
    storefront_id: String,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    progress: ProgressFn,
) -> JoinHandle<Option<RunHandle>> {
    tokio::spawn(async move {
        let mut attempts = 0u64;
        loop {
            tokio::time::sleep(interval).await;
            attempts += 1;

            if !probe.is_online(&storefront_id).await {
                debug!(
                    "{}: still offline after {} probes",
                    storefront_id, attempts
                );
                continue;
            }

            if !manager.is_active(&storefront_id) {
                match manager.engine().store().get_cursor(&storefront_id).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        info!(
                            "{}: back online but nothing to resume",
                            storefront_id
                        );
                        return None;
                    }
                    Err(e) => {
                        warn!("{}: failed to read backup cursor: {}", storefront_id, e);
                        continue;
                    }
                }
            }

            manager
                .engine()
                .log(
                    &storefront_id,
                    LogLevel::Info,
                    "Connection restored, resuming backup",
                    Some(format!("probes={}", attempts)),
                )
                .await;
            return Some(manager.resume(&storefront_id, progress).await);
        }
    })
}
