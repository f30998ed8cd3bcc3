pub mod backup;
pub mod delete;
pub mod logs;
pub mod recover;
pub mod status;

use anyhow::Result;
use catalog_backup_core::{
    BackupEngine, BackupManager, Config, HttpCatalogSource, PartialReason, ProgressFn,
    RunOutcome, SqliteCatalogStore, TracingNotifier,
};
use std::sync::Arc;
use tracing::info;

/// Load the configuration and open the store it points at
pub async fn open(config_path: &str) -> Result<(Config, Arc<SqliteCatalogStore>)> {
    info!("Loading configuration from: {}", config_path);
    let config = Config::from_yaml_file(config_path).await?;
    let store = Arc::new(SqliteCatalogStore::open(&config.storage.db_path).await?);
    Ok((config, store))
}

/// Wire an engine and run manager over the HTTP catalog source
pub fn build_manager(config: &Config, store: Arc<SqliteCatalogStore>) -> Result<Arc<BackupManager>> {
    let source = Arc::new(HttpCatalogSource::new(config.api.clone())?);
    let engine = BackupEngine::new(config.clone(), store, source, Arc::new(TracingNotifier));
    Ok(Arc::new(BackupManager::new(Arc::new(engine))))
}

/// Progress callback that logs each applied page
pub fn progress_logger(storefront_id: &str) -> ProgressFn {
    let storefront_id = storefront_id.to_string();
    Arc::new(move |fetched, estimated| {
        if estimated > 0 {
            info!("{}: {}/{} products", storefront_id, fetched, estimated);
        } else {
            info!("{}: {} products", storefront_id, fetched);
        }
    })
}

pub fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { products, removed } => {
            format!("complete ({} products, {} removed upstream)", products, removed)
        }
        RunOutcome::Paused { products_fetched } => {
            format!("paused after {} products", products_fetched)
        }
        RunOutcome::Partial(reason) => match reason {
            PartialReason::Throttled => "partial (rate limited)".to_string(),
            PartialReason::Api { status } => format!("partial (HTTP {})", status),
            PartialReason::MissingData => "partial (unexpected response)".to_string(),
            PartialReason::QuotaExceeded => "partial (storage full)".to_string(),
            PartialReason::Cancelled => "cancelled".to_string(),
            PartialReason::Unexpected(message) => format!("partial ({})", message),
        },
    }
}
