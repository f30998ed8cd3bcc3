use anyhow::Result;
use catalog_backup_core::RecoveryCoordinator;
use futures::future::join_all;
use tracing::info;

use super::{build_manager, describe, open, progress_logger};

pub async fn run(config_path: &str) -> Result<()> {
    let (config, store) = open(config_path).await?;
    let manager = build_manager(&config, store.clone())?;

    let handles = RecoveryCoordinator::new(manager)
        .recover(progress_logger)
        .await?;

    if handles.is_empty() {
        info!("Nothing to recover");
        store.close().await;
        return Ok(());
    }

    let storefronts: Vec<String> = handles
        .iter()
        .map(|h| h.storefront_id().to_string())
        .collect();
    let outcomes = join_all(handles.into_iter().map(|h| h.wait())).await;

    println!("=== Recovery ===\n");
    for (storefront, outcome) in storefronts.iter().zip(&outcomes) {
        println!("  {:<40} {}", storefront, describe(outcome));
    }

    store.close().await;
    Ok(())
}
