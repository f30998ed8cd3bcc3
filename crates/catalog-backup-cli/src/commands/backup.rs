use anyhow::Result;
use catalog_backup_core::{
    schedule_offline_retry, BackupManager, CatalogStore, ConnectivityProbe, HttpConnectivityProbe,
    PartialReason, RunHandle, RunOutcome,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::{build_manager, describe, open, progress_logger};

pub async fn run(config_path: &str, storefront: &str) -> Result<()> {
    let (config, store) = open(config_path).await?;
    let manager = build_manager(&config, store.clone())?;
    let probe: Arc<dyn ConnectivityProbe> = Arc::new(HttpConnectivityProbe::new(&config.api)?);

    info!("Starting backup: {}", storefront);
    let mut handle = manager.start(storefront, progress_logger(storefront)).await;

    let outcome = loop {
        let outcome = wait_interruptible(&manager, handle).await?;

        // A transport failure leaves the cursor in place; park the backup as
        // paused until the storefront is reachable and continue from it.
        if !matches!(outcome, RunOutcome::Partial(PartialReason::Unexpected(_)))
            || probe.is_online(storefront).await
            || !manager.pause_for_offline(storefront).await
        {
            break outcome;
        }

        warn!(
            "{} is unreachable; retrying every {:?}",
            storefront,
            config.recovery.offline_probe_interval()
        );
        let mut retry = schedule_offline_retry(
            manager.clone(),
            storefront.to_string(),
            probe.clone(),
            config.recovery.offline_probe_interval(),
            progress_logger(storefront),
        );
        tokio::select! {
            resumed = &mut retry => match resumed? {
                Some(resumed) => handle = resumed,
                None => break outcome,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                retry.abort();
                info!("Backup {} stays paused; resume it with `recover`", storefront);
                let products_fetched = store
                    .get_cursor(storefront)
                    .await?
                    .map(|c| c.products_fetched)
                    .unwrap_or(0);
                break RunOutcome::Paused { products_fetched };
            }
        }
    };

    store.close().await;

    match outcome {
        RunOutcome::Completed { .. } | RunOutcome::Paused { .. } => {
            info!("Backup {}: {}", storefront, describe(&outcome));
            Ok(())
        }
        RunOutcome::Partial(PartialReason::Cancelled) => {
            info!("Backup {} cancelled", storefront);
            Ok(())
        }
        RunOutcome::Partial(_) => {
            anyhow::bail!("Backup {} ended {}", storefront, describe(&outcome))
        }
    }
}

/// Wait for the run, pausing on the first Ctrl-C and cancelling on the second
async fn wait_interruptible(manager: &BackupManager, handle: RunHandle) -> Result<RunOutcome> {
    let storefront = handle.storefront_id().to_string();
    let done = handle.wait();
    tokio::pin!(done);

    let mut interrupts = 0u32;
    loop {
        tokio::select! {
            outcome = &mut done => return Ok(outcome),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                interrupts += 1;
                if interrupts == 1 {
                    warn!("Pausing at the next page boundary (Ctrl-C again to cancel)");
                    manager.pause(&storefront);
                } else {
                    warn!("Cancelling backup");
                    manager.cancel(&storefront).await;
                }
            }
        }
    }
}
