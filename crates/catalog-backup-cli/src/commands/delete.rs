use anyhow::Result;
use catalog_backup_core::CatalogStore;
use tracing::info;

use super::open;

pub async fn run(config_path: &str, storefront: &str) -> Result<()> {
    let (_config, store) = open(config_path).await?;

    if store.get_storefront(storefront).await?.is_none() {
        store.close().await;
        anyhow::bail!("Storefront {} not found", storefront);
    }

    store.delete_storefront(storefront).await?;
    info!("Deleted storefront {} and its backed-up data", storefront);
    println!("Deleted {}", storefront);

    store.close().await;
    Ok(())
}
