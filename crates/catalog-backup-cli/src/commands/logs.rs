use anyhow::Result;
use catalog_backup_core::CatalogStore;

use super::open;

pub async fn run(config_path: &str, storefront: &str, limit: usize) -> Result<()> {
    let (_config, store) = open(config_path).await?;
    let entries = store.list_logs(storefront, limit).await?;

    if entries.is_empty() {
        println!("No log entries for {}", storefront);
    } else {
        println!("=== Backup Log: {} ===\n", storefront);
        for entry in &entries {
            let line = format!(
                "{} [{:<5}] {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.level.as_str().to_uppercase(),
                entry.message
            );
            match &entry.detail {
                Some(detail) => println!("{}\n    {}", line, detail),
                None => println!("{}", line),
            }
        }
    }

    store.close().await;
    Ok(())
}
