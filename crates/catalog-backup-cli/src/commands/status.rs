use anyhow::Result;
use catalog_backup_core::{BackupCursor, CatalogStore, Storefront};
use chrono::{DateTime, Utc};
use serde_json::json;

use super::open;

/// Show status for one storefront or all stored storefronts.
pub async fn run(config_path: &str, storefront: Option<&str>, format: &str) -> Result<()> {
    let (_config, store) = open(config_path).await?;

    let storefronts = match storefront {
        Some(id) => match store.get_storefront(id).await? {
            Some(s) => vec![s],
            None => {
                store.close().await;
                anyhow::bail!("Storefront {} not found", id);
            }
        },
        None => store.list_storefronts().await?,
    };

    let mut rows = Vec::with_capacity(storefronts.len());
    for s in storefronts {
        let cursor = store.get_cursor(&s.id).await?;
        rows.push((s, cursor));
    }
    store.close().await;

    match format {
        "json" => print_json(&rows)?,
        "text" => print_text(&rows),
        other => anyhow::bail!("Unknown format: {} (expected text or json)", other),
    }
    Ok(())
}

fn print_json(rows: &[(Storefront, Option<BackupCursor>)]) -> Result<()> {
    let value: Vec<_> = rows
        .iter()
        .map(|(storefront, cursor)| json!({ "storefront": storefront, "cursor": cursor }))
        .collect();
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_text(rows: &[(Storefront, Option<BackupCursor>)]) {
    if rows.is_empty() {
        println!("No storefronts backed up yet");
        return;
    }

    println!("=== Backup Status ===\n");
    for (s, cursor) in rows {
        println!("{}", s.id);
        println!("  Status:      {}", s.backup_status);
        println!("  Products:    {}", s.product_count);
        println!("  Size:        {}", format_bytes(s.size_bytes));
        println!("  Last backup: {}", format_time(s.last_backup_at));

        if let Some(c) = cursor {
            let total = c
                .total_products
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  Resumable:   {}/{} products fetched, started {}",
                c.products_fetched,
                total,
                format_time(Some(c.started_at))
            );
        }
        println!();
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
