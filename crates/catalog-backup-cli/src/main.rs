use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "catalog-backup")]
#[command(about = "Resumable storefront catalog backup tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a storefront's catalog, resuming a previous run if one exists.
    /// Ctrl-C pauses at the next page boundary; a second Ctrl-C cancels.
    Backup {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,

        /// Storefront domain to back up
        #[arg(short, long)]
        storefront: String,
    },

    /// Resume every interrupted or paused backup
    Recover {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,
    },

    /// Show backup status of stored storefronts
    Status {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,

        /// Only show this storefront
        #[arg(short, long)]
        storefront: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the persisted backup log of a storefront
    Logs {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,

        /// Storefront domain
        #[arg(short, long)]
        storefront: String,

        /// Maximum number of entries, newest first
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Delete a storefront with all its products, cursor and logs
    Delete {
        /// Path to the configuration file
        #[arg(short, long)]
        config: String,

        /// Storefront domain
        #[arg(short, long)]
        storefront: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    // Priority: RUST_LOG env var > verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Backup { config, storefront } => {
            commands::backup::run(&config, &storefront).await?;
        }
        Commands::Recover { config } => {
            commands::recover::run(&config).await?;
        }
        Commands::Status {
            config,
            storefront,
            format,
        } => {
            commands::status::run(&config, storefront.as_deref(), &format).await?;
        }
        Commands::Logs {
            config,
            storefront,
            limit,
        } => {
            commands::logs::run(&config, &storefront, limit).await?;
        }
        Commands::Delete { config, storefront } => {
            commands::delete::run(&config, &storefront).await?;
        }
    }

    Ok(())
}
