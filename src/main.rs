use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use url::Url;

use shelfwatch::config::AppConfig;
use shelfwatch::discovery::DiscoveryAggregator;
use shelfwatch::extractor::SignalExtractor;
use shelfwatch::fetcher::HttpFetcher;
use shelfwatch::monitor::Monitor;
use shelfwatch::notifier::TelegramNotifier;
use shelfwatch::reconcile::ReconcileEngine;
use shelfwatch::store::ProductStore;

#[derive(Parser, Debug)]
#[command(name = "shelfwatch", version, about = "Restock monitor with Telegram alerts")]
struct Cli {
    /// Run a single scan cycle and exit
    #[arg(long)]
    once: bool,

    /// Override the database URL (e.g. sqlite://shelfwatch.db)
    #[arg(long)]
    database: Option<String>,

    /// Override the inter-cycle interval in seconds
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shelfwatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Fails fast when the Telegram credentials are missing.
    let mut config = AppConfig::from_env()?;
    if let Some(database) = cli.database {
        config.database.url = database;
    }
    if let Some(interval) = cli.interval {
        config.monitor.scan_interval = interval;
    }

    info!("Starting shelfwatch...");

    let store = Arc::new(ProductStore::connect(&config.database).await?);
    let fetcher = Arc::new(HttpFetcher::new(&config.fetcher)?);
    let base_url = Url::parse(&config.site.base_url)?;

    let discovery = DiscoveryAggregator::new(fetcher.clone(), base_url)?;
    let extractor = SignalExtractor::new(fetcher, &config.site.brand)?;
    let engine = ReconcileEngine::new(store.clone());
    let notifier = Arc::new(TelegramNotifier::new(&config.telegram));

    let monitor = Monitor::new(
        discovery,
        extractor,
        engine,
        store,
        notifier,
        config.monitor.clone(),
    );

    if cli.once {
        let sent = monitor.run_scan().await?;
        info!(notifications = sent, "scan complete");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    monitor.run_continuous(shutdown_rx).await?;
    info!("Shutting down...");

    Ok(())
}
