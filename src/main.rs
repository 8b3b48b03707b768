//! magnet-crawler - Main entry point
//!
//! Crawls the mainline DHT for info-hashes and manages the resulting
//! magnet store.

use anyhow::{Context, Result};
use magnet_crawler::{
    run_crawlers, CliArgs, Command, Config, FileStore, MagnetStore, MemoryStore, TorrentParser,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        if let Some(location) = panic_info.location() {
            error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    match &args.command {
        Command::Crawl(crawl) => run_crawl(Config::from_args(crawl)).await,
        Command::Init { store } => run_init(store).await,
        #[cfg(feature = "aria2")]
        Command::Convert(convert) => run_convert(magnet_crawler::cli::ConvertConfig::from_args(convert)).await,
        Command::Inspect { torrent_file } => run_inspect(torrent_file),
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", level);
}

/// Run the crawl nodes until interrupted
async fn run_crawl(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let store: Arc<dyn MagnetStore> = if config.in_memory {
        info!("Using in-memory magnet store");
        Arc::new(MemoryStore::new())
    } else {
        let store = FileStore::open(&config.store_dir)
            .await
            .context("Failed to open magnet store")?;
        Arc::new(store)
    };
    info!(
        "Starting {} crawl nodes on ports {}..={}",
        config.count,
        config.base_port,
        config.ports().last().unwrap_or(config.base_port)
    );

    tokio::select! {
        result = run_crawlers(config.count, config.base_port, config.crawler.clone(), Arc::clone(&store)) => {
            result.context("Crawler stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for interrupt")?;
            info!("Interrupted, shutting down");
        }
    }

    info!("{} magnets stored", store.count().await.unwrap_or(0));
    Ok(())
}

/// Create the magnet store layout
async fn run_init(store_dir: &Path) -> Result<()> {
    let report = FileStore::init(store_dir)
        .await
        .context("Failed to initialize magnet store")?;

    for path in &report.existing {
        println!("Already exists: {}", path.display());
    }
    println!(
        "Magnet store at {}: {} files created, {} already present",
        store_dir.display(),
        report.created.len(),
        report.existing.len()
    );
    Ok(())
}

/// Feed the backlog to aria2 forever
#[cfg(feature = "aria2")]
async fn run_convert(config: magnet_crawler::cli::ConvertConfig) -> Result<()> {
    use magnet_crawler::{Aria2Client, MagnetConverter};

    config.validate().context("Invalid configuration")?;

    let store = FileStore::open(&config.store_dir)
        .await
        .context("Failed to open magnet store")?;
    let records = store.records();
    let client = Aria2Client::new(config.rpc_url.clone(), config.secret.clone());
    let converter = MagnetConverter::new(client, Arc::new(store), records, config.converter.clone());

    tokio::select! {
        result = converter.run() => result.context("Converter stopped"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for interrupt")?;
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

/// Print torrent metadata as JSON
fn run_inspect(path: &Path) -> Result<()> {
    let metadata = TorrentParser::parse_file(path)
        .with_context(|| format!("Failed to parse torrent file {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
