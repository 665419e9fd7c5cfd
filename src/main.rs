//! DevSwipe feed daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! devswipe-feed
//!
//! # Custom config / storage / port
//! devswipe-feed --config /path/to/config.toml
//! devswipe-feed --storage-dir /data/feed --http-port 8091
//!
//! # Run without the feed cache
//! devswipe-feed --no-cache
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use devswipe_feed::cache::memory::spawn_cleanup_task;
use devswipe_feed::services::events::spawn_logging_listener;
use devswipe_feed::{CacheStore, Config, DisabledCache, FeedDb, HttpServer, MemoryCache, Services};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "devswipe-feed")]
#[command(about = "Personalized swipe feed service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "DEVSWIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory (database and default config)
    #[arg(long, env = "DEVSWIPE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "DEVSWIPE_HTTP_PORT")]
    http_port: Option<u16>,

    /// Bind address
    #[arg(long, env = "DEVSWIPE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Disable the feed / stats cache
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("devswipe_feed=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        cache = config.cache.enabled,
        "Starting devswipe-feed"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db_path = config.database_path();
    let pool_size = config.pool_size;
    let db = tokio::task::spawn_blocking(move || FeedDb::open(&db_path, pool_size))
        .await?
        .context("opening feed database")?;
    let db = Arc::new(db);

    let cache: Arc<dyn CacheStore> = if config.cache.enabled {
        let memory = Arc::new(MemoryCache::new());
        spawn_cleanup_task(memory.clone(), CACHE_SWEEP_INTERVAL);
        memory
    } else {
        Arc::new(DisabledCache)
    };

    let services = Arc::new(Services::new(db, cache, &config));
    spawn_logging_listener(services.events.clone());

    let bind_addr: SocketAddr = format!("{}:{}", args.bind, config.http_port)
        .parse()
        .context("invalid bind address")?;

    let server = Arc::new(HttpServer::new(services, bind_addr, config.feed.request_timeout()));

    tokio::select! {
        result = server.run() => {
            result.context("HTTP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
