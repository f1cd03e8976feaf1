//! Command-line host for the offline worker.
//!
//! Drives the worker lifecycle against the real network, persisting cache
//! storage to a JSON snapshot between runs.
//!
//! ## Usage
//!
//! ```bash
//! # Print the default configuration
//! offline-sw config > worker.json
//!
//! # Install and activate, caching the application shell
//! offline-sw --config worker.json install
//!
//! # Intercept a request as a controlled page would issue it
//! offline-sw --config worker.json fetch ./index.html --offline
//!
//! # Post a message to the active worker
//! offline-sw message '{"type": "CACHE_URLS", "urls": ["./models/config.json"]}'
//!
//! # Show what is stored
//! offline-sw list
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use offline_common::{init_logging, LogConfig, LogFormat};
use offline_net::{Fetcher, HttpFetcher, LoaderConfig, OfflineFetcher};
use offline_sw::{
    CacheStorage, FetchEvent, MemoryCacheStorage, OfflineWorker, Request, ServiceWorkerRegistration,
    WorkerConfig, WorkerSlot,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "offline-sw")]
#[command(about = "Offline caching service worker host", version)]
struct Cli {
    /// Worker configuration file (JSON). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache storage snapshot file
    #[arg(short, long, global = true, default_value = "offline-cache.json")]
    store: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective worker configuration as JSON
    Config,

    /// Install and activate the worker, caching every static asset
    Install,

    /// Intercept a request with the active worker
    Fetch {
        /// Request URL, absolute or relative to the scope
        url: String,
        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Simulate a dead network
        #[arg(long)]
        offline: bool,
    },

    /// Post a JSON message to the active worker
    Message {
        /// Message payload, e.g. '{"type": "SKIP_WAITING"}'
        json: String,
    },

    /// List stores and their entries
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format))
        .context("failed to initialise logging")?;

    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
        }

        Commands::Install => {
            let storage = open_store(&cli.store).await?;
            let worker = OfflineWorker::new(Arc::clone(&config), storage.clone(), http_fetcher()?)?;
            let (registration, _events) = ServiceWorkerRegistration::new(config.scope.clone());

            let state = registration.register(worker).await?;
            println!("Worker {state}");
            for name in storage.keys().await? {
                println!("  {name}: {} entries", storage.entries(&name).await?.len());
            }
            save_store(&storage, &cli.store).await?;
        }

        Commands::Fetch {
            url,
            method,
            offline,
        } => {
            let storage = open_store(&cli.store).await?;
            let fetcher: Arc<dyn Fetcher> = if offline {
                Arc::new(OfflineFetcher)
            } else {
                http_fetcher()?
            };
            let registration = restore(&config, storage.clone(), fetcher).await?;

            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid method: {method}"))?;
            let url = config
                .resolve(&url)
                .with_context(|| format!("invalid URL: {url}"))?;
            let event = FetchEvent::new(Request::new(method, url));

            match registration.handle_fetch(&event).await {
                Some(served) => {
                    println!(
                        "{} {} ({:?}, {} bytes)",
                        served.response.status.as_u16(),
                        served.response.status_text,
                        served.source,
                        served.response.body.len()
                    );
                }
                None => println!("Not intercepted: request goes to the network untouched"),
            }

            let background = event.settled().await;
            debug!(tasks = background, "Fetch event settled");
            save_store(&storage, &cli.store).await?;
        }

        Commands::Message { json } => {
            let data: serde_json::Value =
                serde_json::from_str(&json).context("message is not valid JSON")?;
            let storage = open_store(&cli.store).await?;
            let registration = restore(&config, storage.clone(), http_fetcher()?).await?;

            let event = registration.post_message(WorkerSlot::Active, &data).await?;
            let background = event.settled().await;
            println!("Message delivered ({background} background tasks)");
            save_store(&storage, &cli.store).await?;
        }

        Commands::List => {
            let storage = open_store(&cli.store).await?;
            let names = storage.keys().await?;
            if names.is_empty() {
                println!("No caches in {}", cli.store.display());
            }
            for name in names {
                let entries = storage.entries(&name).await?;
                println!("{name} ({} entries)", entries.len());
                for entry in entries {
                    println!(
                        "  {} {} {} ({} bytes)",
                        entry.status.as_u16(),
                        entry.method,
                        entry.url,
                        entry.body.len()
                    );
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<WorkerConfig> {
    match path {
        Some(path) => Ok(WorkerConfig::from_file(path)?),
        None => Ok(WorkerConfig::default()),
    }
}

fn http_fetcher() -> Result<Arc<dyn Fetcher>> {
    Ok(Arc::new(HttpFetcher::new(LoaderConfig::default())?))
}

async fn open_store(path: &Path) -> Result<Arc<MemoryCacheStorage>> {
    let storage = MemoryCacheStorage::load(path)
        .await
        .with_context(|| format!("failed to load cache store {}", path.display()))?;
    Ok(Arc::new(storage))
}

async fn save_store(storage: &MemoryCacheStorage, path: &Path) -> Result<()> {
    storage
        .save(path)
        .await
        .with_context(|| format!("failed to save cache store {}", path.display()))?;
    info!(path = %path.display(), "Cache store saved");
    Ok(())
}

/// Bring back the worker installed by a previous run.
async fn restore(
    config: &Arc<WorkerConfig>,
    storage: Arc<MemoryCacheStorage>,
    fetcher: Arc<dyn Fetcher>,
) -> Result<ServiceWorkerRegistration> {
    if !storage.has(&config.static_cache_name).await? {
        bail!(
            "no installed worker for {} in this store, run `offline-sw install` first",
            config.static_cache_name
        );
    }

    let worker = OfflineWorker::new(Arc::clone(config), storage, fetcher)?;
    let (registration, _events) = ServiceWorkerRegistration::new(config.scope.clone());
    registration.restore_active(worker).await?;
    Ok(registration)
}
