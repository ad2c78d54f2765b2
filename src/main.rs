mod cache;
mod config;
mod host;
mod logging;
mod manifest;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use cache::{CacheStorage, MemoryStorage, SqliteStorage};
use config::{Backend, Config};
use net::HttpFetcher;
use worker::{Worker, WorkerSettings};

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline cache interceptor for web application shells")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./shellcache.yaml or $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Worker scope URL, e.g. https://example.com/app/
  #[arg(short, long)]
  scope: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Seed the cache with the application shell
  Install,
  /// Delete caches of other versions and take control of open clients
  Activate,
  /// Dispatch fetch events and print how the worker answered them
  Fetch {
    /// Paths relative to the scope, or absolute URLs
    #[arg(required = true)]
    targets: Vec<String>,
    /// Request method
    #[arg(short, long, default_value = "GET")]
    method: String,
    /// Print response bodies
    #[arg(long)]
    body: bool,
  },
  /// List cache tags and their entry counts
  Caches,
  /// Install, activate, then fetch in a single process
  Run {
    /// Paths relative to the scope, or absolute URLs
    targets: Vec<String>,
    /// Print response bodies
    #[arg(long)]
    body: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override scope if specified on command line
  let config = if let Some(scope) = args.scope {
    Config {
      scope: Some(scope),
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init(&config.log)?;

  match config.cache.backend {
    Backend::Sqlite => {
      let storage = SqliteStorage::open(&config.cache_path()?)?;
      run(args.command, &config, storage).await
    }
    Backend::Memory => run(args.command, &config, MemoryStorage::new()).await,
  }
}

async fn run<S: CacheStorage + 'static>(command: Command, config: &Config, storage: S) -> Result<()> {
  let storage = Arc::new(storage);

  // Listing caches needs no scope and no worker
  if let Command::Caches = command {
    return host::list_caches(storage.as_ref());
  }

  let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout())?);
  let settings =
    WorkerSettings::new(config.scope_url()?).with_fetch_timeout(config.fetch_timeout());
  let worker = Worker::new(settings, storage, Arc::clone(&fetcher));

  let result = match command {
    Command::Install => host::install(&worker).await,
    Command::Activate => host::activate(&worker).await,
    Command::Fetch {
      targets,
      method,
      body,
    } => {
      let method = host::parse_method(&method)?;
      host::fetch(&worker, fetcher.as_ref(), &targets, &method, body).await
    }
    Command::Run { targets, body } => host::run(&worker, fetcher.as_ref(), &targets, body).await,
    Command::Caches => Ok(()),
  };

  // Refills are not awaited by fetches, but must land before exit
  debug!("Waiting for {} pending refills", worker.pending_refills());
  worker.settle().await;

  result
}
