//! Command-line host.
//!
//! Plays the part of the hosting runtime: dispatches lifecycle and fetch
//! events to the worker, performs default network handling for requests the
//! worker passes through, and prints what happened.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use tracing::{info, warn};

use crate::cache::{CacheStorage, Request, ResponseSnapshot};
use crate::manifest::CACHE_VERSION;
use crate::net::Fetcher;
use crate::worker::{FetchOutcome, ResponseSource, Worker};

pub async fn install<S: CacheStorage + 'static, F: Fetcher>(worker: &Worker<S, F>) -> Result<()> {
  worker.on_install().await?;
  println!(
    "{} {} for {} ({} entries, skip waiting: {})",
    worker.state(),
    worker.version(),
    worker.scope(),
    worker.active_store().len()?,
    worker.clients().is_waiting_skipped()
  );
  Ok(())
}

pub async fn activate<S: CacheStorage + 'static, F: Fetcher>(worker: &Worker<S, F>) -> Result<()> {
  let report = worker.on_activate().await;

  for name in &report.deleted {
    println!("deleted {}", name);
  }
  for (name, error) in &report.failed {
    println!("could not delete {}: {}", name, error);
  }
  println!(
    "{} {} (controlling open clients: {})",
    worker.state(),
    worker.version(),
    worker.clients().is_claimed()
  );
  Ok(())
}

/// Dispatch one fetch event per target. Passed-through requests go straight
/// to the network, with no caching.
pub async fn fetch<S: CacheStorage + 'static, F: Fetcher>(
  worker: &Worker<S, F>,
  network: &F,
  targets: &[String],
  method: &Method,
  show_body: bool,
) -> Result<()> {
  let mut unavailable = 0;
  for target in targets {
    let request = Request::new(method.clone(), worker.resolve(target)?);

    match worker.on_fetch(request.clone()).await {
      FetchOutcome::Respond(served) => {
        if served.source == ResponseSource::Unavailable {
          unavailable += 1;
        }
        let stored = served
          .cached_at
          .map(|at| format!(", stored {}", at.format("%Y-%m-%d %H:%M:%S")))
          .unwrap_or_default();
        println!(
          "{} {} -> {} {} ({}{})",
          request.method,
          request.url,
          served.response.status(),
          served.response.header("content-type").unwrap_or("-"),
          served.source,
          stored
        );
        print_body(&served.response, show_body)?;
      }
      FetchOutcome::Passthrough => {
        info!("Default handling for {} {}", request.method, request.url);
        match network.fetch(&request).await {
          Ok(response) => {
            println!(
              "{} {} -> {} (passthrough)",
              request.method,
              request.url,
              response.status()
            );
            print_body(&response, show_body)?;
          }
          Err(e) => println!("{} {} -> error (passthrough): {}", request.method, request.url, e),
        }
      }
    }
  }

  if unavailable > 0 {
    warn!("{} of {} requests were unavailable (offline and not cached)", unavailable, targets.len());
  }
  Ok(())
}

/// Full lifecycle in one process: install, activate, then fetch.
pub async fn run<S: CacheStorage + 'static, F: Fetcher>(
  worker: &Worker<S, F>,
  network: &F,
  targets: &[String],
  show_body: bool,
) -> Result<()> {
  install(worker).await?;
  activate(worker).await?;
  fetch(worker, network, targets, &Method::GET, show_body).await
}

/// Print every cache tag, marking the one owned by this build.
pub fn list_caches<S: CacheStorage>(storage: &S) -> Result<()> {
  let names = storage.keys()?;
  if names.is_empty() {
    println!("no caches");
    return Ok(());
  }

  for name in names {
    let marker = if name == CACHE_VERSION { "*" } else { " " };
    println!("{} {} ({} entries)", marker, name, storage.len(&name)?);
  }
  Ok(())
}

pub fn parse_method(method: &str) -> Result<Method> {
  Method::from_bytes(method.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))
}

fn print_body(response: &ResponseSnapshot, show_body: bool) -> Result<()> {
  if !show_body {
    return Ok(());
  }
  let mut stdout = std::io::stdout().lock();
  stdout.write_all(response.body())?;
  writeln!(stdout)?;
  Ok(())
}
