use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::SqliteStorage;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Base URL the worker controls, e.g. "https://example.com/app/"
  pub scope: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Upper bound on a single network fetch, in seconds
  #[serde(default = "default_fetch_timeout_secs")]
  pub fetch_timeout_secs: u64,
  #[serde(default)]
  pub log: LogConfig,
}

fn default_fetch_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// Persistent SQLite database
  #[default]
  Sqlite,
  /// Process-lifetime storage, gone on exit
  Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: Backend,
  /// Database path (defaults to $XDG_DATA_HOME/shellcache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// tracing filter directive, e.g. "shellcache=debug" (falls back to RUST_LOG)
  pub filter: Option<String>,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// With no file at all, defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self {
        fetch_timeout_secs: default_fetch_timeout_secs(),
        ..Self::default()
      }),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.fetch_timeout_secs == 0 {
      return Err(eyre!("fetch_timeout_secs must be at least 1"));
    }
    Ok(config)
  }

  /// The worker scope as a URL. Must be set, either here or on the command line.
  pub fn scope_url(&self) -> Result<Url> {
    let scope = self.scope.as_deref().ok_or_else(|| {
      eyre!("No scope configured. Set `scope` in shellcache.yaml or pass --scope.")
    })?;

    let url = Url::parse(scope).map_err(|e| eyre!("Invalid scope '{}': {}", scope, e))?;
    if url.cannot_be_a_base() {
      return Err(eyre!("Scope '{}' cannot be used as a base URL", scope));
    }
    // Opaque origins (file:, data:) never equal each other, so nothing would be intercepted
    if !url.origin().is_tuple() {
      return Err(eyre!("Scope '{}' has no scheme/host/port origin", scope));
    }
    Ok(url)
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.fetch_timeout_secs)
  }

  /// Path of the SQLite database.
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(path) => Ok(path.clone()),
      None => SqliteStorage::default_path(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_full_config() {
    let config = Config::parse(
      r#"
scope: https://example.com/app/
cache:
  backend: memory
  path: /tmp/cache.db
fetch_timeout_secs: 5
log:
  filter: shellcache=debug
  file: /tmp/shellcache.log
"#,
    )
    .unwrap();

    assert_eq!(
      config.scope_url().unwrap().as_str(),
      "https://example.com/app/"
    );
    assert_eq!(config.cache.backend, Backend::Memory);
    assert_eq!(config.cache_path().unwrap(), PathBuf::from("/tmp/cache.db"));
    assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
    assert_eq!(config.log.filter.as_deref(), Some("shellcache=debug"));
  }

  #[test]
  fn test_parse_defaults() {
    let config = Config::parse("scope: https://example.com/\n").unwrap();

    assert_eq!(config.cache.backend, Backend::Sqlite);
    assert!(config.cache.path.is_none());
    assert_eq!(config.fetch_timeout_secs, 30);
    assert!(config.log.file.is_none());
  }

  #[test]
  fn test_missing_scope_is_an_error() {
    let config = Config::parse("fetch_timeout_secs: 10\n").unwrap();
    assert!(config.scope_url().is_err());
  }

  #[test]
  fn test_rejects_non_base_scope() {
    let config = Config::parse("scope: \"mailto:someone@example.com\"\n").unwrap();
    assert!(config.scope_url().is_err());
  }

  #[test]
  fn test_zero_fetch_timeout_fails() {
    let err = Config::parse("scope: https://example.com/\nfetch_timeout_secs: 0\n").unwrap_err();
    assert!(err.to_string().contains("fetch_timeout_secs"));
  }

  #[test]
  fn test_rejects_file_scope() {
    let config = Config::parse("scope: \"file:///srv/app/\"\n").unwrap();
    assert!(config.scope_url().is_err());
  }

  #[test]
  fn test_accepts_localhost_scope_with_port() {
    let config = Config::parse("scope: http://localhost:8080/app/\n").unwrap();
    assert_eq!(config.scope_url().unwrap().port(), Some(8080));
  }

  #[test]
  fn test_unknown_backend_fails() {
    assert!(Config::parse("cache:\n  backend: redis\n").is_err());
  }

  #[test]
  fn test_explicit_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    assert!(Config::load(Some(&missing)).is_err());
  }

  #[test]
  fn test_load_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shellcache.yaml");
    std::fs::write(&path, "scope: http://localhost:8080/\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.scope.as_deref(), Some("http://localhost:8080/"));
  }
}
