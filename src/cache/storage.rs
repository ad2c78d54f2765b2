//! Cache storage trait with in-memory and SQLite implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::{CachedResponse, RequestKey, ResponseSnapshot};

/// Trait for cache storage backends.
///
/// A backend holds any number of named caches. Each cache maps request
/// identities to response snapshots.
pub trait CacheStorage: Send + Sync {
  /// Create the named cache if it does not exist yet.
  fn open(&self, name: &str) -> Result<()>;

  /// Whether the named cache exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// Names of all caches, in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a cache and all of its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Look up an entry. A missing cache is reported as a miss.
  fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store one entry, replacing any previous entry for the same key.
  fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()>;

  /// Store a batch of entries atomically: either all are written or none.
  fn put_all(&self, name: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()>;

  /// Number of entries in a cache (0 if it does not exist).
  fn len(&self, name: &str) -> Result<usize>;
}

struct MemoryEntry {
  response: ResponseSnapshot,
  cached_at: DateTime<Utc>,
}

struct MemoryCache {
  name: String,
  entries: HashMap<RequestKey, MemoryEntry>,
}

/// Storage that lives for the lifetime of the process.
/// Used for tests and when the `memory` backend is configured.
#[derive(Default)]
pub struct MemoryStorage {
  caches: Mutex<Vec<MemoryCache>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn open(&self, name: &str) -> Result<()> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if !caches.iter().any(|c| c.name == name) {
      caches.push(MemoryCache {
        name: name.to_string(),
        entries: HashMap::new(),
      });
    }
    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.iter().any(|c| c.name == name))
  }

  fn keys(&self) -> Result<Vec<String>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.iter().map(|c| c.name.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = caches.len();
    caches.retain(|c| c.name != name);
    Ok(caches.len() != before)
  }

  fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entry = caches
      .iter()
      .find(|c| c.name == name)
      .and_then(|c| c.entries.get(key));

    Ok(entry.map(|e| CachedResponse {
      response: e.response.duplicate(),
      cached_at: e.cached_at,
    }))
  }

  fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let cache = caches
      .iter_mut()
      .find(|c| c.name == name)
      .ok_or_else(|| eyre!("Cache {} does not exist", name))?;

    cache.entries.insert(
      key.clone(),
      MemoryEntry {
        response: response.duplicate(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_all(&self, name: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()> {
    // Single lock for the whole batch, and the only failure happens before any insert.
    let mut caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let cache = caches
      .iter_mut()
      .find(|c| c.name == name)
      .ok_or_else(|| eyre!("Cache {} does not exist", name))?;

    let now = Utc::now();
    for (key, response) in entries {
      cache.entries.insert(
        key.clone(),
        MemoryEntry {
          response: response.duplicate(),
          cached_at: now,
        },
      );
    }
    Ok(())
  }

  fn len(&self, name: &str) -> Result<usize> {
    let caches = self
      .caches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      caches
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.entries.len())
        .unwrap_or(0),
    )
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a database that is discarded when dropped.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shellcache").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named cache
CREATE TABLE IF NOT EXISTS caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity hash
CREATE TABLE IF NOT EXISTS entries (
    cache_name TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_hash),
    FOREIGN KEY (cache_name) REFERENCES caches(name) ON DELETE CASCADE
);
"#;

const INSERT_ENTRY: &str =
  "INSERT OR REPLACE INTO entries (cache_name, request_hash, method, url, status, headers, body, cached_at)
   VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))";

fn cache_exists(conn: &Connection, name: &str) -> Result<bool> {
  let found: Option<i64> = conn
    .query_row("SELECT 1 FROM caches WHERE name = ?", params![name], |row| {
      row.get(0)
    })
    .optional()
    .map_err(|e| eyre!("Failed to query cache {}: {}", name, e))?;
  Ok(found.is_some())
}

fn insert_entry(
  conn: &Connection,
  name: &str,
  key: &RequestKey,
  response: &ResponseSnapshot,
) -> Result<()> {
  let headers = serde_json::to_string(response.headers())
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      INSERT_ENTRY,
      params![
        name,
        key.cache_hash(),
        key.method(),
        key.url(),
        response.status().as_u16(),
        headers,
        response.body(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO caches (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    cache_exists(&conn, name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE cache_name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE cache_name = ? AND request_hash = ?",
        params![name, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let status = StatusCode::from_u16(status)
          .map_err(|e| eyre!("Invalid status stored for {}: {}", key, e))?;
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key, e))?;
        let cached_at = parse_datetime(&cached_at_str)?;

        Ok(Some(CachedResponse {
          response: ResponseSnapshot::new(status, headers, body),
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !cache_exists(&conn, name)? {
      return Err(eyre!("Cache {} does not exist", name));
    }
    insert_entry(&conn, name, key, response)
  }

  fn put_all(&self, name: &str, entries: &[(RequestKey, ResponseSnapshot)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    if !cache_exists(&tx, name)? {
      return Err(eyre!("Cache {} does not exist", name));
    }

    // Dropping the transaction on error rolls the whole batch back
    for (key, response) in entries {
      insert_entry(&tx, name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn len(&self, name: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE cache_name = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", name, e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Request;
  use url::Url;

  fn key(path: &str) -> RequestKey {
    Request::get(Url::parse("https://app.test/").unwrap().join(path).unwrap()).key()
  }

  fn page(body: &str) -> ResponseSnapshot {
    ResponseSnapshot::new(
      StatusCode::OK,
      vec![("content-type".to_string(), "text/html".to_string())],
      body,
    )
  }

  fn check_open_keys_delete(storage: &impl CacheStorage) {
    storage.open("v-old").unwrap();
    storage.open("v-new").unwrap();
    storage.open("v-old").unwrap();

    assert_eq!(storage.keys().unwrap(), vec!["v-old", "v-new"]);
    assert!(storage.has("v-new").unwrap());

    assert!(storage.delete("v-old").unwrap());
    assert!(!storage.delete("v-old").unwrap());
    assert_eq!(storage.keys().unwrap(), vec!["v-new"]);
  }

  fn check_round_trip(storage: &impl CacheStorage) {
    storage.open("v1").unwrap();
    let original = page("<h1>shell</h1>");
    storage.put("v1", &key("index.html"), &original).unwrap();

    let cached = storage.lookup("v1", &key("index.html")).unwrap().unwrap();
    assert_eq!(cached.response.status(), original.status());
    assert_eq!(cached.response.body(), original.body());
    assert_eq!(cached.response.header("Content-Type"), Some("text/html"));

    assert!(storage.lookup("v1", &key("other.html")).unwrap().is_none());
    assert!(storage.lookup("v2", &key("index.html")).unwrap().is_none());
  }

  fn check_put_requires_cache(storage: &impl CacheStorage) {
    assert!(storage.put("nope", &key("a"), &page("a")).is_err());
    assert!(storage
      .put_all("nope", &[(key("a"), page("a"))])
      .is_err());
    assert!(!storage.has("nope").unwrap());
  }

  fn check_delete_drops_entries(storage: &impl CacheStorage) {
    storage.open("v1").unwrap();
    storage
      .put_all("v1", &[(key("a"), page("a")), (key("b"), page("b"))])
      .unwrap();
    assert_eq!(storage.len("v1").unwrap(), 2);

    storage.delete("v1").unwrap();
    storage.open("v1").unwrap();
    assert_eq!(storage.len("v1").unwrap(), 0);
    assert!(storage.lookup("v1", &key("a")).unwrap().is_none());
  }

  #[test]
  fn test_memory_open_keys_delete() {
    check_open_keys_delete(&MemoryStorage::new());
  }

  #[test]
  fn test_memory_round_trip() {
    check_round_trip(&MemoryStorage::new());
  }

  #[test]
  fn test_memory_put_requires_cache() {
    check_put_requires_cache(&MemoryStorage::new());
  }

  #[test]
  fn test_memory_delete_drops_entries() {
    check_delete_drops_entries(&MemoryStorage::new());
  }

  #[test]
  fn test_sqlite_open_keys_delete() {
    check_open_keys_delete(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_round_trip() {
    check_round_trip(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_put_requires_cache() {
    check_put_requires_cache(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_delete_drops_entries() {
    check_delete_drops_entries(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_put_replaces_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open("v1").unwrap();
    storage.put("v1", &key("a"), &page("first")).unwrap();
    storage.put("v1", &key("a"), &page("second")).unwrap();

    assert_eq!(storage.len("v1").unwrap(), 1);
    let cached = storage.lookup("v1", &key("a")).unwrap().unwrap();
    assert_eq!(cached.response.body(), b"second");
  }

  #[test]
  fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.open("v1").unwrap();
      storage.put("v1", &key("index.html"), &page("kept")).unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    assert_eq!(storage.keys().unwrap(), vec!["v1"]);
    let cached = storage.lookup("v1", &key("index.html")).unwrap().unwrap();
    assert_eq!(cached.response.body(), b"kept");
  }
}
