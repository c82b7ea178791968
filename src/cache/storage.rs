//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::CachedResponse;
use crate::http::{Request, Response, ResponseKind};

/// Trait for cache storage backends.
///
/// Every method is atomic on its own; nothing spans more than one call except
/// `put_all`, which writes a whole batch or nothing.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it does not exist yet.
  fn open_store(&self, store: &str) -> Result<()>;

  /// Names of all existing stores, oldest first.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Delete a store and all of its entries. Returns whether it existed.
  fn delete_store(&self, store: &str) -> Result<bool>;

  /// Store a response for a request, replacing any previous entry.
  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store a batch of responses atomically.
  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Look up a request in one store.
  fn get(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Look up a request across all stores, oldest store first.
  fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>>;

  /// Number of entries in a store.
  fn entry_count(&self, store: &str) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - the worker degrades to network only.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn open_store(&self, _store: &str) -> Result<()> {
    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_store(&self, _store: &str) -> Result<bool> {
    Ok(false)
  }

  fn put(&self, _store: &str, _request: &Request, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_all(&self, _store: &str, _entries: &[(Request, Response)]) -> Result<()> {
    Ok(()) // Discard
  }

  fn get(&self, _store: &str, _request: &Request) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn match_any(&self, _request: &Request) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn entry_count(&self, _store: &str) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  #[cfg(test)]
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
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("clubnath").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named stores, seq preserves creation order for cross-store lookups
CREATE TABLE IF NOT EXISTS cache_stores (
    name TEXT PRIMARY KEY,
    seq INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One response snapshot per request signature per store
CREATE TABLE IF NOT EXISTS cache_entries (
    store_name TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    signature TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    kind TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_name, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(entry_key);
"#;

const SELECT_ENTRY: &str = "SELECT e.store_name, e.status, e.status_text, e.headers, e.body, e.kind, e.cached_at
   FROM cache_entries e";

/// SHA256 of the request signature, for stable fixed-length keys.
fn entry_key(request: &Request) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.signature().as_bytes());
  hex::encode(hasher.finalize())
}

fn ensure_store(conn: &Connection, store: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_stores (name, seq)
       VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_stores))",
      params![store],
    )
    .map_err(|e| eyre!("Failed to open store {}: {}", store, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, store: &str, request: &Request, response: &Response) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (store_name, entry_key, signature, status, status_text, headers, body, kind, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        store,
        entry_key(request),
        request.signature(),
        response.status,
        response.status_text,
        headers,
        response.body,
        response.kind.as_str(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", request.signature(), store, e))?;

  Ok(())
}

/// Raw row as read from `cache_entries`.
type EntryRow = (String, u16, String, String, Vec<u8>, String, String);

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
    row.get(6)?,
  ))
}

fn into_cached(row: EntryRow) -> Result<CachedResponse> {
  let (store, status, status_text, headers, body, kind, cached_at) = row;
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  Ok(CachedResponse {
    response: Response {
      status,
      status_text,
      headers,
      body,
      kind: ResponseKind::parse(&kind)?,
    },
    store,
    cached_at: parse_datetime(&cached_at)?,
  })
}

impl CacheStorage for SqliteStorage {
  fn open_store(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_store(&conn, store)
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read store name: {}", e))?;

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE store_name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", store, e))?;
    let removed = tx
      .execute("DELETE FROM cache_stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    ensure_store(&conn, store)?;
    insert_entry(&conn, store, request, response)
  }

  fn put_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_store(&tx, store)?;
    for (request, response) in entries {
      insert_entry(&tx, store, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!("{} WHERE e.store_name = ? AND e.entry_key = ?", SELECT_ENTRY),
        params![store, entry_key(request)],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", request.signature(), store, e))?;

    row.map(into_cached).transpose()
  }

  fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!(
          "{} INNER JOIN cache_stores s ON s.name = e.store_name
           WHERE e.entry_key = ?
           ORDER BY s.seq
           LIMIT 1",
          SELECT_ENTRY
        ),
        params![entry_key(request)],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", request.signature(), e))?;

    row.map(into_cached).transpose()
  }

  fn entry_count(&self, store: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", store, e))?;

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
  use url::Url;

  fn request(path: &str) -> Request {
    let origin = Url::parse("https://app.clubnath.com").unwrap();
    Request::parse("GET", path, &origin).unwrap()
  }

  #[test]
  fn test_put_then_get() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let req = request("/index.html");
    let resp = Response::new(200, "<html></html>").with_header("content-type", "text/html");

    storage.put("clubnath-v1", &req, &resp).unwrap();

    let cached = storage.get("clubnath-v1", &req).unwrap().unwrap();
    assert_eq!(cached.response, resp);
    assert_eq!(cached.store, "clubnath-v1");
    assert!(storage.get("clubnath-runtime-v1", &req).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let req = request("/api/posts");

    storage.put("rt", &req, &Response::new(200, "old")).unwrap();
    storage.put("rt", &req, &Response::new(200, "new")).unwrap();

    assert_eq!(storage.entry_count("rt").unwrap(), 1);
    let cached = storage.get("rt", &req).unwrap().unwrap();
    assert_eq!(cached.response.body, b"new".to_vec());
  }

  #[test]
  fn test_method_is_part_of_key() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let get = request("/api/likes");
    let post = Request::new("POST", get.url.clone());

    storage.put("rt", &get, &Response::new(200, "list")).unwrap();

    assert!(storage.get("rt", &post).unwrap().is_none());
  }

  #[test]
  fn test_store_names_in_creation_order() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_store("clubnath-v0").unwrap();
    storage.open_store("clubnath-v1").unwrap();
    storage.open_store("clubnath-runtime-v1").unwrap();
    // Re-opening keeps the original position
    storage.open_store("clubnath-v0").unwrap();

    assert_eq!(
      storage.store_names().unwrap(),
      vec!["clubnath-v0", "clubnath-v1", "clubnath-runtime-v1"]
    );
  }

  #[test]
  fn test_delete_store_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let req = request("/");
    storage.put("clubnath-v0", &req, &Response::new(200, "x")).unwrap();

    assert!(storage.delete_store("clubnath-v0").unwrap());
    assert!(!storage.delete_store("clubnath-v0").unwrap());
    assert!(storage.store_names().unwrap().is_empty());
    assert!(storage.match_any(&req).unwrap().is_none());
  }

  #[test]
  fn test_match_any_prefers_oldest_store() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let req = request("/manifest.json");
    storage.open_store("clubnath-v1").unwrap();
    storage.put("clubnath-runtime-v1", &req, &Response::new(200, "runtime")).unwrap();
    storage.put("clubnath-v1", &req, &Response::new(200, "static")).unwrap();

    let cached = storage.match_any(&req).unwrap().unwrap();
    assert_eq!(cached.store, "clubnath-v1");
    assert_eq!(cached.response.body, b"static".to_vec());
  }

  #[test]
  fn test_put_all_writes_batch() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![
      (request("/"), Response::new(200, "root")),
      (request("/index.html"), Response::new(200, "index")),
    ];

    storage.put_all("clubnath-v1", &entries).unwrap();

    assert_eq!(storage.entry_count("clubnath-v1").unwrap(), 2);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let req = request("/");
    storage.put("clubnath-v1", &req, &Response::new(200, "x")).unwrap();
    assert!(storage.get("clubnath-v1", &req).unwrap().is_none());
    assert!(storage.match_any(&req).unwrap().is_none());
    assert!(storage.store_names().unwrap().is_empty());
  }
}
