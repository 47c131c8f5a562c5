//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::error::CacheError;
use super::types::{Fingerprint, Headers, Response, ResponseKind};

/// A response found in a cache store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was written
  pub cached_at: DateTime<Utc>,
}

/// Summary row for listing a store's contents.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub method: String,
  pub url: String,
  pub status: u16,
  pub cached_at: DateTime<Utc>,
}

/// Named key-value cache stores, keyed by request fingerprint.
///
/// Implementations serialize individual operations internally; callers do no locking.
pub trait CacheStorage: Send + Sync {
  /// Create the store if it does not exist.
  fn open(&self, name: &str) -> Result<(), CacheError>;

  /// Names of all existing stores.
  fn keys(&self) -> Result<Vec<String>, CacheError>;

  /// Delete a store and all its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool, CacheError>;

  /// Look up a response by fingerprint.
  fn match_request(
    &self,
    name: &str,
    fingerprint: &Fingerprint,
  ) -> Result<Option<CachedResponse>, CacheError>;

  /// Store a response, replacing any previous entry. Opens the store if needed.
  fn put(&self, name: &str, fingerprint: &Fingerprint, response: &Response)
    -> Result<(), CacheError>;

  /// List entries of a store.
  fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError>;

  /// Delete every store except `keep`, returning the deleted names.
  fn retain_only(&self, keep: &str) -> Result<Vec<String>, CacheError> {
    let mut deleted = Vec::new();
    for name in self.keys()? {
      if name != keep && self.delete(&name)? {
        deleted.push(name);
      }
    }
    Ok(deleted)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self, CacheError> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CacheError::unavailable(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(&path).map_err(|e| {
      CacheError::unavailable(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory().map_err(|e| {
      CacheError::unavailable(format!("Failed to open in-memory cache database: {}", e))
    })?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, CacheError> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CacheError::unavailable("Could not determine data directory"))?;

    Ok(data_dir.join("shakeguard").join("cache.db"))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::unavailable(format!("Lock poisoned: {}", e)))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<(), CacheError> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| CacheError::unavailable(format!("Failed to run cache migrations: {}", e)))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per named, versioned store
CREATE TABLE IF NOT EXISTS cache_stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request fingerprint
CREATE TABLE IF NOT EXISTS cache_entries (
    store TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    kind TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, fingerprint)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_store ON cache_entries(store);
"#;

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<(), CacheError> {
    self
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to open store {}: {}", name, e)))?;
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY created_at, name")
      .map_err(|e| CacheError::unavailable(format!("Failed to prepare query: {}", e)))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| CacheError::unavailable(format!("Failed to list stores: {}", e)))?
      .collect::<Result<Vec<String>, _>>()
      .map_err(|e| CacheError::unavailable(format!("Failed to read store name: {}", e)))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool, CacheError> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| CacheError::unavailable(format!("Failed to begin transaction: {}", e)))?;

    tx.execute("DELETE FROM cache_entries WHERE store = ?", params![name])
      .map_err(|e| CacheError::unavailable(format!("Failed to delete entries of {}: {}", name, e)))?;
    let removed = tx
      .execute("DELETE FROM cache_stores WHERE name = ?", params![name])
      .map_err(|e| CacheError::unavailable(format!("Failed to delete store {}: {}", name, e)))?;

    tx.commit()
      .map_err(|e| CacheError::unavailable(format!("Failed to commit transaction: {}", e)))?;

    Ok(removed > 0)
  }

  fn match_request(
    &self,
    name: &str,
    fingerprint: &Fingerprint,
  ) -> Result<Option<CachedResponse>, CacheError> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, kind, cached_at FROM cache_entries
         WHERE store = ? AND fingerprint = ?",
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to prepare query: {}", e)))?;

    let row: Option<(u16, String, Vec<u8>, String, String)> = stmt
      .query_row(params![name, fingerprint.hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .optional()
      .map_err(|e| CacheError::unavailable(format!("Failed to look up {}: {}", fingerprint, e)))?;

    match row {
      Some((status, headers, body, kind, cached_at)) => {
        let headers: Headers = serde_json::from_str(&headers)?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
            kind: ResponseKind::parse(&kind),
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(
    &self,
    name: &str,
    fingerprint: &Fingerprint,
    response: &Response,
  ) -> Result<(), CacheError> {
    let headers = serde_json::to_string(&response.headers)?;

    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| CacheError::unavailable(format!("Failed to begin transaction: {}", e)))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| CacheError::unavailable(format!("Failed to open store {}: {}", name, e)))?;

    tx.execute(
      "INSERT OR REPLACE INTO cache_entries
         (store, fingerprint, method, url, status, headers, body, kind, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        name,
        fingerprint.hash(),
        fingerprint.method,
        fingerprint.url,
        response.status,
        headers,
        response.body,
        response.kind.as_str(),
      ],
    )
    .map_err(|e| CacheError::unavailable(format!("Failed to store {}: {}", fingerprint, e)))?;

    tx.commit()
      .map_err(|e| CacheError::unavailable(format!("Failed to commit transaction: {}", e)))?;

    Ok(())
  }

  fn entries(&self, name: &str) -> Result<Vec<CacheEntry>, CacheError> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT method, url, status, cached_at FROM cache_entries
         WHERE store = ?
         ORDER BY url, method",
      )
      .map_err(|e| CacheError::unavailable(format!("Failed to prepare query: {}", e)))?;

    let rows: Vec<(String, String, u16, String)> = stmt
      .query_map(params![name], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .map_err(|e| CacheError::unavailable(format!("Failed to list entries: {}", e)))?
      .collect::<Result<_, _>>()
      .map_err(|e| CacheError::unavailable(format!("Failed to read entry: {}", e)))?;

    rows
      .into_iter()
      .map(|(method, url, status, cached_at)| {
        Ok(CacheEntry {
          method,
          url,
          status,
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }

  fn retain_only(&self, keep: &str) -> Result<Vec<String>, CacheError> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| CacheError::unavailable(format!("Failed to begin transaction: {}", e)))?;

    let stale: Vec<String> = {
      let mut stmt = tx
        .prepare("SELECT name FROM cache_stores WHERE name != ?")
        .map_err(|e| CacheError::unavailable(format!("Failed to prepare query: {}", e)))?;
      let names = stmt
        .query_map(params![keep], |row| row.get(0))
        .map_err(|e| CacheError::unavailable(format!("Failed to list stores: {}", e)))?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| CacheError::unavailable(format!("Failed to read store name: {}", e)))?;
      names
    };

    // Entries may exist for a store name that was never opened explicitly
    tx.execute("DELETE FROM cache_entries WHERE store != ?", params![keep])
      .map_err(|e| CacheError::unavailable(format!("Failed to purge stale entries: {}", e)))?;
    tx.execute("DELETE FROM cache_stores WHERE name != ?", params![keep])
      .map_err(|e| CacheError::unavailable(format!("Failed to purge stale stores: {}", e)))?;

    tx.commit()
      .map_err(|e| CacheError::unavailable(format!("Failed to commit transaction: {}", e)))?;

    Ok(stale)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| CacheError::unavailable(format!("Failed to parse datetime '{}': {}", s, e)))
}
