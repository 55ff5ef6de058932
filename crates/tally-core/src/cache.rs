//! Vendor cache: description -> (category, vendor) decisions from the remote classifier
//!
//! Entries are keyed by the first 16 hex characters of the SHA-256 of the raw
//! description. Collisions are not detected. Entries never expire.
//!
//! Three stores implement [`CacheStore`]:
//! - [`JsonFileCache`]: one JSON object `{ "<key>": ["Category", "VENDOR"] }`.
//!   Every `get` reads the file fresh; every `put` rewrites it atomically
//!   under an in-process lock. Separate processes writing the same file are
//!   last-write-wins.
//! - [`SqliteCache`]: one row per key, written with a single upsert.
//! - [`MemoryCache`]: process-local map.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Length of a cache key in hex characters
pub const KEY_LEN: usize = 16;

/// Stable cache key for a description (not case-normalized)
pub fn cache_key(description: &str) -> String {
    let digest = Sha256::digest(description.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(KEY_LEN);
    key
}

/// A cached classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub category: String,
    pub vendor: String,
}

impl CacheEntry {
    pub fn new(category: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            vendor: vendor.into(),
        }
    }
}

/// Persistent mapping from description to a prior classification
///
/// Read failures are reported as misses; write failures are returned.
pub trait CacheStore: Send + Sync {
    /// Cached decision for a description, if any
    fn get(&self, description: &str) -> Option<CacheEntry>;

    /// Store (or overwrite) the decision for a description
    fn put(&self, description: &str, category: &str, vendor: &str) -> Result<()>;

    /// Number of stored entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Open the store matching a path's extension
///
/// `.db`, `.sqlite` and `.sqlite3` select SQLite; anything else is a JSON snapshot.
pub fn open_store(path: &Path) -> Result<Arc<dyn CacheStore>> {
    let is_sqlite = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "db" | "sqlite" | "sqlite3"))
        .unwrap_or(false);

    if is_sqlite {
        Ok(Arc::new(SqliteCache::open(path)?))
    } else {
        Ok(Arc::new(JsonFileCache::new(path)))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// JSON snapshot
// ---------------------------------------------------------------------------

/// JSON snapshot file store
pub struct JsonFileCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole snapshot; anything unreadable is an empty cache
    fn read_snapshot(&self) -> BTreeMap<String, (String, String)> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Cache unreadable, treating as empty");
                }
                return BTreeMap::new();
            }
        };

        let object = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "Cache is not a JSON object, treating as empty");
                return BTreeMap::new();
            }
        };

        let mut entries = BTreeMap::new();
        for (key, value) in object {
            match serde_json::from_value::<(String, String)>(value) {
                Ok(pair) => {
                    entries.insert(key, pair);
                }
                Err(_) => debug!(key = %key, "Skipping malformed cache entry"),
            }
        }
        entries
    }

    fn write_snapshot(&self, entries: &BTreeMap<String, (String, String)>) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl CacheStore for JsonFileCache {
    fn get(&self, description: &str) -> Option<CacheEntry> {
        self.read_snapshot()
            .remove(&cache_key(description))
            .map(|(category, vendor)| CacheEntry { category, vendor })
    }

    fn put(&self, description: &str, category: &str, vendor: &str) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let mut entries = self.read_snapshot();
        entries.insert(
            cache_key(description),
            (category.to_string(), vendor.to_string()),
        );
        self.write_snapshot(&entries)
    }

    fn len(&self) -> usize {
        self.read_snapshot().len()
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vendor_cache (
    key TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    vendor TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// SQLite-backed store
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) a cache database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// In-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SQLITE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheStore for SqliteCache {
    fn get(&self, description: &str) -> Option<CacheEntry> {
        let conn = lock(&self.conn);
        let result = conn
            .query_row(
                "SELECT category, vendor FROM vendor_cache WHERE key = ?",
                params![cache_key(description)],
                |row| {
                    Ok(CacheEntry {
                        category: row.get(0)?,
                        vendor: row.get(1)?,
                    })
                },
            )
            .optional();

        match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    fn put(&self, description: &str, category: &str, vendor: &str) -> Result<()> {
        let conn = lock(&self.conn);
        conn.execute(
            r#"
            INSERT INTO vendor_cache (key, category, vendor)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                category = excluded.category,
                vendor = excluded.vendor,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![cache_key(description), category, vendor],
        )?;
        Ok(())
    }

    fn len(&self) -> usize {
        let conn = lock(&self.conn);
        conn.query_row("SELECT COUNT(*) FROM vendor_cache", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as usize)
        .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store with no persistence
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, description: &str) -> Option<CacheEntry> {
        lock(&self.entries).get(&cache_key(description)).cloned()
    }

    fn put(&self, description: &str, category: &str, vendor: &str) -> Result<()> {
        lock(&self.entries).insert(cache_key(description), CacheEntry::new(category, vendor));
        Ok(())
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_key_shape() {
        let key = cache_key("AMAZON.COM");
        assert_eq!(key.len(), KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key("AMAZON.COM"));
        assert_ne!(key, cache_key("amazon.com"));
    }

    #[test]
    fn test_cache_key_known_digest() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223...
        assert_eq!(cache_key("abc"), "ba7816bf8f01cfea");
    }

    #[test]
    fn test_json_round_trip_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(dir.path().join("nested/dir/vendor_cache.json"));

        assert!(cache.get("NETFLIX").is_none());
        assert!(cache.is_empty());

        cache.put("NETFLIX", "Subscriptions", "NETFLIX").unwrap();
        assert_eq!(
            cache.get("NETFLIX"),
            Some(CacheEntry::new("Subscriptions", "NETFLIX"))
        );

        cache.put("NETFLIX", "Entertainment", "NETFLIX COM").unwrap();
        assert_eq!(
            cache.get("NETFLIX"),
            Some(CacheEntry::new("Entertainment", "NETFLIX COM"))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_json_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vendor_cache.json");
        let cache = JsonFileCache::new(&path);
        cache.put("SHELL OIL 123", "Fuel", "SHELL OIL").unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw[cache_key("SHELL OIL 123")];
        assert_eq!(entry[0], "Fuel");
        assert_eq!(entry[1], "SHELL OIL");
    }

    #[test]
    fn test_json_reads_fresh_each_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vendor_cache.json");
        let cache = JsonFileCache::new(&path);
        cache.put("A", "Dining", "A").unwrap();

        // Another writer updates the file behind our back
        let other = JsonFileCache::new(&path);
        other.put("B", "Fuel", "B").unwrap();

        assert_eq!(cache.get("B"), Some(CacheEntry::new("Fuel", "B")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_json_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vendor_cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = JsonFileCache::new(&path);
        assert!(cache.get("ANY").is_none());
        assert_eq!(cache.len(), 0);

        cache.put("ANY", "Services", "ANY").unwrap();
        assert_eq!(cache.get("ANY"), Some(CacheEntry::new("Services", "ANY")));
    }

    #[test]
    fn test_json_skips_malformed_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vendor_cache.json");
        let good = cache_key("GOOD");
        let bad = cache_key("BAD");
        fs::write(
            &path,
            format!(r#"{{"{}": ["Dining", "GOOD"], "{}": "oops"}}"#, good, bad),
        )
        .unwrap();

        let cache = JsonFileCache::new(&path);
        assert_eq!(cache.get("GOOD"), Some(CacheEntry::new("Dining", "GOOD")));
        assert!(cache.get("BAD").is_none());
    }

    #[test]
    fn test_json_write_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        // Parent "directory" is a regular file, so the rewrite cannot happen
        let cache = JsonFileCache::new(blocker.join("vendor_cache.json"));
        assert!(cache.put("A", "Dining", "A").is_err());
        assert!(cache.get("A").is_none());
    }

    #[test]
    fn test_json_concurrent_puts_in_process() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(JsonFileCache::new(dir.path().join("vendor_cache.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache
                        .put(&format!("DESC {}", i), "Services", &format!("V{}", i))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_sqlite_round_trip() {
        let cache = SqliteCache::in_memory().unwrap();
        assert!(cache.get("UBER TRIP").is_none());

        cache.put("UBER TRIP", "Transportation", "UBER").unwrap();
        cache.put("UBER TRIP", "Transportation", "UBER TRIP").unwrap();
        assert_eq!(
            cache.get("UBER TRIP"),
            Some(CacheEntry::new("Transportation", "UBER TRIP"))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sqlite_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache/vendor_cache.db");
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.put("COSTCO", "Groceries", "COSTCO").unwrap();
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get("COSTCO"), Some(CacheEntry::new("Groceries", "COSTCO")));
    }

    #[test]
    fn test_memory_round_trip() {
        let cache = MemoryCache::new();
        cache.put("X", "Rent", "X").unwrap();
        assert_eq!(cache.get("X"), Some(CacheEntry::new("Rent", "X")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_open_store_by_extension() {
        let dir = TempDir::new().unwrap();

        let sqlite = open_store(&dir.path().join("vendor_cache.sqlite3")).unwrap();
        sqlite.put("A", "Dining", "A").unwrap();
        assert!(dir.path().join("vendor_cache.sqlite3").exists());

        let json = open_store(&dir.path().join("vendor_cache.json")).unwrap();
        json.put("A", "Dining", "A").unwrap();
        let raw = fs::read_to_string(dir.path().join("vendor_cache.json")).unwrap();
        assert!(raw.trim_start().starts_with('{'));
    }
}
