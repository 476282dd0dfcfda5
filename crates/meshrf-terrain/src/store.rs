//! Key/value stores with per-entry expiry, shared by the tile and result caches.

use crate::{Result, TerrainError};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A byte store whose entries expire after a TTL.
///
/// Expired entries behave exactly like absent ones. Concurrent `set` calls for
/// the same key overwrite each other; the last writer wins.
pub trait CacheStore: Send + Sync {
    /// Read an unexpired entry.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an entry that expires `ttl` from now.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
}

// ============================================================================
// In-process store
// ============================================================================

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Values with their expiry; `None` never expires.
    entries: RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| TerrainError::CacheLockPoisoned)?;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| is_live(*expires))
            .map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| TerrainError::CacheLockPoisoned)?;
        entries.retain(|_, (_, expires)| is_live(*expires));
        entries.insert(key.to_string(), (value.to_vec(), Instant::now().checked_add(ttl)));
        Ok(())
    }
}

fn is_live(expires: Option<Instant>) -> bool {
    expires.map_or(true, |at| Instant::now() < at)
}

// ============================================================================
// File-backed store
// ============================================================================

/// One file per key under a directory, surviving restarts.
///
/// Each file starts with the expiry instant as milliseconds since the Unix
/// epoch (i64 LE) followed by the payload. Files are written to a uniquely
/// named temporary file and renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.bin", name))
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < 8 {
            warn!(path = %path.display(), "truncated cache entry, ignoring");
            return Ok(None);
        }
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&bytes[..8]);
        let expires_ms = i64::from_le_bytes(stamp);

        if Utc::now().timestamp_millis() >= expires_ms {
            debug!(key, "cache entry expired");
            return Ok(None);
        }
        Ok(Some(bytes[8..].to_vec()))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_ms = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        let path = self.path_for(key);
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(&expires_ms.to_le_bytes())?;
        file.write_all(value)?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_ttl() {
        let store = MemoryStore::new();
        store.set("a", b"hello", Duration::from_secs(60)).unwrap();
        store.set("b", b"gone", Duration::ZERO).unwrap();

        assert_eq!(store.get("a").unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_file_store_round_trip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("tile:12:1:2", &[1, 2, 3], Duration::from_secs(3600)).unwrap();
        assert_eq!(store.get("tile:12:1:2").unwrap(), Some(vec![1, 2, 3]));

        store.set("tile:12:1:2", &[9], Duration::ZERO).unwrap();
        assert_eq!(store.get("tile:12:1:2").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::open(dir.path())
            .unwrap()
            .set("k", b"persisted", Duration::from_secs(60))
            .unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("k").unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn test_file_store_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        std::thread::scope(|scope| {
            for i in 0u8..8 {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.set("shared", &[i; 64], Duration::from_secs(60)).unwrap();
                    }
                });
            }
        });

        let value = store.get("shared").unwrap().unwrap();
        assert_eq!(value.len(), 64);
        assert!(value.iter().all(|b| *b == value[0]));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_memory_store_unbounded_ttl() {
        let store = MemoryStore::new();
        store.set("forever", b"x", Duration::MAX).unwrap();
        assert_eq!(store.get("forever").unwrap().as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn test_file_store_key_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let path = store.path_for("link:../../etc");
        assert_eq!(path.parent(), Some(dir.path()));
    }
}
