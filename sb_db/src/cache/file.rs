//! ABOUTME: File-backed TTL cache with an in-memory LRU hot tier
//! ABOUTME: Entries are JSON files replaced atomically through temp file and rename

use super::memory::LruCache;
use crate::metrics::CacheMetrics;
use sb_core::{time::unix_now_secs, Id};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

const ENTRY_SUFFIX: &str = ".cache";

/// Build a cache key from a prefix plus positional and keyword arguments.
///
/// Keyword arguments are sorted by name first, so the same set of arguments
/// always hashes to the same key regardless of the order they were passed in.
pub fn cache_key(prefix: &str, args: &[String], kwargs: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = kwargs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let key_data = format!("{}:{:?}:{:?}", prefix, args, sorted);
    format!("{}_{:x}", prefix, md5::compute(key_data.as_bytes()))
}

/// On-disk representation of one entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    data: Value,
    created_at: f64,
    expires_at: f64,
}

impl StoredEntry {
    fn is_expired(&self, now: f64) -> bool {
        now > self.expires_at
    }
}

/// Snapshot of the cache directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_size_mb: f64,
    pub expired_files: usize,
    pub cache_dir: String,
    pub memory_entries: usize,
}

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    default_ttl: Duration,
    enabled: bool,
    memory: Arc<RwLock<LruCache<Value>>>,
    metrics: CacheMetrics,
}

impl FileCache {
    /// Create the cache, making sure its directory exists
    pub fn new(
        dir: impl Into<PathBuf>,
        default_ttl: Duration,
        memory_capacity: usize,
    ) -> sb_core::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            default_ttl,
            enabled: true,
            memory: Arc::new(RwLock::new(LruCache::new(memory_capacity))),
            metrics: CacheMetrics::new(),
        })
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// A disabled cache misses every lookup and refuses writes
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", key, ENTRY_SUFFIX))
    }

    /// Look up a raw JSON value
    #[instrument(skip(self))]
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        if let Some(value) = self.memory_get(key) {
            self.metrics.record_hit();
            return Some(value);
        }

        let path = self.entry_path(key);
        let loaded = tokio::task::spawn_blocking(move || load_entry(&path)).await;

        match loaded {
            Ok(Some(entry)) => {
                let remaining = entry.expires_at - unix_now_secs();
                if remaining > 0.0 {
                    self.memory_put(key, entry.data.clone(), Duration::from_secs_f64(remaining));
                }
                debug!("Cache hit for key: {}", key);
                self.metrics.record_hit();
                Some(entry.data)
            }
            Ok(None) => {
                debug!("Cache miss for key: {}", key);
                self.metrics.record_miss();
                None
            }
            Err(e) => {
                warn!("Cache read task failed for key {}: {}", key, e);
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Look up and deserialize an entry; entries of the wrong shape are dropped
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Dropping cache entry {} with unexpected shape: {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    /// Store an entry; `None` uses the default TTL
    #[instrument(skip(self, data))]
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) -> bool {
        if !self.enabled {
            return false;
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return false;
            }
        };

        let now = unix_now_secs();
        let entry = StoredEntry {
            data: value.clone(),
            created_at: now,
            expires_at: now + ttl.as_secs_f64(),
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return false;
            }
        };

        let dir = self.dir.clone();
        let owned_key = key.to_string();
        let written =
            tokio::task::spawn_blocking(move || write_atomic(&dir, &owned_key, &bytes)).await;

        match written {
            Ok(Ok(())) => {
                self.memory_put(key, value, ttl);
                self.metrics.record_write();
                debug!("Cached key: {}", key);
                true
            }
            Ok(Err(e)) => {
                warn!("Failed to write cache entry {}: {}", key, e);
                false
            }
            Err(e) => {
                warn!("Cache write task failed for key {}: {}", key, e);
                false
            }
        }
    }

    /// Remove one entry; true when a file was deleted
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> bool {
        if let Ok(mut memory) = self.memory.write() {
            memory.invalidate(key);
        }

        let path = self.entry_path(key);
        let removed = tokio::task::spawn_blocking(move || fs::remove_file(path).is_ok())
            .await
            .unwrap_or(false);
        if removed {
            self.metrics.record_invalidations(1);
        }
        removed
    }

    /// Remove all entries, or only those whose key starts with `prefix`
    #[instrument(skip(self))]
    pub async fn clear(&self, prefix: Option<&str>) -> usize {
        match self.memory.write() {
            Ok(mut memory) => match prefix {
                Some(p) => {
                    memory.invalidate_prefix(p);
                }
                None => memory.clear(),
            },
            Err(e) => warn!("Failed to acquire memory tier lock: {}", e),
        }

        let dir = self.dir.clone();
        let prefix = prefix.map(str::to_string);
        let removed = tokio::task::spawn_blocking(move || {
            entry_files(&dir)
                .into_iter()
                .filter(|(_, name)| prefix.as_deref().map_or(true, |p| name.starts_with(p)))
                .filter(|(path, _)| fs::remove_file(path).is_ok())
                .count()
        })
        .await
        .unwrap_or(0);

        debug!(removed, "Cleared cache entries");
        self.metrics.record_invalidations(removed);
        removed
    }

    /// Count entries on disk; unreadable entries are reported as expired
    pub async fn stats(&self) -> CacheStats {
        let dir = self.dir.clone();
        let (total_files, total_bytes, expired_files) = tokio::task::spawn_blocking(move || {
            let now = unix_now_secs();
            let mut total_files = 0usize;
            let mut total_bytes = 0u64;
            let mut expired_files = 0usize;

            for (path, _) in entry_files(&dir) {
                total_files += 1;
                total_bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                match read_entry(&path) {
                    Ok(entry) if !entry.is_expired(now) => {}
                    _ => expired_files += 1,
                }
            }
            (total_files, total_bytes, expired_files)
        })
        .await
        .unwrap_or((0, 0, 0));

        let memory_entries = self.memory.read().map(|m| m.size()).unwrap_or(0);
        let megabytes = total_bytes as f64 / (1024.0 * 1024.0);

        CacheStats {
            total_files,
            total_size_mb: (megabytes * 100.0).round() / 100.0,
            expired_files,
            cache_dir: self.dir.to_string_lossy().into_owned(),
            memory_entries,
        }
    }

    /// Delete expired and unreadable entries, returning how many went away
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> usize {
        let dir = self.dir.clone();
        let removed = tokio::task::spawn_blocking(move || {
            let now = unix_now_secs();
            entry_files(&dir)
                .into_iter()
                .filter(|(path, _)| match read_entry(path) {
                    Ok(entry) => entry.is_expired(now),
                    Err(_) => true,
                })
                .filter(|(path, _)| fs::remove_file(path).is_ok())
                .count()
        })
        .await
        .unwrap_or(0);

        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
            self.metrics.record_invalidations(removed);
        }
        removed
    }

    fn memory_get(&self, key: &str) -> Option<Value> {
        match self.memory.write() {
            Ok(mut memory) => memory.get(key),
            Err(e) => {
                warn!("Failed to acquire memory tier lock: {}", e);
                None
            }
        }
    }

    fn memory_put(&self, key: &str, value: Value, ttl: Duration) {
        match self.memory.write() {
            Ok(mut memory) => memory.put(key.to_string(), value, ttl),
            Err(e) => warn!("Failed to acquire memory tier lock: {}", e),
        }
    }
}

enum ReadFailure {
    Missing,
    Corrupt,
}

fn read_entry(path: &Path) -> Result<StoredEntry, ReadFailure> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ReadFailure::Missing),
        Err(_) => return Err(ReadFailure::Corrupt),
    };
    serde_json::from_slice(&bytes).map_err(|_| ReadFailure::Corrupt)
}

/// Read a live entry, deleting the file when it is expired or corrupt
fn load_entry(path: &Path) -> Option<StoredEntry> {
    match read_entry(path) {
        Ok(entry) if !entry.is_expired(unix_now_secs()) => Some(entry),
        Ok(_) | Err(ReadFailure::Corrupt) => {
            let _ = fs::remove_file(path);
            None
        }
        Err(ReadFailure::Missing) => None,
    }
}

fn write_atomic(dir: &Path, key: &str, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(".{}.{}.tmp", key, Id::new()));
    let target = dir.join(format!("{}{}", key, ENTRY_SUFFIX));

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Entry files in the cache dir as (path, file name)
fn entry_files(dir: &Path) -> Vec<(PathBuf, String)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list cache dir {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.ends_with(ENTRY_SUFFIX).then(|| (entry.path(), name))
        })
        .collect()
}
