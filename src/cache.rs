//! Disk-backed result cache for model queries
//!
//! Content-addressed by a SHA-256 hash of (prompt, context, model), one JSON
//! file per entry, TTL-expiring on read. The cache is a peer facility used by
//! the processing call itself to avoid paying for the same query twice; the
//! engine never touches it directly.
//!
//! There is no locking: concurrent writers to the same key race at the
//! filesystem level and the last writer wins. Single-writer use only.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A cached model query result. Immutable once written; re-setting the same
/// key overwrites the whole entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: String,
    pub created_at: DateTime<Utc>,
    pub tokens_saved: u64,
    pub model: String,
    /// First 16 chars of the cache key, kept for debugging.
    pub prompt_hash: String,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("mailwise_cache"),
            ttl_hours: 24,
        }
    }
}

/// Hit/miss statistics for one cache instance.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub tokens_saved: u64,
}

/// Disk-backed cache for model query results.
pub struct QueryCache {
    cache_dir: PathBuf,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    tokens_saved: AtomicU64,
}

impl QueryCache {
    /// Create a cache with the default temp-scoped directory and 24h TTL.
    pub fn new() -> Result<Self> {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache with custom configuration, creating the directory.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.cache_dir)?;
        Ok(Self {
            cache_dir: config.cache_dir,
            ttl: Duration::hours(config.ttl_hours),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            tokens_saved: AtomicU64::new(0),
        })
    }

    /// Derive the cache key for a (prompt, context, model) triple.
    ///
    /// The hash covers the delimiter-joined full string, so fields containing
    /// the delimiter cannot collide unless the SHA-256 digests themselves do.
    pub fn key_for(&self, prompt: &str, context: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{prompt}|{context}|{model}").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Retrieve a cached result if present, parsable, and not expired.
    ///
    /// Corrupted and expired entries are removed on detection and counted as
    /// misses.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.entry_path(key);

        if !path.exists() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let entry = match fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<CacheEntry>(&content).ok())
        {
            Some(entry) => entry,
            None => {
                debug!("Removing corrupted cache entry {}", path.display());
                let _ = fs::remove_file(&path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if Utc::now() - entry.created_at > self.ttl {
            debug!("Removing expired cache entry {}", path.display());
            let _ = fs::remove_file(&path);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        self.tokens_saved
            .fetch_add(entry.tokens_saved, Ordering::Relaxed);
        Some(entry.result)
    }

    /// Store a result, overwriting any prior entry for the key.
    pub fn set(&self, key: &str, result: &str, tokens: u64, model: &str) -> Result<()> {
        let entry = CacheEntry {
            result: result.to_string(),
            created_at: Utc::now(),
            tokens_saved: tokens,
            model: model.to_string(),
            prompt_hash: key.chars().take(16).collect(),
        };

        let path = self.entry_path(key);
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(&entry)?;

        // Write to temp file then rename so a crash mid-write never leaves a
        // truncated entry behind.
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Return statistics for this cache instance.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
        }
    }

    /// Delete every stored entry unconditionally. Returns the removed count.
    pub fn clear(&self) -> Result<usize> {
        let mut count = 0;
        for path in self.entry_files()? {
            fs::remove_file(&path)?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove expired and unparsable entries. O(entries) directory scan.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let mut count = 0;
        for path in self.entry_files()? {
            let expired = match fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<CacheEntry>(&content).ok())
            {
                Some(entry) => Utc::now() - entry.created_at > self.ttl,
                None => true,
            };

            if expired {
                fs::remove_file(&path)?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}
