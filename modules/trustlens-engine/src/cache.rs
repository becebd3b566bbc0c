//! Snapshot cache: abstract get/set-with-TTL semantics over serialized
//! snapshots. The pipeline degrades gracefully when the cache errors:
//! `CacheUnavailable` is logged and research proceeds live.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use trustlens_common::{InfluencerSnapshot, ResearchError};

#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Fetch the serialized snapshot for a key, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, ResearchError>;

    /// Store a serialized snapshot under a key with a TTL.
    /// Last writer wins.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), ResearchError>;
}

/// In-memory cache: serialized JSON values with expiry instants. Values
/// are stored serialized so a round-trip returns the snapshot
/// byte-for-byte.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ResearchError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((expires_at, value)) if *expires_at > Instant::now() => {
                Ok(Some(value.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), ResearchError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (Instant::now() + ttl, value));
        Ok(())
    }
}

/// Read a snapshot through the cache, tolerating cache failures.
/// Returns None on a miss, an expired entry, an undeserializable value,
/// or a cache error (logged).
pub async fn read_snapshot(cache: &dyn SnapshotCache, key: &str) -> Option<InfluencerSnapshot> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(key, error = %e, "Cached snapshot failed to deserialize, ignoring");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(key, error = %e, "Cache read failed, proceeding with live research");
            None
        }
    }
}

/// Write a snapshot through the cache, tolerating cache failures.
pub async fn write_snapshot(
    cache: &dyn SnapshotCache,
    key: &str,
    snapshot: &InfluencerSnapshot,
    ttl: Duration,
) {
    let raw = match serde_json::to_string(snapshot) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key, error = %e, "Snapshot failed to serialize, skipping cache write");
            return;
        }
    };
    if let Err(e) = cache.put(key, raw, ttl).await {
        warn!(key, error = %e, "Cache write failed, result is uncached");
    }
}
