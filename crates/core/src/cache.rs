use crate::error::ConfigError;
use crate::index::DatasetIndex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Maximum number of loaded datasets; the least recently used one is evicted.
    pub capacity: usize,
    /// Entries older than this are treated as not loaded.
    pub ttl: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: None,
        }
    }
}

impl CachePolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::CachePolicy(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::CachePolicy("ttl must be positive".to_string()));
        }
        Ok(())
    }
}

struct CacheEntry {
    index: Arc<DatasetIndex>,
    loaded_at: Instant,
    last_used: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.loaded_at) >= ttl)
    }
}

/// Loaded indexes keyed by dataset name. Readers share the lock; inserts
/// replace whole entries, so a reader sees either the old or the new index.
pub struct IndexCache {
    policy: CachePolicy,
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: AtomicU64,
}

impl IndexCache {
    pub fn new(policy: CachePolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
        })
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Inserts or replaces `name`, returning the names evicted to make room.
    pub async fn insert(&self, name: &str, index: DatasetIndex) -> Vec<String> {
        let now = Instant::now();
        let entry = CacheEntry {
            index: Arc::new(index),
            loaded_at: now,
            last_used: AtomicU64::new(self.tick()),
        };

        let mut entries = self.entries.write().await;
        let mut evicted = entries
            .iter()
            .filter(|(key, entry)| key.as_str() != name && entry.is_expired(self.policy.ttl, now))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in &evicted {
            entries.remove(key);
        }

        entries.insert(name.to_string(), entry);

        while entries.len() > self.policy.capacity {
            let oldest = entries
                .iter()
                .filter(|(key, _)| key.as_str() != name)
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    evicted.push(key);
                }
                None => break,
            }
        }

        if !evicted.is_empty() {
            info!(loaded = name, evicted = ?evicted, "evicted cached indexes");
        }
        evicted
    }

    /// Returns the loaded index without ever loading it. Expired entries
    /// are dropped on the way out.
    pub async fn get(&self, name: &str) -> Option<Arc<DatasetIndex>> {
        {
            let entries = self.entries.read().await;
            let entry = entries.get(name)?;
            if !entry.is_expired(self.policy.ttl, Instant::now()) {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                return Some(entry.index.clone());
            }
        }

        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if entries
            .get(name)
            .is_some_and(|entry| entry.is_expired(self.policy.ttl, now))
        {
            entries.remove(name);
            debug!(dataset = name, "dropped expired index");
        }
        None
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }

    pub async fn loaded(&self) -> Vec<String> {
        let now = Instant::now();
        let mut names = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.is_expired(self.policy.ttl, now))
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}
