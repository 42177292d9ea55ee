use crate::error::{DedupeError, ProducerError};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::{Future, FutureExt};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long a settled result stays joinable when no duration is configured
pub const DEFAULT_DURATION: Duration = Duration::from_millis(100);

/// Configuration for request deduplication
#[derive(Clone, Debug)]
pub struct DedupeConfig {
    /// How long a settled result stays joinable before it is dropped
    pub duration: Duration,
    /// Key transform carried for callers that derive keys up front;
    /// lookups use the key exactly as passed
    pub key_generator: Option<fn(&str) -> String>,
    /// Whether failed entries are dropped immediately instead of after
    /// `duration`
    pub clear_on_error: bool,
    /// Whether deduplication is enabled
    pub enabled: bool,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            key_generator: None,
            clear_on_error: true,
            enabled: true,
        }
    }
}

impl DedupeConfig {
    /// Create a configuration with a custom retention window
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }
}

/// Type-erased value settled by a producer
type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Shared handle to a producer's eventual settlement
type ResultHandle = Shared<BoxFuture<'static, Result<ErasedValue, ProducerError>>>;

/// A single in-flight or recently settled request
struct CacheEntry {
    handle: ResultHandle,
    created_at: DateTime<Utc>,
    ref_count: u64,
    id: u64,
}

/// Metadata snapshot of one entry
#[derive(Clone, Debug)]
pub struct EntryInfo {
    /// First request of the entry's current cycle
    pub created_at: DateTime<Utc>,
    /// How many requests have joined the entry, the creator included
    pub ref_count: u64,
}

/// Request deduplication system
/// When multiple callers ask for the same key concurrently, only the first
/// producer runs and its result is shared with every caller
pub struct Deduplicator {
    registry: Arc<DashMap<String, CacheEntry>>,
    next_entry_id: AtomicU64,
    pub config: DedupeConfig,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::with_config(DedupeConfig::default())
    }

    pub fn with_config(config: DedupeConfig) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            next_entry_id: AtomicU64::new(0),
            config,
        }
    }

    /// Run `producer` under `key`, sharing one execution with every
    /// concurrent caller of the same key
    /// If an entry for `key` is pending or still retained, the producer is
    /// not invoked and the existing result is awaited instead
    pub async fn dedupe<T, E, F, Fut>(&self, key: &str, producer: F) -> Result<T, DedupeError>
    where
        T: Clone + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(DedupeError::InvalidKey);
        }

        if !self.config.enabled {
            return match producer().await {
                Ok(value) => Ok(value),
                Err(cause) => Err(DedupeError::Producer(Arc::new(cause))),
            };
        }

        let handle = self.join_or_insert(key, producer);

        match handle.await {
            Ok(value) => match value.downcast::<T>() {
                Ok(value) => Ok(value.as_ref().clone()),
                Err(_) => Err(DedupeError::TypeMismatch {
                    key: key.to_string(),
                }),
            },
            Err(cause) => Err(DedupeError::Producer(cause)),
        }
    }

    /// Claim or join the entry for `key` and return its shared handle
    /// The registry shard lock covers the whole check-then-insert sequence;
    /// the producer is only invoked for a vacant entry, and its future is
    /// not polled until the returned handle is awaited
    fn join_or_insert<T, E, F, Fut>(&self, key: &str, producer: F) -> ResultHandle
    where
        T: Clone + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        match self.registry.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                log::debug!("Joining in-flight entry for key: {}", key);
                let entry = occupied.get_mut();
                entry.ref_count += 1;
                entry.handle.clone()
            }
            Entry::Vacant(vacant) => {
                log::debug!("Starting producer for key: {}", key);
                let entry_id = self.next_entry_id.fetch_add(1, Ordering::SeqCst);
                let handle = self.wrap_producer(key.to_string(), entry_id, producer());
                vacant.insert(CacheEntry {
                    handle: handle.clone(),
                    created_at: Utc::now(),
                    ref_count: 1,
                    id: entry_id,
                });
                handle
            }
        }
    }

    /// Box and share the producer future, attaching the settlement
    /// bookkeeping that performs or schedules the entry's removal
    fn wrap_producer<T, E>(
        &self,
        key: String,
        entry_id: u64,
        producer_fut: impl Future<Output = Result<T, E>> + Send + 'static,
    ) -> ResultHandle
    where
        T: Clone + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let registry = Arc::clone(&self.registry);
        let duration = self.config.duration;
        let clear_on_error = self.config.clear_on_error;

        async move {
            let settled: Result<ErasedValue, ProducerError> = match producer_fut.await {
                Ok(value) => Ok(Arc::new(value)),
                Err(cause) => Err(Arc::new(cause)),
            };

            let failed = settled.is_err();
            if failed {
                log::warn!("Producer failed for key: {}", key);
            }

            if failed && clear_on_error {
                remove_entry(&registry, &key, entry_id);
            } else {
                schedule_eviction(registry, key, entry_id, duration);
            }

            settled
        }
        .boxed()
        .shared()
    }

    /// Drop the entry for `key`, pending or settled
    /// Callers already sharing the entry keep their handle and still
    /// receive its result; the producer is not cancelled
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.registry.remove(key).is_some();
        if removed {
            log::debug!("Removed entry for key: {}", key);
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.registry.clear();
        log::info!("Deduplicator cleared");
    }

    /// Whether an entry (pending or settled) exists for `key`
    pub fn has(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }

    /// Number of entries currently registered
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Metadata for the entry under `key`, if one exists
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.registry.get(key).map(|entry| EntryInfo {
            created_at: entry.created_at,
            ref_count: entry.ref_count,
        })
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> DedupeStats {
        let entries = self.registry.len();
        let total_requests = self
            .registry
            .iter()
            .map(|entry| entry.value().ref_count)
            .sum();

        DedupeStats {
            entries,
            total_requests,
        }
    }
}

/// Remove the entry for `key` only if it is still the same entry
/// A stale timer or late settlement must not take down a newer entry
/// registered under the same key
fn remove_entry(registry: &DashMap<String, CacheEntry>, key: &str, entry_id: u64) {
    if registry
        .remove_if(key, |_, entry| entry.id == entry_id)
        .is_some()
    {
        log::debug!("Evicted entry for key: {}", key);
    }
}

/// Drop the entry once the retention window has passed, subject to the
/// identity check
fn schedule_eviction(
    registry: Arc<DashMap<String, CacheEntry>>,
    key: String,
    entry_id: u64,
    duration: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        remove_entry(&registry, &key, entry_id);
    });
}

/// Statistics about the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeStats {
    pub entries: usize,
    pub total_requests: u64,
}

/// Thread-safe wrapper for the deduplicator
pub type SharedDeduplicator = Arc<Deduplicator>;
