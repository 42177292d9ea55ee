//! In-process request deduplication for async operations
//! Concurrent calls that share a key observe a single in-flight producer
//! instead of repeating its work; settled results stay joinable for a
//! short window before they expire

pub mod deduplication;
pub mod error;


use futures::Future;
use lazy_static::lazy_static;

// Re-export for convenience
pub use deduplication::{
    DedupeConfig, DedupeStats, Deduplicator, EntryInfo, SharedDeduplicator, DEFAULT_DURATION,
};
pub use error::{DedupeError, ProducerError};

lazy_static! {
    static ref SHARED: Deduplicator = Deduplicator::new();
}

/// The process-wide deduplicator behind the crate-level functions
/// Unrelated call sites using the same key share entries here; construct a
/// [`Deduplicator`] for an isolated registry
pub fn shared() -> &'static Deduplicator {
    &SHARED
}

/// Run `producer` through the process-wide deduplicator
pub async fn dedupe<T, E, F, Fut>(key: &str, producer: F) -> Result<T, DedupeError>
where
    T: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    SHARED.dedupe(key, producer).await
}

/// Drop one entry from the process-wide deduplicator
pub fn remove(key: &str) -> bool {
    SHARED.remove(key)
}

/// Drop every entry from the process-wide deduplicator
pub fn clear() {
    SHARED.clear()
}

/// Whether the process-wide deduplicator has an entry for `key`
pub fn has(key: &str) -> bool {
    SHARED.has(key)
}

/// Number of entries in the process-wide deduplicator
pub fn len() -> usize {
    SHARED.len()
}

/// Whether the process-wide deduplicator has no entries
pub fn is_empty() -> bool {
    SHARED.is_empty()
}
