use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a producer, shared with every caller that joined the
/// same entry. Each of them receives a clone of the same `Arc`.
pub type ProducerError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during request deduplication
#[derive(Debug, Clone, Error)]
pub enum DedupeError {
    /// The key failed validation before any work started
    #[error("Key must be a non-empty string")]
    InvalidKey,
    /// The producer failed; the underlying error is passed through verbatim
    #[error(transparent)]
    Producer(ProducerError),
    /// Two call sites used one key for different value types on the same
    /// registry
    #[error("Conflicting value types for key: {key}")]
    TypeMismatch { key: String },
}
