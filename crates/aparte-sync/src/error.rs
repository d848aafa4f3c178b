use thiserror::Error;

use aparte_shared::{CodecError, ResolveError};
use aparte_store::StoreError;

/// Errors surfaced to callers of the sync layer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Codec error: the message was not sent.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The durable store could not complete the request; retryable.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Thread resolution error.
    #[error("Thread resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// The store mutex was poisoned by a panicking holder.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fault delivered to live observers of a thread.
///
/// A fault does not end the subscription; the observer decides whether to
/// keep waiting, resubscribe, or surface a connectivity state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncFault {
    /// The message log could not be read.
    #[error("Message log unavailable: {0}")]
    Store(String),

    /// A stored record could not be decoded for delivery.
    #[error("Record could not be decoded: {0}")]
    Decode(String),
}
