//! # aparte-sync
//!
//! Live synchronization layer over the message log.
//!
//! The [`SyncEngine`] owns the store and its change feed; observers open
//! [`Subscription`]s per thread and receive the complete ordered log as a
//! fresh snapshot after every committed append.  [`ThreadSession`] bounds a
//! UI context to one live subscription, cancelling the old thread before
//! activating the next.  The [`directory`] module carries the read-only
//! surface the core consumes from the identity provider and user directory.

pub mod config;
pub mod directory;
pub mod engine;
pub mod session;

mod error;

pub use config::SyncConfig;
pub use directory::{AuthEvent, DirectoryFeed, DirectoryPublisher, IdentityEvents};
pub use engine::{
    Subscription, SubscriptionHandle, SyncEngine, ThreadMessage, ThreadSnapshot, ThreadUpdate,
};
pub use error::{SyncError, SyncFault};
pub use session::ThreadSession;

// Re-export what hosts need alongside the engine.
pub use aparte_shared::{DecryptPolicy, Identity, MessageCodec, ThreadKey};
pub use aparte_store::{Database, MessageRecord};
