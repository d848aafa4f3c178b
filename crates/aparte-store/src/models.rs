//! Structs persisted in (or emitted by) the local message log.
//!
//! [`MessageRecord`] derives `Serialize` and `Deserialize` so it can be
//! handed directly to a host UI layer.

use aparte_shared::ThreadKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Message record
// ---------------------------------------------------------------------------

/// A single committed message.  The body is stored as the codec produced it.
///
/// Once committed, a record never changes: the log is append-only and keeps
/// no retention or deletion policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    /// Unique message identifier, assigned by the store at append time.
    pub id: Uuid,
    /// The thread this message belongs to.
    pub thread: ThreadKey,
    /// Identity id of the sender.
    pub sender_id: String,
    /// Encrypted message body (base64 envelope), opaque to the store.
    pub ciphertext: String,
    /// Server-side timestamp, non-decreasing within a thread.
    pub server_ts: DateTime<Utc>,
    /// Arrival order at the store; breaks `server_ts` ties.
    pub seq: i64,
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// Announcement of one committed append, published on the store change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadChange {
    /// The thread that grew.
    pub thread: ThreadKey,
    /// Arrival order of the appended record.
    pub seq: i64,
}
