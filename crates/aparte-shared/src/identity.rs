//! The directory identity record.
//!
//! Identities are issued and kept current by the external identity provider
//! and directory feed; the sync core only ever reads them.  Every struct
//! derives `Serialize` and `Deserialize` so it can be handed directly to a
//! host UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user as published by the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Stable unique identifier assigned by the identity provider.
    pub id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Optional account email.
    pub email: Option<String>,
    /// Optional avatar image URI.
    pub avatar_url: Option<String>,
    /// When the user was last seen, as reported by the provider.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Identity {
    /// Build a minimal identity with only the required fields set.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: None,
            avatar_url: None,
            last_seen: None,
        }
    }
}
