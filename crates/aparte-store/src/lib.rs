//! # aparte-store
//!
//! Durable, append-only message log, backed by SQLite.
//!
//! Each thread's records form a totally ordered sequence: the store assigns
//! a monotonic server timestamp at append time and SQLite's rowid breaks
//! ties in arrival order.  Every committed append is announced on a change
//! feed so the subscription layer can fan the new state out to observers.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
