//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation.  It also owns the
//! sending half of the change feed: every committed append is announced to
//! whoever called [`Database::changes`] first.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::models::ThreadChange;

/// Buffered change announcements before a slow consumer starts lagging.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Wrapper around a [`rusqlite::Connection`] plus the append change feed.
pub struct Database {
    conn: Connection,
    changes: broadcast::Sender<ThreadChange>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/aparte/aparte.db`
    /// - macOS:   `~/Library/Application Support/com.aparte.aparte/aparte.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\aparte\aparte\data\aparte.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "aparte", "aparte").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("aparte.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Ok(Self { conn, changes })
    }

    /// Subscribe to append announcements.
    ///
    /// Every committed append is sent exactly once, in commit order.  The
    /// subscription layer is expected to be the sole long-lived consumer.
    pub fn changes(&self) -> broadcast::Receiver<ThreadChange> {
        self.changes.subscribe()
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed log helpers, but direct access is
    /// occasionally needed for transactions or ad-hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn change_sender(&self) -> &broadcast::Sender<ThreadChange> {
        &self.changes
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
