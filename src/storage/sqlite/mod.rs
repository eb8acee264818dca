//! `SQLite` store: the persistent backend.
//!
//! One connection behind a `Mutex`, WAL journaling, and a
//! `CREATE TABLE IF NOT EXISTS` schema so opening an existing database is a
//! no-op. State `seq_no` values come from a shared rowid-backed counter
//! table, so entity and relationship states share one monotonic order.
//!
//! ## Sequencing
//!
//! Sibling renumbering (structures under one parent, units within one
//! structure) runs inside a transaction and shifts sequences through a large
//! offset, so the `(parent, sequence)` unique index never observes a
//! transient duplicate mid-update.

// Allow cast_possible_truncation and cast_sign_loss for SQLite i64 to u32/u64
// conversions. SQLite returns i64, but sequences and counters are non-negative.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Allow cast_possible_wrap for u32/u64 to i64 casts used as SQLite parameters.
#![allow(clippy::cast_possible_wrap)]

mod content;
mod knowledge;
mod presentation;
mod provenance;

use crate::models::CreationSource;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Shift applied during sibling renumbering so the unique sequence index
/// never sees a transient duplicate. Sequences are u32, so offset rows can
/// never collide with live ones.
pub(crate) const SEQUENCE_SHIFT: i64 = 1 << 33;

/// Acquires the connection mutex, recovering from poisoning.
pub(crate) fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("store SQLite mutex was poisoned, recovering");
            metrics::counter!("fabula_sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Builds a rusqlite row-conversion error for a malformed stored column.
pub(crate) fn bad_column(field: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("malformed {field} column").into(),
    )
}

/// Parses an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(raw: &str, field: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| bad_column(field))
}

/// Parses a creation source column.
pub(crate) fn parse_source(raw: &str) -> rusqlite::Result<CreationSource> {
    CreationSource::parse(raw).ok_or_else(|| bad_column("source"))
}

/// `SQLite`-backed store implementing every store trait.
///
/// # Concurrency Model
///
/// A single `Mutex<Connection>`; WAL mode plus `busy_timeout` keep readers
/// from stalling writers opened on other connections to the same file.
///
/// # Example
///
/// ```rust,ignore
/// use fabula::storage::SqliteStore;
///
/// let store = SqliteStore::new("fabula.db")?;
/// ```
pub struct SqliteStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if needed) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path)
            .map_err(|e| Error::operation("open_sqlite_store", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::operation("open_sqlite_store_memory", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Draws the next store-wide state sequence number.
    pub(crate) fn next_seq_no(conn: &Connection) -> Result<u64> {
        conn.execute("INSERT INTO state_seq DEFAULT VALUES", [])
            .map_err(|e| Error::operation("next_seq_no", e))?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Initializes pragmas and the schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // Enable WAL mode for better concurrent read performance
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        // Enable foreign keys for referential integrity
        let _ = conn.pragma_update(None, "foreign_keys", "ON");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state_seq (
                id INTEGER PRIMARY KEY AUTOINCREMENT
            );

            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                additional_types TEXT NOT NULL DEFAULT '[]',
                aliases TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entity_states (
                id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL,
                importance INTEGER NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                knowledge TEXT NOT NULL DEFAULT '{}',
                evidence TEXT NOT NULL DEFAULT '[]',
                contexts TEXT NOT NULL DEFAULT '[]',
                provenance TEXT,
                seq_no INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS relationships (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                subtype TEXT,
                current_status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS relationship_states (
                id TEXT PRIMARY KEY,
                relationship_id TEXT NOT NULL,
                status TEXT NOT NULL,
                strength INTEGER,
                description TEXT NOT NULL DEFAULT '',
                properties TEXT NOT NULL DEFAULT '{}',
                evidence TEXT NOT NULL DEFAULT '[]',
                contexts TEXT NOT NULL DEFAULT '[]',
                provenance TEXT,
                seq_no INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS structures (
                id TEXT PRIMARY KEY,
                structure_type TEXT NOT NULL,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                parent_id TEXT,
                sequence INTEGER NOT NULL,
                meta_info TEXT NOT NULL DEFAULT '{}',
                ai_summary TEXT,
                is_published INTEGER NOT NULL DEFAULT 0,
                is_canonical INTEGER NOT NULL DEFAULT 1,
                is_supplementary INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS units (
                id TEXT PRIMARY KEY,
                structure_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL,
                UNIQUE (structure_id, sequence)
            );

            CREATE TABLE IF NOT EXISTS contexts (
                id TEXT PRIMARY KEY,
                context_type TEXT NOT NULL,
                scope TEXT NOT NULL,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                content TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                sequence INTEGER NOT NULL DEFAULT 0,
                is_published INTEGER NOT NULL DEFAULT 0,
                structure_ids TEXT NOT NULL DEFAULT '[]',
                unit_ids TEXT NOT NULL DEFAULT '[]',
                supersedes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                article_type TEXT NOT NULL,
                subject TEXT,
                slug TEXT NOT NULL,
                latest_snapshot_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                article_id TEXT NOT NULL,
                read_position TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                entity_states TEXT NOT NULL DEFAULT '[]',
                relationship_states TEXT NOT NULL DEFAULT '[]',
                citations TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agent_metadata (
                id TEXT PRIMARY KEY,
                agent_kind TEXT NOT NULL,
                agent_version TEXT NOT NULL,
                tokens_used INTEGER,
                success INTEGER NOT NULL DEFAULT 1,
                error TEXT,
                extra TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prompt_metadata (
                id TEXT PRIMARY KEY,
                agent_metadata_id TEXT NOT NULL,
                model TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '{}',
                prompt_kind TEXT NOT NULL,
                prompt_version TEXT NOT NULL,
                tokens_used INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entity_merges (
                id TEXT PRIMARY KEY,
                winner TEXT NOT NULL,
                loser TEXT NOT NULL,
                carried_aliases TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::operation("create_schema", e))?;

        Self::create_indexes(&conn);
        Ok(())
    }

    /// Creates indexes for optimized queries.
    fn create_indexes(conn: &Connection) {
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entity_states_entity ON entity_states(entity_id, seq_no)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_relationship_states_rel
             ON relationship_states(relationship_id, seq_no)",
            [],
        );
        // Roots all share a NULL parent, which the plain UNIQUE constraint
        // would treat as distinct; coalesce to enforce uniqueness there too.
        let _ = conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_structures_parent_seq
             ON structures(COALESCE(parent_id, ''), sequence)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_units_structure ON units(structure_id, sequence)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_units_hash ON units(structure_id, content_hash)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_contexts_scope ON contexts(scope)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_article ON snapshots(article_id)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_merges_loser ON entity_merges(loser)",
            [],
        );
    }
}
