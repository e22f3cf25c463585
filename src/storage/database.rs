//! Database connection handling using rusqlite.
//!
//! Both physical stores (the shared registry and the per-account enrichment
//! stores) are plain SQLite files opened through the same wrapper; the store
//! kind selects which schema gets applied.

use crate::storage::schema::{
    ACCOUNT_SCHEMA, ACCOUNT_VERSION, REGISTRY_SCHEMA, REGISTRY_VERSION, SCHEMA_VERSION_TABLE,
};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use thiserror::Error;

/// Which schema a database file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Shared match registry.
    Registry,
    /// Per-account enrichment store.
    Account,
}

impl StoreKind {
    fn schema(&self) -> &'static str {
        match self {
            StoreKind::Registry => REGISTRY_SCHEMA,
            StoreKind::Account => ACCOUNT_SCHEMA,
        }
    }

    fn current_version(&self) -> i32 {
        match self {
            StoreKind::Registry => REGISTRY_VERSION,
            StoreKind::Account => ACCOUNT_VERSION,
        }
    }
}

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
    kind: StoreKind,
}

impl Database {
    /// Open or create a database of the given kind at the given path.
    pub fn open(path: &Path, kind: StoreKind) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn, kind };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(kind: StoreKind) -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn, kind };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = self.schema_version()?;

        if current_version < self.kind.current_version() {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    pub fn schema_version(&self) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    ///
    /// Account stores at version 1 are legacy denormalized layouts: the
    /// upgrade adds the enrichment and metadata tables and leaves the legacy
    /// tables untouched for the backfill engine.
    fn migrate(&self, from_version: i32) -> Result<(), DatabaseError> {
        let target = self.kind.current_version();

        if from_version < target {
            self.conn
                .execute_batch(self.kind.schema())
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT OR REPLACE INTO schema_version (version, applied_at)
                     VALUES (?, datetime('now'))",
                    [target],
                )
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!(
                "Database migrated from version {} to version {}",
                from_version,
                target
            );
        }

        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin an explicit write transaction.
    ///
    /// The sync and backfill engines group many statements into one batch
    /// across suspension points, so the batch is managed with explicit
    /// statements instead of a borrowed `rusqlite::Transaction`.
    pub fn begin(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    /// Commit the open write transaction.
    pub fn commit(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    /// Roll back the open write transaction.
    pub fn rollback(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    /// Check whether a table exists in the main schema.
    pub fn has_table(&self, name: &str) -> Result<bool, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count > 0)
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
