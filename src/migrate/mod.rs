//! Backfill engine: folds a legacy fully-denormalized per-account store
//! into the shared match registry.

pub mod engine;

use thiserror::Error;

use crate::storage::database::DatabaseError;

pub use engine::Migrator;

/// Backfill bitmask bit: match and roster rows contributed.
pub const BACKFILL_CORE: u8 = 1;
/// Backfill bitmask bit: event log contributed.
pub const BACKFILL_EVENTS: u8 = 1 << 1;
/// Backfill bitmask bit: medal tallies contributed.
pub const BACKFILL_MEDALS: u8 = 1 << 2;

/// Migration-fatal errors. Per-match problems are collected into the
/// report instead.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Tunables for a backfill run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Matches per commit batch
    pub batch_size: usize,
    /// Gap that still groups two matches into one session
    pub session_gap: chrono::Duration,
    /// Other tracked accounts, for the friends flag
    pub tracked_accounts: Vec<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            session_gap: chrono::Duration::minutes(30),
            tracked_accounts: Vec::new(),
        }
    }
}

/// One legacy match that could not be folded in.
#[derive(Debug, Clone)]
pub struct MigrationFailure {
    pub match_id: String,
    pub error: String,
}

/// Summary of a completed backfill run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Matches whose shared rows this run contributed
    pub matches_migrated: usize,
    /// Matches already contributed by a previously-migrated account
    pub matches_skipped_already_shared: usize,
    /// Legacy matches that could not be processed
    pub matches_failed: usize,
    /// Per-match failure details
    pub errors: Vec<MigrationFailure>,
}
