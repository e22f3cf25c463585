//! Shared-match synchronization engine.

pub mod engine;
pub mod limiter;
pub mod scoring;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::AppConfig;
use crate::storage::database::DatabaseError;
use crate::storage::types::CategorySet;
use crate::telemetry::TelemetryError;

pub use engine::SyncEngine;
pub use limiter::RateLimiter;

/// Sync-related errors. Per-match failures are collected into the report
/// instead; only run-fatal conditions surface here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Match listing failed: {0}")]
    Listing(TelemetryError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// How far a sync run pages back through the account's match list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Stop paging once the previously-seen match id is reached.
    Incremental,
    /// Page up to the configured maximum.
    Full,
}

/// Tunables for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Telemetry categories to fetch and persist
    pub categories: CategorySet,
    /// Maximum outbound requests per second
    pub requests_per_second: f64,
    /// Maximum concurrent in-flight matches
    pub max_in_flight: usize,
    /// Matches per commit batch
    pub batch_size: usize,
    /// Page cap on collected match ids
    pub max_matches: usize,
    /// Defer percentile scoring to a single post-pass
    pub deferred_scoring: bool,
    /// Gap that still groups two matches into one session
    pub session_gap: chrono::Duration,
    /// Retry attempts for transient remote errors
    pub retry_attempts: u32,
    /// Base retry delay; doubles per attempt
    pub retry_base_delay: Duration,
    /// Other tracked accounts, for the friends flag
    pub tracked_accounts: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            categories: CategorySet::ALL,
            requests_per_second: 5.0,
            max_in_flight: 4,
            batch_size: 25,
            max_matches: 1000,
            deferred_scoring: false,
            session_gap: chrono::Duration::minutes(30),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            tracked_accounts: Vec::new(),
        }
    }
}

impl SyncOptions {
    /// Derive run options from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            categories: CategorySet::ALL,
            requests_per_second: config.sync.requests_per_second,
            max_in_flight: config.sync.max_in_flight.max(1) as usize,
            batch_size: config.sync.batch_size.max(1) as usize,
            max_matches: config.sync.max_matches as usize,
            deferred_scoring: config.sync.deferred_scoring,
            session_gap: chrono::Duration::minutes(config.sync.session_gap_minutes),
            retry_attempts: config.sync.retry_attempts,
            retry_base_delay: Duration::from_millis(config.sync.retry_base_delay_ms),
            tracked_accounts: config.accounts.tracked.clone(),
        }
    }
}

/// One match that could not be synced.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub match_id: String,
    pub error: String,
}

/// Summary of a completed sync run. Always produced, even under partial
/// failure.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Matches whose shared rows this run created
    pub matches_inserted: usize,
    /// Matches whose enrichment this run wrote
    pub matches_enriched: usize,
    /// Matches that failed remotely
    pub matches_failed: usize,
    /// Per-match failure details
    pub errors: Vec<SyncFailure>,
    /// The run was cancelled between batches
    pub cancelled: bool,
}

/// Cooperative cancellation flag, checked between commit batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation at the next batch boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
