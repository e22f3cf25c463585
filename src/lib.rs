//! MatchVault - Game Telemetry Archive
//!
//! A self-hosted archive for multiplayer match telemetry across multiple
//! tracked accounts. Accounts frequently share matches, so shared facts
//! (match, roster, events, medals) live once in a central registry while
//! private annotations (scores, sessions) live in per-account stores. The
//! synchronization engine classifies every pulled match as known or new and
//! fetches only what the registry is missing; the match source view joins
//! the two stores back into one logical history per account.

pub mod config;
pub mod migrate;
pub mod storage;
pub mod sync;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AppConfig, StorePaths};
pub use migrate::{MigrateOptions, MigrationReport, Migrator};
pub use storage::{
    AccountStore, DatabaseError, MatchFilters, MatchRecord, MatchSource, RegistryStore,
};
pub use sync::{SyncEngine, SyncMode, SyncOptions, SyncReport};
pub use telemetry::{HttpTelemetryClient, TelemetryApi, TelemetryError};
