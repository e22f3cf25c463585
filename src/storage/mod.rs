//! Storage module: the shared match registry, the per-account enrichment
//! stores, and the read-time match source view.

pub mod account;
pub mod database;
pub mod registry;
pub mod schema;
pub mod sources;
pub mod types;

pub use account::{AccountStore, LAST_SYNCED_MATCH_KEY, MIGRATED_AT_KEY};
pub use database::{Database, DatabaseError, StoreKind};
pub use registry::RegistryStore;
pub use sources::MatchSource;
pub use types::{
    Alias, AliasSource, CategorySet, Enrichment, HistoryPoint, MatchEvent, MatchFilters,
    MatchRecord, MatchRow, MedalTally, Outcome, Participant, StoredMatch, TeamScore,
};
