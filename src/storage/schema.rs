//! Database schema definitions for MatchVault.
//!
//! Two physical layouts exist: the shared match registry (one file per
//! installation) and the per-account enrichment store (one file per tracked
//! account). Legacy installations additionally carry a fully-denormalized
//! layout inside the account store; it is kept here so the backfill engine
//! can read it and tests can construct it.

/// SQL schema for the shared match registry.
pub const REGISTRY_SCHEMA: &str = r#"
-- Canonical matches table: exactly one row per real match
CREATE TABLE IF NOT EXISTS matches (
    match_id TEXT PRIMARY KEY,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    playlist_id TEXT,
    playlist_name TEXT,
    map_id TEXT,
    map_name TEXT,
    variant_id TEXT,
    variant_name TEXT,
    ranked INTEGER NOT NULL DEFAULT 0,
    special INTEGER NOT NULL DEFAULT 0,
    duration_seconds INTEGER NOT NULL,
    team_scores_json TEXT,
    participants_loaded INTEGER NOT NULL DEFAULT 0,
    events_loaded INTEGER NOT NULL DEFAULT 0,
    medals_loaded INTEGER NOT NULL DEFAULT 0,
    backfill_steps INTEGER NOT NULL DEFAULT 0,
    first_account_id TEXT NOT NULL,
    first_synced_at TEXT NOT NULL,
    synced_account_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_matches_start_time ON matches(start_time);
CREATE INDEX IF NOT EXISTS idx_matches_playlist_id ON matches(playlist_id);

-- Roster rows: one per (match, participant account), tracked or not
CREATE TABLE IF NOT EXISTS participants (
    match_id TEXT NOT NULL REFERENCES matches(match_id),
    account_id TEXT NOT NULL,
    team INTEGER,
    outcome TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT 0,
    score INTEGER NOT NULL DEFAULT 0,
    kills INTEGER NOT NULL DEFAULT 0,
    deaths INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    shots_fired INTEGER NOT NULL DEFAULT 0,
    shots_hit INTEGER NOT NULL DEFAULT 0,
    damage_dealt REAL NOT NULL DEFAULT 0,
    damage_taken REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (match_id, account_id)
);

CREATE INDEX IF NOT EXISTS idx_participants_account_id ON participants(account_id);

-- Append-only event log, one row per telemetry event
CREATE TABLE IF NOT EXISTS match_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id TEXT NOT NULL REFERENCES matches(match_id),
    category TEXT NOT NULL,
    time_ms INTEGER NOT NULL,
    actor_id TEXT,
    actor_name TEXT,
    target_id TEXT,
    target_name TEXT,
    type_hint TEXT,
    payload_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_match_events_match_id ON match_events(match_id);

-- Medal tallies, one row per (match, account, medal)
CREATE TABLE IF NOT EXISTS medal_tallies (
    match_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    medal_id INTEGER NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (match_id, account_id, medal_id)
);

-- Alias directory: latest display name per account, latest-wins upsert
CREATE TABLE IF NOT EXISTS aliases (
    account_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    source TEXT NOT NULL
);

-- Contribution log: which tracked accounts have synced or migrated a match.
-- synced_account_count on matches is always recomputed from this table.
CREATE TABLE IF NOT EXISTS match_syncs (
    match_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    synced_at TEXT NOT NULL,
    PRIMARY KEY (match_id, account_id)
);

CREATE INDEX IF NOT EXISTS idx_match_syncs_account_id ON match_syncs(account_id);
"#;

/// SQL schema for a per-account enrichment store.
pub const ACCOUNT_SCHEMA: &str = r#"
-- Private per-match derived data, never shared across accounts
CREATE TABLE IF NOT EXISTS enrichment (
    match_id TEXT PRIMARY KEY,
    score REAL,
    session_id TEXT,
    with_tracked_friends INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Small key/value metadata table (incremental watermark, migration marker)
CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Legacy (pre-registry) account store layout: every account carried its own
/// fully-denormalized copy of the shared match data. Participant rows carry
/// the display name inline; the registry normalizes names into the alias
/// directory instead.
pub const LEGACY_ACCOUNT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    match_id TEXT PRIMARY KEY,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    playlist_id TEXT,
    playlist_name TEXT,
    map_id TEXT,
    map_name TEXT,
    variant_id TEXT,
    variant_name TEXT,
    ranked INTEGER NOT NULL DEFAULT 0,
    special INTEGER NOT NULL DEFAULT 0,
    duration_seconds INTEGER NOT NULL,
    team_scores_json TEXT
);

CREATE TABLE IF NOT EXISTS participants (
    match_id TEXT NOT NULL REFERENCES matches(match_id),
    account_id TEXT NOT NULL,
    display_name TEXT,
    team INTEGER,
    outcome TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT 0,
    score INTEGER NOT NULL DEFAULT 0,
    kills INTEGER NOT NULL DEFAULT 0,
    deaths INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    shots_fired INTEGER NOT NULL DEFAULT 0,
    shots_hit INTEGER NOT NULL DEFAULT 0,
    damage_dealt REAL NOT NULL DEFAULT 0,
    damage_taken REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (match_id, account_id)
);

CREATE TABLE IF NOT EXISTS match_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id TEXT NOT NULL REFERENCES matches(match_id),
    category TEXT NOT NULL,
    time_ms INTEGER NOT NULL,
    actor_id TEXT,
    actor_name TEXT,
    target_id TEXT,
    target_name TEXT,
    type_hint TEXT,
    payload_json TEXT
);

CREATE TABLE IF NOT EXISTS medal_tallies (
    match_id TEXT NOT NULL,
    account_id TEXT NOT NULL,
    medal_id INTEGER NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (match_id, account_id, medal_id)
);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current registry schema version
pub const REGISTRY_VERSION: i32 = 1;

/// Current account store schema version. Version 1 was the legacy
/// denormalized layout; version 2 adds the enrichment and sync_meta tables
/// and leaves any legacy tables in place for the backfill engine.
pub const ACCOUNT_VERSION: i32 = 2;
