//! Per-account enrichment store.
//!
//! Each tracked account owns one SQLite file holding only private derived
//! data (performance score, session grouping, friends flag) keyed by match
//! id, plus a small key/value metadata table. Legacy installations also
//! carry the old fully-denormalized match tables, which the backfill engine
//! reads and the match source view falls back to.

use crate::storage::database::{Database, DatabaseError, StoreKind};
use crate::storage::registry::parse_timestamp;
use crate::storage::schema::LEGACY_ACCOUNT_SCHEMA;
use crate::storage::types::{Enrichment, MatchEvent, MatchRow, MedalTally, Outcome, Participant, TeamScore};
use rusqlite::params;
use std::path::Path;

/// Metadata key for the incremental-sync watermark.
pub const LAST_SYNCED_MATCH_KEY: &str = "last_synced_match_id";

/// Metadata key recording when the legacy backfill last completed.
pub const MIGRATED_AT_KEY: &str = "migrated_at";

/// Store wrapper over one account's private database.
pub struct AccountStore {
    db: Database,
    account_id: String,
}

impl AccountStore {
    /// Open or create the store for an account at the given path.
    pub fn open(path: &Path, account_id: &str) -> Result<Self, DatabaseError> {
        Ok(Self {
            db: Database::open(path, StoreKind::Account)?,
            account_id: account_id.to_string(),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory(account_id: &str) -> Result<Self, DatabaseError> {
        Ok(Self {
            db: Database::open_in_memory(StoreKind::Account)?,
            account_id: account_id.to_string(),
        })
    }

    /// The account this store belongs to.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Begin a write batch.
    pub fn begin(&self) -> Result<(), DatabaseError> {
        self.db.begin()
    }

    /// Commit the open write batch.
    pub fn commit(&self) -> Result<(), DatabaseError> {
        self.db.commit()
    }

    /// Roll back the open write batch.
    pub fn rollback(&self) -> Result<(), DatabaseError> {
        self.db.rollback()
    }

    // ========== Enrichment ==========

    /// Insert or replace the enrichment row for a match.
    pub fn upsert_enrichment(&self, enrichment: &Enrichment) -> Result<(), DatabaseError> {
        self.db
            .connection()
            .execute(
                "INSERT INTO enrichment (match_id, score, session_id, with_tracked_friends, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(match_id) DO UPDATE SET
                     score = excluded.score,
                     session_id = excluded.session_id,
                     with_tracked_friends = excluded.with_tracked_friends,
                     updated_at = excluded.updated_at",
                params![
                    enrichment.match_id,
                    enrichment.score,
                    enrichment.session_id,
                    enrichment.with_tracked_friends as i32,
                    enrichment.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Get the enrichment row for a match.
    pub fn enrichment(&self, match_id: &str) -> Result<Option<Enrichment>, DatabaseError> {
        let result = self.db.connection().query_row(
            "SELECT match_id, score, session_id, with_tracked_friends, updated_at
             FROM enrichment WHERE match_id = ?1",
            params![match_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );

        match result {
            Ok((match_id, score, session_id, with_friends, updated_at)) => Ok(Some(Enrichment {
                match_id,
                score,
                session_id,
                with_tracked_friends: with_friends != 0,
                updated_at: parse_timestamp(&updated_at)?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Count enrichment rows.
    pub fn count_enrichment(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .db
            .connection()
            .query_row("SELECT COUNT(*) FROM enrichment", [], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    /// Fill in the score of an existing enrichment row.
    pub fn set_score(&self, match_id: &str, score: f64) -> Result<(), DatabaseError> {
        let changed = self
            .db
            .connection()
            .execute(
                "UPDATE enrichment SET score = ?2 WHERE match_id = ?1",
                params![match_id, score],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("Enrichment {}", match_id)));
        }

        Ok(())
    }

    /// Match ids whose enrichment is missing a score (deferred scoring).
    pub fn match_ids_missing_score(&self) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare("SELECT match_id FROM enrichment WHERE score IS NULL")
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(ids)
    }

    // ========== Sync metadata ==========

    /// Read a metadata value.
    pub fn meta_value(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let result: Result<String, _> = self.db.connection().query_row(
            "SELECT value FROM sync_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Write a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.db
            .connection()
            .execute(
                "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    // ========== Legacy denormalized layout ==========

    /// Whether this store still carries the legacy denormalized tables.
    pub fn has_legacy_tables(&self) -> Result<bool, DatabaseError> {
        self.db.has_table("matches")
    }

    /// All legacy match rows, oldest first.
    pub fn legacy_match_rows(&self) -> Result<Vec<MatchRow>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT match_id, start_time, end_time, playlist_id, playlist_name, map_id,
                 map_name, variant_id, variant_name, ranked, special, duration_seconds,
                 team_scores_json
                 FROM matches ORDER BY start_time ASC, match_id ASC",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyMatchRecord {
                    match_id: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    playlist_id: row.get(3)?,
                    playlist_name: row.get(4)?,
                    map_id: row.get(5)?,
                    map_name: row.get(6)?,
                    variant_id: row.get(7)?,
                    variant_name: row.get(8)?,
                    ranked: row.get(9)?,
                    special: row.get(10)?,
                    duration_seconds: row.get(11)?,
                    team_scores_json: row.get(12)?,
                })
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut matches = Vec::new();
        for row in rows {
            let record = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            matches.push(record.into_match_row()?);
        }

        Ok(matches)
    }

    /// Legacy roster rows for a match, with the denormalized display names.
    pub fn legacy_participants(
        &self,
        match_id: &str,
    ) -> Result<Vec<(Participant, Option<String>)>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT match_id, account_id, display_name, team, outcome, rank, score,
                 kills, deaths, assists, shots_fired, shots_hit, damage_dealt, damage_taken
                 FROM participants WHERE match_id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_id], |row| {
                let outcome: String = row.get(4)?;
                Ok((
                    Participant {
                        match_id: row.get(0)?,
                        account_id: row.get(1)?,
                        team: row.get(3)?,
                        outcome: Outcome::parse(&outcome).unwrap_or(Outcome::DidNotFinish),
                        rank: row.get(5)?,
                        score: row.get(6)?,
                        kills: row.get(7)?,
                        deaths: row.get(8)?,
                        assists: row.get(9)?,
                        shots_fired: row.get(10)?,
                        shots_hit: row.get(11)?,
                        damage_dealt: row.get(12)?,
                        damage_taken: row.get(13)?,
                    },
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(participants)
    }

    /// Legacy event rows for a match.
    pub fn legacy_events(&self, match_id: &str) -> Result<Vec<MatchEvent>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT match_id, category, time_ms, actor_id, actor_name, target_id,
                 target_name, type_hint, payload_json
                 FROM match_events WHERE match_id = ?1 ORDER BY time_ms ASC, id ASC",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let (match_id, category, time_ms, actor_id, actor_name, target_id, target_name, type_hint, payload_json) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let payload = payload_json
                .map(|json| {
                    serde_json::from_str(&json).map_err(|e| {
                        DatabaseError::DeserializationError(format!(
                            "Invalid event payload JSON: {}",
                            e
                        ))
                    })
                })
                .transpose()?;

            events.push(MatchEvent {
                match_id,
                category,
                time_ms: time_ms as u64,
                actor_id,
                actor_name,
                target_id,
                target_name,
                type_hint,
                payload,
            });
        }

        Ok(events)
    }

    /// Legacy medal tallies for a match.
    pub fn legacy_medals(&self, match_id: &str) -> Result<Vec<MedalTally>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT match_id, account_id, medal_id, count
                 FROM medal_tallies WHERE match_id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_id], |row| {
                Ok(MedalTally {
                    match_id: row.get(0)?,
                    account_id: row.get(1)?,
                    medal_id: row.get(2)?,
                    count: row.get(3)?,
                })
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut medals = Vec::new();
        for row in rows {
            medals.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(medals)
    }

    /// Create the legacy tables and insert one fully-denormalized match.
    ///
    /// Only legacy installations produce this layout in the wild; this
    /// writer keeps the legacy column mapping next to the readers and lets
    /// tests build pre-registry fixtures.
    pub fn insert_legacy_match(
        &self,
        row: &MatchRow,
        participants: &[(Participant, Option<String>)],
        events: &[MatchEvent],
        medals: &[MedalTally],
    ) -> Result<(), DatabaseError> {
        self.db
            .connection()
            .execute_batch(LEGACY_ACCOUNT_SCHEMA)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let team_scores_json = if row.team_scores.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&row.team_scores)
                    .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
            )
        };

        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO matches (match_id, start_time, end_time, playlist_id,
                 playlist_name, map_id, map_name, variant_id, variant_name, ranked, special,
                 duration_seconds, team_scores_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    row.match_id,
                    row.start_time.to_rfc3339(),
                    row.end_time.to_rfc3339(),
                    row.playlist_id,
                    row.playlist_name,
                    row.map_id,
                    row.map_name,
                    row.variant_id,
                    row.variant_name,
                    row.ranked as i32,
                    row.special as i32,
                    row.duration_seconds,
                    team_scores_json,
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        for (p, display_name) in participants {
            self.db
                .connection()
                .execute(
                    "INSERT OR REPLACE INTO participants (match_id, account_id, display_name,
                     team, outcome, rank, score, kills, deaths, assists, shots_fired,
                     shots_hit, damage_dealt, damage_taken)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        p.match_id,
                        p.account_id,
                        display_name,
                        p.team,
                        p.outcome.as_str(),
                        p.rank,
                        p.score,
                        p.kills,
                        p.deaths,
                        p.assists,
                        p.shots_fired,
                        p.shots_hit,
                        p.damage_dealt,
                        p.damage_taken,
                    ],
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        for event in events {
            let payload_json = event
                .payload
                .as_ref()
                .map(|p| {
                    serde_json::to_string(p)
                        .map_err(|e| DatabaseError::SerializationError(e.to_string()))
                })
                .transpose()?;

            self.db
                .connection()
                .execute(
                    "INSERT INTO match_events (match_id, category, time_ms, actor_id, actor_name,
                     target_id, target_name, type_hint, payload_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        event.match_id,
                        event.category,
                        event.time_ms as i64,
                        event.actor_id,
                        event.actor_name,
                        event.target_id,
                        event.target_name,
                        event.type_hint,
                        payload_json,
                    ],
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        for medal in medals {
            self.db
                .connection()
                .execute(
                    "INSERT OR REPLACE INTO medal_tallies (match_id, account_id, medal_id, count)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![medal.match_id, medal.account_id, medal.medal_id, medal.count],
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        Ok(())
    }
}

/// Intermediate struct for reading legacy match rows.
struct LegacyMatchRecord {
    match_id: String,
    start_time: String,
    end_time: String,
    playlist_id: Option<String>,
    playlist_name: Option<String>,
    map_id: Option<String>,
    map_name: Option<String>,
    variant_id: Option<String>,
    variant_name: Option<String>,
    ranked: i32,
    special: i32,
    duration_seconds: u32,
    team_scores_json: Option<String>,
}

impl LegacyMatchRecord {
    fn into_match_row(self) -> Result<MatchRow, DatabaseError> {
        let team_scores: Vec<TeamScore> = match self.team_scores_json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid team scores JSON: {}", e))
            })?,
            None => Vec::new(),
        };

        Ok(MatchRow {
            match_id: self.match_id,
            start_time: parse_timestamp(&self.start_time)?,
            end_time: parse_timestamp(&self.end_time)?,
            playlist_id: self.playlist_id,
            playlist_name: self.playlist_name,
            map_id: self.map_id,
            map_name: self.map_name,
            variant_id: self.variant_id,
            variant_name: self.variant_name,
            ranked: self.ranked != 0,
            special: self.special != 0,
            duration_seconds: self.duration_seconds,
            team_scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_enrichment_upsert_and_get() {
        let store = AccountStore::open_in_memory("acct-a").expect("Failed to open store");
        let updated_at = Utc.with_ymd_and_hms(2026, 3, 1, 19, 0, 0).unwrap();

        store
            .upsert_enrichment(&Enrichment {
                match_id: "m1".to_string(),
                score: None,
                session_id: Some("s1".to_string()),
                with_tracked_friends: true,
                updated_at,
            })
            .unwrap();

        let e = store.enrichment("m1").unwrap().expect("Enrichment not found");
        assert_eq!(e.score, None);
        assert_eq!(e.session_id.as_deref(), Some("s1"));
        assert!(e.with_tracked_friends);

        // Re-sync replaces the row.
        store
            .upsert_enrichment(&Enrichment {
                match_id: "m1".to_string(),
                score: Some(62.5),
                session_id: Some("s1".to_string()),
                with_tracked_friends: false,
                updated_at,
            })
            .unwrap();

        let e = store.enrichment("m1").unwrap().unwrap();
        assert_eq!(e.score, Some(62.5));
        assert!(!e.with_tracked_friends);
        assert_eq!(store.count_enrichment().unwrap(), 1);
    }

    #[test]
    fn test_missing_scores_and_set_score() {
        let store = AccountStore::open_in_memory("acct-a").unwrap();
        let now = Utc::now();

        for (id, score) in [("m1", None), ("m2", Some(40.0)), ("m3", None)] {
            store
                .upsert_enrichment(&Enrichment {
                    match_id: id.to_string(),
                    score,
                    session_id: None,
                    with_tracked_friends: false,
                    updated_at: now,
                })
                .unwrap();
        }

        let mut missing = store.match_ids_missing_score().unwrap();
        missing.sort();
        assert_eq!(missing, vec!["m1".to_string(), "m3".to_string()]);

        store.set_score("m1", 75.0).unwrap();
        assert_eq!(store.match_ids_missing_score().unwrap(), vec!["m3".to_string()]);
        assert!(store.set_score("absent", 10.0).is_err());
    }

    #[test]
    fn test_meta_round_trip() {
        let store = AccountStore::open_in_memory("acct-a").unwrap();

        assert!(store.meta_value(LAST_SYNCED_MATCH_KEY).unwrap().is_none());
        store.set_meta(LAST_SYNCED_MATCH_KEY, "m42").unwrap();
        assert_eq!(
            store.meta_value(LAST_SYNCED_MATCH_KEY).unwrap().as_deref(),
            Some("m42")
        );
        store.set_meta(LAST_SYNCED_MATCH_KEY, "m43").unwrap();
        assert_eq!(
            store.meta_value(LAST_SYNCED_MATCH_KEY).unwrap().as_deref(),
            Some("m43")
        );
    }

    #[test]
    fn test_legacy_round_trip() {
        let store = AccountStore::open_in_memory("acct-a").unwrap();
        assert!(!store.has_legacy_tables().unwrap());

        let start = Utc.with_ymd_and_hms(2025, 11, 2, 20, 0, 0).unwrap();
        let row = MatchRow {
            match_id: "m1".to_string(),
            start_time: start,
            end_time: start + chrono::Duration::minutes(10),
            playlist_id: Some("pl".to_string()),
            playlist_name: None,
            map_id: None,
            map_name: None,
            variant_id: None,
            variant_name: None,
            ranked: false,
            special: true,
            duration_seconds: 600,
            team_scores: vec![TeamScore { team: 0, score: 3 }],
        };
        let participant = Participant {
            match_id: "m1".to_string(),
            account_id: "acct-a".to_string(),
            team: Some(0),
            outcome: Outcome::Loss,
            rank: 5,
            score: 900,
            kills: 4,
            deaths: 9,
            assists: 2,
            shots_fired: 80,
            shots_hit: 30,
            damage_dealt: 700.0,
            damage_taken: 1100.0,
        };
        let event = MatchEvent {
            match_id: "m1".to_string(),
            category: "kill".to_string(),
            time_ms: 45_000,
            actor_id: Some("acct-a".to_string()),
            actor_name: Some("PlayerA".to_string()),
            target_id: None,
            target_name: None,
            type_hint: Some("headshot".to_string()),
            payload: Some(serde_json::json!({"weapon": "dmr"})),
        };
        let medal = MedalTally {
            match_id: "m1".to_string(),
            account_id: "acct-a".to_string(),
            medal_id: 7,
            count: 2,
        };

        store
            .insert_legacy_match(
                &row,
                &[(participant.clone(), Some("PlayerA".to_string()))],
                &[event.clone()],
                &[medal.clone()],
            )
            .unwrap();

        assert!(store.has_legacy_tables().unwrap());
        let matches = store.legacy_match_rows().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0], row);

        let participants = store.legacy_participants("m1").unwrap();
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[0].0, participant);
        assert_eq!(participants[0].1.as_deref(), Some("PlayerA"));

        let events = store.legacy_events("m1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], event);

        assert_eq!(store.legacy_medals("m1").unwrap(), vec![medal]);
    }
}
