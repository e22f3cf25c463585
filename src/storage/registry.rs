//! Shared match registry store.
//!
//! Holds one canonical row per real match plus every participant's roster
//! row, the full event log, medal tallies, the alias directory, and the
//! contribution log. All shared writes use insert-or-ignore keys so that
//! re-entrant runs and concurrent first contributors converge on identical
//! content.

use crate::storage::database::{Database, DatabaseError, StoreKind};
use crate::storage::types::{
    Alias, AliasSource, CategorySet, HistoryPoint, MatchEvent, MatchRow, MedalTally, Outcome,
    Participant, StoredMatch, TeamScore,
};
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::HashMap;
use std::path::Path;

/// Store wrapper over the shared registry database.
pub struct RegistryStore {
    db: Database,
}

impl RegistryStore {
    /// Open or create the registry at the given path.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            db: Database::open(path, StoreKind::Registry)?,
        })
    }

    /// Open an in-memory registry (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            db: Database::open_in_memory(StoreKind::Registry)?,
        })
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

    // ========== Match rows ==========

    /// Insert a canonical match row if it does not exist yet.
    ///
    /// Returns true when this call created the row; false when another
    /// account contributed it first. The first-contributor columns are never
    /// overwritten.
    pub fn insert_match(
        &self,
        row: &MatchRow,
        first_account_id: &str,
        first_synced_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let team_scores_json = if row.team_scores.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&row.team_scores)
                    .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
            )
        };

        let changed = self
            .db
            .connection()
            .execute(
                "INSERT INTO matches (match_id, start_time, end_time, playlist_id, playlist_name,
                 map_id, map_name, variant_id, variant_name, ranked, special, duration_seconds,
                 team_scores_json, first_account_id, first_synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(match_id) DO NOTHING",
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
                    first_account_id,
                    first_synced_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(changed == 1)
    }

    /// Check whether a match row exists.
    pub fn match_exists(&self, match_id: &str) -> Result<bool, DatabaseError> {
        let count: i64 = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM matches WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count > 0)
    }

    /// Get a match with its bookkeeping columns.
    pub fn get_match(&self, match_id: &str) -> Result<Option<StoredMatch>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT match_id, start_time, end_time, playlist_id, playlist_name, map_id,
                 map_name, variant_id, variant_name, ranked, special, duration_seconds,
                 team_scores_json, participants_loaded, events_loaded, medals_loaded,
                 backfill_steps, first_account_id, first_synced_at, synced_account_count
                 FROM matches WHERE match_id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![match_id], |row| {
            Ok(MatchRowRecord {
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
                participants_loaded: row.get(13)?,
                events_loaded: row.get(14)?,
                medals_loaded: row.get(15)?,
                backfill_steps: row.get(16)?,
                first_account_id: row.get(17)?,
                first_synced_at: row.get(18)?,
                synced_account_count: row.get(19)?,
            })
        });

        match result {
            Ok(record) => Ok(Some(record.into_stored_match()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Count all match rows.
    pub fn count_matches(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .db
            .connection()
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    // ========== Loaded flags ==========

    /// Get the loaded flags for a match, or None when the match is unknown.
    pub fn loaded_flags(&self, match_id: &str) -> Result<Option<CategorySet>, DatabaseError> {
        let result = self.db.connection().query_row(
            "SELECT participants_loaded, events_loaded, medals_loaded
             FROM matches WHERE match_id = ?1",
            params![match_id],
            |row| {
                Ok(CategorySet {
                    participants: row.get::<_, i32>(0)? != 0,
                    events: row.get::<_, i32>(1)? != 0,
                    medals: row.get::<_, i32>(2)? != 0,
                })
            },
        );

        match result {
            Ok(flags) => Ok(Some(flags)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Snapshot the loaded flags for a set of match ids. Ids absent from the
    /// result are unknown to the registry.
    pub fn loaded_flags_for(
        &self,
        match_ids: &[String],
    ) -> Result<HashMap<String, CategorySet>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT participants_loaded, events_loaded, medals_loaded
                 FROM matches WHERE match_id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut snapshot = HashMap::with_capacity(match_ids.len());
        for match_id in match_ids {
            let result = stmt.query_row(params![match_id], |row| {
                Ok(CategorySet {
                    participants: row.get::<_, i32>(0)? != 0,
                    events: row.get::<_, i32>(1)? != 0,
                    medals: row.get::<_, i32>(2)? != 0,
                })
            });

            match result {
                Ok(flags) => {
                    snapshot.insert(match_id.clone(), flags);
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(DatabaseError::QueryFailed(e.to_string())),
            }
        }

        Ok(snapshot)
    }

    /// Raise loaded flags for the given categories. Flags never revert.
    pub fn raise_loaded_flags(
        &self,
        match_id: &str,
        categories: &CategorySet,
    ) -> Result<(), DatabaseError> {
        if categories.is_empty() {
            return Ok(());
        }

        self.db
            .connection()
            .execute(
                "UPDATE matches SET
                 participants_loaded = MAX(participants_loaded, ?2),
                 events_loaded = MAX(events_loaded, ?3),
                 medals_loaded = MAX(medals_loaded, ?4)
                 WHERE match_id = ?1",
                params![
                    match_id,
                    categories.participants as i32,
                    categories.events as i32,
                    categories.medals as i32,
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// OR the given bits into a match's backfill-step bitmask.
    pub fn mark_backfill_steps(&self, match_id: &str, steps: u8) -> Result<(), DatabaseError> {
        self.db
            .connection()
            .execute(
                "UPDATE matches SET backfill_steps = backfill_steps | ?2 WHERE match_id = ?1",
                params![match_id, steps as i32],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    // ========== Roster rows ==========

    /// Insert roster rows, ignoring pairs that already exist.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_participants(
        &self,
        participants: &[Participant],
    ) -> Result<usize, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "INSERT INTO participants (match_id, account_id, team, outcome, rank, score,
                 kills, deaths, assists, shots_fired, shots_hit, damage_dealt, damage_taken)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(match_id, account_id) DO NOTHING",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut inserted = 0;
        for p in participants {
            inserted += stmt
                .execute(params![
                    p.match_id,
                    p.account_id,
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
                ])
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        Ok(inserted)
    }

    /// Get one roster row.
    pub fn get_participant(
        &self,
        match_id: &str,
        account_id: &str,
    ) -> Result<Option<Participant>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT match_id, account_id, team, outcome, rank, score, kills, deaths,
                 assists, shots_fired, shots_hit, damage_dealt, damage_taken
                 FROM participants WHERE match_id = ?1 AND account_id = ?2",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![match_id, account_id], map_participant_row);

        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// All account ids on a match's roster.
    pub fn participant_account_ids(&self, match_id: &str) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare("SELECT account_id FROM participants WHERE match_id = ?1")
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![match_id], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(ids)
    }

    /// Count roster rows for a match.
    pub fn count_participants(&self, match_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM participants WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    // ========== Event log ==========

    /// Append event rows. The log is append-only; callers must consult the
    /// events_loaded flag before inserting to avoid duplicates.
    pub fn insert_events(&self, events: &[MatchEvent]) -> Result<usize, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "INSERT INTO match_events (match_id, category, time_ms, actor_id, actor_name,
                 target_id, target_name, type_hint, payload_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        for event in events {
            let payload_json = event
                .payload
                .as_ref()
                .map(|p| {
                    serde_json::to_string(p)
                        .map_err(|e| DatabaseError::SerializationError(e.to_string()))
                })
                .transpose()?;

            stmt.execute(params![
                event.match_id,
                event.category,
                event.time_ms as i64,
                event.actor_id,
                event.actor_name,
                event.target_id,
                event.target_name,
                event.type_hint,
                payload_json,
            ])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        Ok(events.len())
    }

    /// Count event rows for a match.
    pub fn count_events(&self, match_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM match_events WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    // ========== Medal tallies ==========

    /// Insert medal tallies, ignoring keys that already exist.
    pub fn insert_medals(&self, medals: &[MedalTally]) -> Result<usize, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "INSERT INTO medal_tallies (match_id, account_id, medal_id, count)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(match_id, account_id, medal_id) DO NOTHING",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut inserted = 0;
        for medal in medals {
            inserted += stmt
                .execute(params![
                    medal.match_id,
                    medal.account_id,
                    medal.medal_id,
                    medal.count,
                ])
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        Ok(inserted)
    }

    /// Count medal rows for a match.
    pub fn count_medals(&self, match_id: &str) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM medal_tallies WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    // ========== Alias directory ==========

    /// Upsert a display name observation. A stored alias is only replaced by
    /// an observation at least as fresh; aliases are never deleted.
    pub fn upsert_alias(&self, alias: &Alias) -> Result<(), DatabaseError> {
        self.db
            .connection()
            .execute(
                "INSERT INTO aliases (account_id, display_name, last_seen, source)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(account_id) DO UPDATE SET
                     display_name = excluded.display_name,
                     last_seen = excluded.last_seen,
                     source = excluded.source
                 WHERE excluded.last_seen >= aliases.last_seen",
                params![
                    alias.account_id,
                    alias.display_name,
                    alias.last_seen.to_rfc3339(),
                    alias.source.as_str(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Get the latest alias for an account.
    pub fn get_alias(&self, account_id: &str) -> Result<Option<Alias>, DatabaseError> {
        let result = self.db.connection().query_row(
            "SELECT account_id, display_name, last_seen, source FROM aliases
             WHERE account_id = ?1",
            params![account_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        );

        match result {
            Ok((account_id, display_name, last_seen, source)) => Ok(Some(Alias {
                account_id,
                display_name,
                last_seen: parse_timestamp(&last_seen)?,
                source: AliasSource::parse(&source).ok_or_else(|| {
                    DatabaseError::DeserializationError(format!("Unknown alias source: {}", source))
                })?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    // ========== Contribution log ==========

    /// Record that an account has synced or migrated a match.
    pub fn record_contribution(
        &self,
        match_id: &str,
        account_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.db
            .connection()
            .execute(
                "INSERT INTO match_syncs (match_id, account_id, synced_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(match_id, account_id) DO NOTHING",
                params![match_id, account_id, synced_at.to_rfc3339()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Recompute a match's distinct-syncing-account counter from the
    /// contribution log and return the new value. Always derived, never
    /// incremented, so repeated and out-of-order runs converge.
    pub fn recompute_synced_count(&self, match_id: &str) -> Result<u32, DatabaseError> {
        self.db
            .connection()
            .execute(
                "UPDATE matches SET synced_account_count =
                 (SELECT COUNT(*) FROM match_syncs WHERE match_id = ?1)
                 WHERE match_id = ?1",
                params![match_id],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let count: u32 = self
            .db
            .connection()
            .query_row(
                "SELECT synced_account_count FROM matches WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count)
    }

    // ========== Account history queries ==========

    /// Full chronological statline history of an account, oldest first.
    pub fn statline_history(&self, account_id: &str) -> Result<Vec<HistoryPoint>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT p.match_id, m.start_time, p.kills, p.deaths, p.assists,
                 p.shots_fired, p.shots_hit
                 FROM participants p
                 JOIN matches m ON m.match_id = p.match_id
                 WHERE p.account_id = ?1
                 ORDER BY m.start_time ASC, p.match_id ASC",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![account_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, u32>(6)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut history = Vec::new();
        for row in rows {
            let (match_id, start_time, kills, deaths, assists, shots_fired, shots_hit) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            history.push(HistoryPoint {
                match_id,
                start_time: parse_timestamp(&start_time)?,
                metric: statline_metric(kills, deaths, assists, shots_fired, shots_hit),
            });
        }

        Ok(history)
    }

    /// Statline metrics of every account match at or before the given
    /// `(start_time, match_id)` position, inclusive. Ties on start time are
    /// broken by match id so inline and deferred scoring agree exactly.
    pub fn metric_history_through(
        &self,
        account_id: &str,
        start_time: DateTime<Utc>,
        match_id: &str,
    ) -> Result<Vec<f64>, DatabaseError> {
        let mut stmt = self
            .db
            .connection()
            .prepare(
                "SELECT p.kills, p.deaths, p.assists, p.shots_fired, p.shots_hit
                 FROM participants p
                 JOIN matches m ON m.match_id = p.match_id
                 WHERE p.account_id = ?1
                   AND (m.start_time < ?2 OR (m.start_time = ?2 AND p.match_id <= ?3))",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![account_id, start_time.to_rfc3339(), match_id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut metrics = Vec::new();
        for row in rows {
            let (kills, deaths, assists, shots_fired, shots_hit) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            metrics.push(statline_metric(kills, deaths, assists, shots_fired, shots_hit));
        }

        Ok(metrics)
    }

    /// The account's nearest match strictly before the given position,
    /// with its end time. Used for session grouping.
    pub fn previous_match_for(
        &self,
        account_id: &str,
        start_time: DateTime<Utc>,
        match_id: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, DatabaseError> {
        let result = self.db.connection().query_row(
            "SELECT p.match_id, m.end_time
             FROM participants p
             JOIN matches m ON m.match_id = p.match_id
             WHERE p.account_id = ?1
               AND (m.start_time < ?2 OR (m.start_time = ?2 AND p.match_id < ?3))
             ORDER BY m.start_time DESC, p.match_id DESC
             LIMIT 1",
            params![account_id, start_time.to_rfc3339(), match_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );

        match result {
            Ok((prev_id, end_time)) => Ok(Some((prev_id, parse_timestamp(&end_time)?))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }
}

/// Weighted statline metric from raw columns; mirrors
/// `Participant::performance_metric`.
fn statline_metric(kills: u32, deaths: u32, assists: u32, shots_fired: u32, shots_hit: u32) -> f64 {
    let accuracy = if shots_fired == 0 {
        0.0
    } else {
        f64::from(shots_hit) / f64::from(shots_fired)
    };
    f64::from(kills) + 0.5 * f64::from(assists) - f64::from(deaths) + accuracy
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::DeserializationError(format!("Invalid timestamp: {}", e)))
}

fn map_participant_row(row: &rusqlite::Row) -> rusqlite::Result<Participant> {
    let outcome: String = row.get(3)?;
    Ok(Participant {
        match_id: row.get(0)?,
        account_id: row.get(1)?,
        team: row.get(2)?,
        outcome: Outcome::parse(&outcome).unwrap_or(Outcome::DidNotFinish),
        rank: row.get(4)?,
        score: row.get(5)?,
        kills: row.get(6)?,
        deaths: row.get(7)?,
        assists: row.get(8)?,
        shots_fired: row.get(9)?,
        shots_hit: row.get(10)?,
        damage_dealt: row.get(11)?,
        damage_taken: row.get(12)?,
    })
}

/// Intermediate struct for reading match rows from the database.
struct MatchRowRecord {
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
    participants_loaded: i32,
    events_loaded: i32,
    medals_loaded: i32,
    backfill_steps: i32,
    first_account_id: String,
    first_synced_at: String,
    synced_account_count: u32,
}

impl MatchRowRecord {
    fn into_stored_match(self) -> Result<StoredMatch, DatabaseError> {
        let team_scores: Vec<TeamScore> = match self.team_scores_json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid team scores JSON: {}", e))
            })?,
            None => Vec::new(),
        };

        Ok(StoredMatch {
            row: MatchRow {
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
            },
            loaded: CategorySet {
                participants: self.participants_loaded != 0,
                events: self.events_loaded != 0,
                medals: self.medals_loaded != 0,
            },
            backfill_steps: self.backfill_steps as u8,
            first_account_id: self.first_account_id,
            first_synced_at: parse_timestamp(&self.first_synced_at)?,
            synced_account_count: self.synced_account_count,
        })
    }
}
