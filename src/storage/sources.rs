//! Match source view: one account's history as a single logical table.
//!
//! Match facts live in the shared registry while enrichment lives in the
//! account's own store; the view opens the account store read-write and
//! attaches the registry read-only, joining the two at query time. On
//! installations that were never migrated the registry file does not exist
//! yet, and the same queries run against the account store's legacy
//! denormalized tables instead. Callers cannot tell which layout served
//! them.

use crate::config::StorePaths;
use crate::storage::database::DatabaseError;
use crate::storage::registry::parse_timestamp;
use crate::storage::types::{MatchFilters, MatchRecord, Outcome, TeamScore};
use rusqlite::{params, Connection};

/// Default page size when a filter carries no limit.
const DEFAULT_LIMIT: u32 = 500;

/// Which physical layout currently backs the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceLayout {
    /// Shared registry attached read-only under the `reg` schema.
    Registry,
    /// Legacy denormalized tables in the account store itself.
    Legacy,
}

/// Read-only composition of the registry and one account's enrichment.
pub struct MatchSource {
    conn: Connection,
    account_id: String,
    layout: SourceLayout,
    has_enrichment: bool,
}

impl MatchSource {
    /// Open the view for one account.
    pub fn open(paths: &StorePaths, account_id: &str) -> Result<Self, DatabaseError> {
        let account_path = paths.account_store(account_id);
        let registry_path = paths.registry();

        let conn = Connection::open(&account_path)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let layout = if registry_path.exists() {
            let uri = format!("file:{}?mode=ro", registry_path.display());
            conn.execute("ATTACH DATABASE ?1 AS reg", params![uri])
                .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
            SourceLayout::Registry
        } else {
            tracing::debug!(
                "Registry not found at {}; serving legacy layout for account {}",
                registry_path.display(),
                account_id
            );
            SourceLayout::Legacy
        };

        let has_enrichment: bool = {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM main.sqlite_master
                     WHERE type = 'table' AND name = 'enrichment'",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            count > 0
        };

        Ok(Self {
            conn,
            account_id: account_id.to_string(),
            layout,
            has_enrichment,
        })
    }

    /// Load the account's matches, newest first.
    pub fn load_matches(&self, filters: &MatchFilters) -> Result<Vec<MatchRecord>, DatabaseError> {
        let sql = format!(
            "{} WHERE p.account_id = ?1
               AND (?2 IS NULL OR m.playlist_id = ?2)
               AND (?3 IS NULL OR m.map_id = ?3)
               AND (?4 = 0 OR m.ranked = 1)
               AND (?5 IS NULL OR m.start_time >= ?5)
               AND (?6 IS NULL OR m.start_time <= ?6)
             ORDER BY m.start_time DESC, m.match_id DESC
             LIMIT ?7 OFFSET ?8",
            self.base_select()
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![
                    self.account_id,
                    filters.playlist_id,
                    filters.map_id,
                    filters.ranked_only as i32,
                    filters.since.map(|t| t.to_rfc3339()),
                    filters.until.map(|t| t.to_rfc3339()),
                    filters.limit.unwrap_or(DEFAULT_LIMIT),
                    filters.offset.unwrap_or(0),
                ],
                map_record_row,
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            records.push(row.into_match_record()?);
        }

        Ok(records)
    }

    /// Load a single match record for the account.
    pub fn load_match(&self, match_id: &str) -> Result<Option<MatchRecord>, DatabaseError> {
        let sql = format!(
            "{} WHERE p.account_id = ?1 AND p.match_id = ?2",
            self.base_select()
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![self.account_id, match_id], map_record_row);

        match result {
            Ok(row) => Ok(Some(row.into_match_record()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    fn base_select(&self) -> String {
        let qualifier = match self.layout {
            SourceLayout::Registry => "reg",
            SourceLayout::Legacy => "main",
        };

        let (enrich_cols, enrich_join) = if self.has_enrichment {
            (
                "e.score, e.session_id, e.with_tracked_friends",
                "LEFT JOIN main.enrichment e ON e.match_id = p.match_id",
            )
        } else {
            ("NULL, NULL, NULL", "")
        };

        format!(
            "SELECT m.match_id, m.start_time, m.end_time, m.playlist_id, m.playlist_name,
             m.map_id, m.map_name, m.variant_id, m.variant_name, m.ranked, m.special,
             m.duration_seconds, m.team_scores_json,
             p.team, p.outcome, p.rank, p.score, p.kills, p.deaths, p.assists,
             p.shots_fired, p.shots_hit, p.damage_dealt, p.damage_taken,
             {enrich_cols}
             FROM {qualifier}.participants p
             JOIN {qualifier}.matches m ON m.match_id = p.match_id
             {enrich_join}"
        )
    }
}

/// Intermediate struct for reading joined view rows.
struct RecordRow {
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
    team: Option<u8>,
    outcome: String,
    rank: u32,
    score: i64,
    kills: u32,
    deaths: u32,
    assists: u32,
    shots_fired: u32,
    shots_hit: u32,
    damage_dealt: f64,
    damage_taken: f64,
    performance_score: Option<f64>,
    session_id: Option<String>,
    with_tracked_friends: Option<i32>,
}

fn map_record_row(row: &rusqlite::Row) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
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
        team: row.get(13)?,
        outcome: row.get(14)?,
        rank: row.get(15)?,
        score: row.get(16)?,
        kills: row.get(17)?,
        deaths: row.get(18)?,
        assists: row.get(19)?,
        shots_fired: row.get(20)?,
        shots_hit: row.get(21)?,
        damage_dealt: row.get(22)?,
        damage_taken: row.get(23)?,
        performance_score: row.get(24)?,
        session_id: row.get(25)?,
        with_tracked_friends: row.get(26)?,
    })
}

impl RecordRow {
    fn into_match_record(self) -> Result<MatchRecord, DatabaseError> {
        let team_scores: Vec<TeamScore> = match self.team_scores_json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid team scores JSON: {}", e))
            })?,
            None => Vec::new(),
        };

        Ok(MatchRecord {
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
            team: self.team,
            outcome: Outcome::parse(&self.outcome).unwrap_or(Outcome::DidNotFinish),
            rank: self.rank,
            score: self.score,
            kills: self.kills,
            deaths: self.deaths,
            assists: self.assists,
            shots_fired: self.shots_fired,
            shots_hit: self.shots_hit,
            damage_dealt: self.damage_dealt,
            damage_taken: self.damage_taken,
            performance_score: self.performance_score,
            session_id: self.session_id,
            with_tracked_friends: self.with_tracked_friends.map(|v| v != 0),
        })
    }
}
