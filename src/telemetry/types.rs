//! Wire payload types for the remote telemetry API.

use crate::storage::types::{MatchEvent, MatchRow, MedalTally, Outcome, Participant, TeamScore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One page of an account's recent match ids, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchIdPage {
    pub ids: Vec<String>,
    /// Opaque continuation cursor; None on the last page.
    pub cursor: Option<String>,
}

/// Full match stats payload: match core, roster statlines, medal tallies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStats {
    pub match_id: String,
    pub info: MatchInfo,
    pub roster: Vec<StatlineEntry>,
    #[serde(default)]
    pub medals: Vec<MedalEntry>,
}

/// Match-level facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub playlist_id: Option<String>,
    pub playlist_name: Option<String>,
    pub map_id: Option<String>,
    pub map_name: Option<String>,
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,
    #[serde(default)]
    pub ranked: bool,
    #[serde(default)]
    pub special: bool,
    pub duration_seconds: u32,
    #[serde(default)]
    pub team_scores: Vec<TeamScoreEntry>,
}

/// Final score of one team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamScoreEntry {
    pub team: u8,
    pub score: i64,
}

/// One roster member's statline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatlineEntry {
    pub account_id: String,
    pub display_name: Option<String>,
    pub team: Option<u8>,
    pub outcome: Outcome,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub shots_fired: u32,
    #[serde(default)]
    pub shots_hit: u32,
    #[serde(default)]
    pub damage_dealt: f64,
    #[serde(default)]
    pub damage_taken: f64,
}

/// One account's medal tally within a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedalEntry {
    pub account_id: String,
    pub medal_id: i64,
    pub count: u32,
}

/// Per-player skill data for a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub account_id: String,
    /// In-match placement.
    pub rank: u32,
}

/// One event-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    pub category: String,
    pub time_ms: u64,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub type_hint: Option<String>,
    /// Opaque payload, persisted verbatim.
    pub payload: Option<serde_json::Value>,
}

impl MatchStats {
    /// The canonical match row this payload describes.
    pub fn match_row(&self) -> MatchRow {
        MatchRow {
            match_id: self.match_id.clone(),
            start_time: self.info.start_time,
            end_time: self.info.end_time,
            playlist_id: self.info.playlist_id.clone(),
            playlist_name: self.info.playlist_name.clone(),
            map_id: self.info.map_id.clone(),
            map_name: self.info.map_name.clone(),
            variant_id: self.info.variant_id.clone(),
            variant_name: self.info.variant_name.clone(),
            ranked: self.info.ranked,
            special: self.info.special,
            duration_seconds: self.info.duration_seconds,
            team_scores: self
                .info
                .team_scores
                .iter()
                .map(|t| TeamScore {
                    team: t.team,
                    score: t.score,
                })
                .collect(),
        }
    }

    /// Roster rows for the whole lobby, with in-match ranks merged in from
    /// the skill payload where available.
    pub fn participant_rows(&self, ranks: &HashMap<String, u32>) -> Vec<Participant> {
        self.roster
            .iter()
            .map(|entry| {
                entry.to_participant(&self.match_id, ranks.get(&entry.account_id).copied())
            })
            .collect()
    }

    /// Medal tally rows for the whole lobby.
    pub fn medal_rows(&self) -> Vec<MedalTally> {
        self.medals
            .iter()
            .map(|m| MedalTally {
                match_id: self.match_id.clone(),
                account_id: m.account_id.clone(),
                medal_id: m.medal_id,
                count: m.count,
            })
            .collect()
    }

    /// One account's own statline, if it appears on the roster.
    pub fn statline(&self, account_id: &str) -> Option<&StatlineEntry> {
        self.roster.iter().find(|e| e.account_id == account_id)
    }
}

impl StatlineEntry {
    /// Convert to a roster row, optionally overriding the in-match rank
    /// with the skill payload's value.
    pub fn to_participant(&self, match_id: &str, rank_override: Option<u32>) -> Participant {
        Participant {
            match_id: match_id.to_string(),
            account_id: self.account_id.clone(),
            team: self.team,
            outcome: self.outcome,
            rank: rank_override.unwrap_or(self.rank),
            score: self.score,
            kills: self.kills,
            deaths: self.deaths,
            assists: self.assists,
            shots_fired: self.shots_fired,
            shots_hit: self.shots_hit,
            damage_dealt: self.damage_dealt,
            damage_taken: self.damage_taken,
        }
    }
}

impl EventEntry {
    /// Bind the event to its match id for persistence.
    pub fn into_match_event(self, match_id: &str) -> MatchEvent {
        MatchEvent {
            match_id: match_id.to_string(),
            category: self.category,
            time_ms: self.time_ms,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            target_id: self.target_id,
            target_name: self.target_name,
            type_hint: self.type_hint,
            payload: self.payload,
        }
    }
}
