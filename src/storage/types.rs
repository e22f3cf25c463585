//! Domain types shared by the registry, the account stores, and the
//! match source view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telemetry categories a match row can carry. Used both for the monotonic
/// *loaded* flags on a registry match and for the categories a sync run
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CategorySet {
    pub participants: bool,
    pub events: bool,
    pub medals: bool,
}

impl CategorySet {
    /// Every category.
    pub const ALL: CategorySet = CategorySet {
        participants: true,
        events: true,
        medals: true,
    };

    /// No category.
    pub const NONE: CategorySet = CategorySet {
        participants: false,
        events: false,
        medals: false,
    };

    /// True when no category is set.
    pub fn is_empty(&self) -> bool {
        !self.participants && !self.events && !self.medals
    }

    /// True when every category in `requested` is also set here.
    pub fn covers(&self, requested: &CategorySet) -> bool {
        (!requested.participants || self.participants)
            && (!requested.events || self.events)
            && (!requested.medals || self.medals)
    }

    /// Categories set in `self` but not in `loaded`.
    pub fn missing_from(&self, loaded: &CategorySet) -> CategorySet {
        CategorySet {
            participants: self.participants && !loaded.participants,
            events: self.events && !loaded.events,
            medals: self.medals && !loaded.medals,
        }
    }
}

/// Per-team final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamScore {
    pub team: u8,
    pub score: i64,
}

/// A participant's result in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Tie,
    /// Left before the match ended.
    DidNotFinish,
}

impl Outcome {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Tie => "tie",
            Outcome::DidNotFinish => "dnf",
        }
    }

    /// Parse the database string form.
    pub fn parse(value: &str) -> Option<Outcome> {
        match value {
            "win" => Some(Outcome::Win),
            "loss" => Some(Outcome::Loss),
            "tie" => Some(Outcome::Tie),
            "dnf" => Some(Outcome::DidNotFinish),
            _ => None,
        }
    }
}

/// Canonical match facts, shared by every participant.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub match_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub playlist_id: Option<String>,
    pub playlist_name: Option<String>,
    pub map_id: Option<String>,
    pub map_name: Option<String>,
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,
    pub ranked: bool,
    pub special: bool,
    pub duration_seconds: u32,
    pub team_scores: Vec<TeamScore>,
}

/// A match row together with its registry bookkeeping columns.
#[derive(Debug, Clone)]
pub struct StoredMatch {
    pub row: MatchRow,
    pub loaded: CategorySet,
    pub backfill_steps: u8,
    pub first_account_id: String,
    pub first_synced_at: DateTime<Utc>,
    pub synced_account_count: u32,
}

/// One roster entry: a single account's statline for a single match.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub match_id: String,
    pub account_id: String,
    pub team: Option<u8>,
    pub outcome: Outcome,
    pub rank: u32,
    pub score: i64,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub damage_dealt: f64,
    pub damage_taken: f64,
}

impl Participant {
    /// Hit fraction, 0.0 when no shots were fired.
    pub fn accuracy(&self) -> f64 {
        if self.shots_fired == 0 {
            0.0
        } else {
            f64::from(self.shots_hit) / f64::from(self.shots_fired)
        }
    }

    /// Weighted statline metric used for the percentile performance score.
    pub fn performance_metric(&self) -> f64 {
        f64::from(self.kills) + 0.5 * f64::from(self.assists) - f64::from(self.deaths)
            + self.accuracy()
    }
}

/// One entry in a match's event log.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub match_id: String,
    pub category: String,
    pub time_ms: u64,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub type_hint: Option<String>,
    /// Opaque payload, stored verbatim.
    pub payload: Option<serde_json::Value>,
}

/// Count of a specific award for one account in one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedalTally {
    pub match_id: String,
    pub account_id: String,
    pub medal_id: i64,
    pub count: u32,
}

/// Where a display name observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasSource {
    /// Seen on a fetched match roster.
    Roster,
    /// Reported for the syncing account itself.
    Sync,
    /// Recovered from a legacy store during backfill.
    Backfill,
}

impl AliasSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasSource::Roster => "roster",
            AliasSource::Sync => "sync",
            AliasSource::Backfill => "backfill",
        }
    }

    pub fn parse(value: &str) -> Option<AliasSource> {
        match value {
            "roster" => Some(AliasSource::Roster),
            "sync" => Some(AliasSource::Sync),
            "backfill" => Some(AliasSource::Backfill),
            _ => None,
        }
    }
}

/// Latest known display name for an account.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub account_id: String,
    pub display_name: String,
    pub last_seen: DateTime<Utc>,
    pub source: AliasSource,
}

/// Private per-account annotations for one match.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub match_id: String,
    /// Percentile performance score; None while a deferred pass is pending.
    pub score: Option<f64>,
    pub session_id: Option<String>,
    pub with_tracked_friends: bool,
    pub updated_at: DateTime<Utc>,
}

/// One point of an account's chronological statline history, used by the
/// percentile scoring passes.
#[derive(Debug, Clone)]
pub struct HistoryPoint {
    pub match_id: String,
    pub start_time: DateTime<Utc>,
    pub metric: f64,
}

/// Filters for loading an account's match history through the source view.
#[derive(Debug, Clone, Default)]
pub struct MatchFilters {
    pub playlist_id: Option<String>,
    pub map_id: Option<String>,
    pub ranked_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// One logical per-account match record, composed from the shared match
/// facts, the account's own roster row, and its private enrichment.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub match_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub playlist_id: Option<String>,
    pub playlist_name: Option<String>,
    pub map_id: Option<String>,
    pub map_name: Option<String>,
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,
    pub ranked: bool,
    pub special: bool,
    pub duration_seconds: u32,
    pub team_scores: Vec<TeamScore>,
    pub team: Option<u8>,
    pub outcome: Outcome,
    pub rank: u32,
    pub score: i64,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub shots_fired: u32,
    pub shots_hit: u32,
    pub damage_dealt: f64,
    pub damage_taken: f64,
    /// None when the account has no enrichment row for this match.
    pub performance_score: Option<f64>,
    pub session_id: Option<String>,
    pub with_tracked_friends: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_set_covers() {
        let loaded = CategorySet {
            participants: true,
            events: false,
            medals: true,
        };
        assert!(loaded.covers(&CategorySet {
            participants: true,
            events: false,
            medals: false,
        }));
        assert!(!loaded.covers(&CategorySet::ALL));
        assert!(CategorySet::ALL.covers(&CategorySet::ALL));
        assert!(loaded.covers(&CategorySet::NONE));
    }

    #[test]
    fn test_category_set_missing_from() {
        let loaded = CategorySet {
            participants: true,
            events: false,
            medals: true,
        };
        let missing = CategorySet::ALL.missing_from(&loaded);
        assert!(!missing.participants);
        assert!(missing.events);
        assert!(!missing.medals);
        assert!(CategorySet::ALL.missing_from(&CategorySet::ALL).is_empty());
    }

    #[test]
    fn test_outcome_round_trip() {
        for outcome in [
            Outcome::Win,
            Outcome::Loss,
            Outcome::Tie,
            Outcome::DidNotFinish,
        ] {
            assert_eq!(Outcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(Outcome::parse("unknown"), None);
    }

    #[test]
    fn test_performance_metric_includes_accuracy() {
        let mut p = Participant {
            match_id: "m1".to_string(),
            account_id: "a1".to_string(),
            team: Some(0),
            outcome: Outcome::Win,
            rank: 1,
            score: 2500,
            kills: 12,
            deaths: 8,
            assists: 4,
            shots_fired: 100,
            shots_hit: 50,
            damage_dealt: 1800.0,
            damage_taken: 1500.0,
        };
        assert!((p.performance_metric() - 6.5).abs() < f64::EPSILON);

        p.shots_fired = 0;
        p.shots_hit = 0;
        assert!((p.performance_metric() - 6.0).abs() < f64::EPSILON);
    }
}
