//! Shared test fixtures: a scripted in-memory telemetry API with
//! per-endpoint call counters, plus payload builders.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use matchvault::storage::types::Outcome;
use matchvault::telemetry::types::{
    EventEntry, MatchIdPage, MatchInfo, MatchStats, MedalEntry, SkillEntry, StatlineEntry,
    TeamScoreEntry,
};
use matchvault::telemetry::{TelemetryApi, TelemetryError};

const PAGE_SIZE: usize = 3;

/// Install the test log subscriber once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Scripted telemetry backend.
#[derive(Default)]
pub struct MockTelemetry {
    histories: Mutex<HashMap<String, Vec<String>>>,
    stats: Mutex<HashMap<String, MatchStats>>,
    skills: Mutex<HashMap<String, Vec<SkillEntry>>>,
    events: Mutex<HashMap<String, Vec<EventEntry>>>,
    /// Match ids whose stats call permanently 404s.
    gone: Mutex<HashSet<String>>,
    /// Remaining transient failures per match id before stats succeed.
    flaky: Mutex<HashMap<String, usize>>,
    auth_rejected: AtomicBool,

    pub list_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub skill_calls: AtomicUsize,
    pub events_calls: AtomicUsize,
}

impl MockTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a match's payloads: stats, derived skill entries, and an
    /// event log with `event_count` entries.
    pub fn add_match(&self, stats: MatchStats, event_count: usize) {
        let match_id = stats.match_id.clone();
        let skill: Vec<SkillEntry> = stats
            .roster
            .iter()
            .enumerate()
            .map(|(i, e)| SkillEntry {
                account_id: e.account_id.clone(),
                rank: (i + 1) as u32,
            })
            .collect();

        self.skills.lock().unwrap().insert(match_id.clone(), skill);
        self.events
            .lock()
            .unwrap()
            .insert(match_id.clone(), sample_events(&stats, event_count));
        self.stats.lock().unwrap().insert(match_id, stats);
    }

    /// Set an account's match history, newest first.
    pub fn set_history(&self, account_id: &str, ids: &[&str]) {
        self.histories
            .lock()
            .unwrap()
            .insert(account_id.to_string(), ids.iter().map(|s| s.to_string()).collect());
    }

    /// Make a match's stats call permanently 404.
    pub fn mark_gone(&self, match_id: &str) {
        self.gone.lock().unwrap().insert(match_id.to_string());
    }

    /// Restore a previously 404ing match.
    pub fn restore(&self, match_id: &str) {
        self.gone.lock().unwrap().remove(match_id);
    }

    /// Make the next `failures` stats calls for a match fail transiently.
    pub fn make_flaky(&self, match_id: &str, failures: usize) {
        self.flaky
            .lock()
            .unwrap()
            .insert(match_id.to_string(), failures);
    }

    /// Reject every call with an authentication error.
    pub fn reject_auth(&self, rejected: bool) {
        self.auth_rejected.store(rejected, Ordering::Relaxed);
    }

    pub fn reset_counters(&self) {
        self.list_calls.store(0, Ordering::Relaxed);
        self.stats_calls.store(0, Ordering::Relaxed);
        self.skill_calls.store(0, Ordering::Relaxed);
        self.events_calls.store(0, Ordering::Relaxed);
    }

    pub fn total_calls(&self) -> usize {
        self.stats_calls.load(Ordering::Relaxed)
            + self.skill_calls.load(Ordering::Relaxed)
            + self.events_calls.load(Ordering::Relaxed)
    }

    fn check_auth(&self) -> Result<(), TelemetryError> {
        if self.auth_rejected.load(Ordering::Relaxed) {
            Err(TelemetryError::Auth("token rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TelemetryApi for MockTelemetry {
    async fn list_match_ids(
        &self,
        account_id: &str,
        cursor: Option<&str>,
    ) -> Result<MatchIdPage, TelemetryError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.check_auth()?;

        let history = self
            .histories
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let ids: Vec<String> = history.iter().skip(offset).take(PAGE_SIZE).cloned().collect();
        let next = offset + ids.len();
        let cursor = if next < history.len() {
            Some(next.to_string())
        } else {
            None
        };

        Ok(MatchIdPage { ids, cursor })
    }

    async fn get_match_stats(&self, match_id: &str) -> Result<MatchStats, TelemetryError> {
        self.stats_calls.fetch_add(1, Ordering::Relaxed);
        self.check_auth()?;

        if self.gone.lock().unwrap().contains(match_id) {
            return Err(TelemetryError::NotFound(match_id.to_string()));
        }

        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(match_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TelemetryError::Transient("backend hiccup".to_string()));
                }
            }
        }

        self.stats
            .lock()
            .unwrap()
            .get(match_id)
            .cloned()
            .ok_or_else(|| TelemetryError::NotFound(match_id.to_string()))
    }

    async fn get_skill(
        &self,
        match_id: &str,
        account_ids: &[String],
    ) -> Result<Vec<SkillEntry>, TelemetryError> {
        self.skill_calls.fetch_add(1, Ordering::Relaxed);
        self.check_auth()?;

        let entries = self
            .skills
            .lock()
            .unwrap()
            .get(match_id)
            .cloned()
            .ok_or_else(|| TelemetryError::NotFound(match_id.to_string()))?;

        if account_ids.is_empty() {
            Ok(entries)
        } else {
            Ok(entries
                .into_iter()
                .filter(|e| account_ids.contains(&e.account_id))
                .collect())
        }
    }

    async fn get_events(&self, match_id: &str) -> Result<Vec<EventEntry>, TelemetryError> {
        self.events_calls.fetch_add(1, Ordering::Relaxed);
        self.check_auth()?;

        self.events
            .lock()
            .unwrap()
            .get(match_id)
            .cloned()
            .ok_or_else(|| TelemetryError::NotFound(match_id.to_string()))
    }
}

/// A roster member spec for fixture matches.
pub struct Player {
    pub account_id: &'static str,
    pub display_name: &'static str,
    pub kills: u32,
    pub deaths: u32,
}

impl Player {
    pub fn new(account_id: &'static str, display_name: &'static str, kills: u32, deaths: u32) -> Self {
        Self {
            account_id,
            display_name,
            kills,
            deaths,
        }
    }
}

/// Build a stats payload starting `offset_minutes` after the fixture epoch,
/// with two medals per roster member.
pub fn match_stats(match_id: &str, offset_minutes: i64, players: &[Player]) -> MatchStats {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
        + Duration::minutes(offset_minutes);

    let roster = players
        .iter()
        .enumerate()
        .map(|(i, p)| StatlineEntry {
            account_id: p.account_id.to_string(),
            display_name: Some(p.display_name.to_string()),
            team: Some((i % 2) as u8),
            outcome: if i % 2 == 0 { Outcome::Win } else { Outcome::Loss },
            rank: 0,
            score: 1000 + 100 * p.kills as i64,
            kills: p.kills,
            deaths: p.deaths,
            assists: 2,
            shots_fired: 100,
            shots_hit: 40 + p.kills,
            damage_dealt: 150.0 * p.kills as f64,
            damage_taken: 120.0 * p.deaths as f64,
        })
        .collect();

    let medals = players
        .iter()
        .flat_map(|p| {
            [
                MedalEntry {
                    account_id: p.account_id.to_string(),
                    medal_id: 101,
                    count: 1 + p.kills / 5,
                },
                MedalEntry {
                    account_id: p.account_id.to_string(),
                    medal_id: 202,
                    count: 1,
                },
            ]
        })
        .collect();

    MatchStats {
        match_id: match_id.to_string(),
        info: MatchInfo {
            start_time: start,
            end_time: start + Duration::minutes(12),
            playlist_id: Some("pl-arena".to_string()),
            playlist_name: Some("Ranked Arena".to_string()),
            map_id: Some("map-bazaar".to_string()),
            map_name: Some("Bazaar".to_string()),
            variant_id: Some("var-slayer".to_string()),
            variant_name: Some("Slayer".to_string()),
            ranked: true,
            special: false,
            duration_seconds: 720,
            team_scores: vec![
                TeamScoreEntry { team: 0, score: 50 },
                TeamScoreEntry { team: 1, score: 44 },
            ],
        },
        roster,
        medals,
    }
}

fn sample_events(stats: &MatchStats, count: usize) -> Vec<EventEntry> {
    (0..count)
        .map(|i| {
            let actor = &stats.roster[i % stats.roster.len()];
            let target = &stats.roster[(i + 1) % stats.roster.len()];
            EventEntry {
                category: "kill".to_string(),
                time_ms: 10_000 * (i as u64 + 1),
                actor_id: Some(actor.account_id.clone()),
                actor_name: actor.display_name.clone(),
                target_id: Some(target.account_id.clone()),
                target_name: target.display_name.clone(),
                type_hint: Some("weapon".to_string()),
                payload: Some(serde_json::json!({ "weapon_id": 7, "headshot": i % 2 == 0 })),
            }
        })
        .collect()
}

/// Sync options tuned for tests: unlimited rate, tiny backoff.
pub fn test_options() -> matchvault::SyncOptions {
    matchvault::SyncOptions {
        requests_per_second: 0.0,
        retry_base_delay: std::time::Duration::from_millis(1),
        ..Default::default()
    }
}
