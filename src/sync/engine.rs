//! Synchronization engine: pages an account's recent matches, classifies
//! each as known or new against the shared registry, fetches the minimum
//! required telemetry, and persists it in commit batches.
//!
//! Fetches run concurrently up to the in-flight limit, but every local write
//! happens on the driving task: the embedded store has a single writer, so
//! completed fetch results are drained from the stream and written in
//! arrival order.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::StorePaths;
use crate::storage::account::{AccountStore, LAST_SYNCED_MATCH_KEY};
use crate::storage::database::DatabaseError;
use crate::storage::registry::RegistryStore;
use crate::storage::types::{Alias, AliasSource, CategorySet, Enrichment, MatchEvent};
use crate::sync::limiter::RateLimiter;
use crate::sync::scoring;
use crate::sync::{CancelFlag, SyncError, SyncFailure, SyncMode, SyncOptions, SyncReport};
use crate::telemetry::types::{EventEntry, MatchStats, SkillEntry};
use crate::telemetry::{TelemetryApi, TelemetryError};

/// Per-match fetch plan, decided against a registry snapshot.
#[derive(Debug, Clone, Copy)]
enum FetchPlan {
    /// Every requested category is already loaded: one lightweight call for
    /// the account's own statline, no shared writes.
    Known,
    /// Absent or partially loaded: fetch only the missing categories.
    New { missing: CategorySet, absent: bool },
}

/// Completed fetch result handed to the writer sequence.
enum MatchOutcome {
    Known {
        match_id: String,
        stats: MatchStats,
    },
    New {
        match_id: String,
        missing: CategorySet,
        stats: Option<MatchStats>,
        skill: Vec<SkillEntry>,
        events: Vec<EventEntry>,
    },
    Failed {
        match_id: String,
        error: TelemetryError,
    },
}

/// Enrichment work accumulated during a batch and written at flush time in
/// chronological order, so session chains do not depend on fetch completion
/// order.
struct StagedEnrichment {
    match_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    metric: f64,
    with_tracked_friends: bool,
}

/// Shared-match synchronization engine for one tracked account.
pub struct SyncEngine {
    api: Arc<dyn TelemetryApi>,
    registry: RegistryStore,
    account: AccountStore,
    account_id: String,
    cancel: CancelFlag,
}

impl SyncEngine {
    /// Create an engine over already-open stores.
    pub fn new(api: Arc<dyn TelemetryApi>, registry: RegistryStore, account: AccountStore) -> Self {
        let account_id = account.account_id().to_string();
        Self {
            api,
            registry,
            account,
            account_id,
            cancel: CancelFlag::new(),
        }
    }

    /// Open the stores under the given layout and create an engine.
    pub fn open(
        api: Arc<dyn TelemetryApi>,
        paths: &StorePaths,
        account_id: &str,
    ) -> Result<Self, DatabaseError> {
        let registry = RegistryStore::open(&paths.registry())?;
        let account = AccountStore::open(&paths.account_store(account_id), account_id)?;
        Ok(Self::new(api, registry, account))
    }

    /// The shared registry this engine writes to.
    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    /// The account store this engine writes to.
    pub fn account(&self) -> &AccountStore {
        &self.account
    }

    /// Flag that cancels the run at the next batch boundary.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Synchronize the account's match history.
    ///
    /// Per-match failures are collected into the report; only
    /// authentication, listing, and local write failures abort the run.
    pub async fn sync_account(
        &mut self,
        mode: SyncMode,
        options: &SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let watermark = self.account.meta_value(LAST_SYNCED_MATCH_KEY)?;
        let limiter = RateLimiter::per_second(options.requests_per_second);

        let ids = self
            .collect_match_ids(mode, options, watermark.as_deref(), &limiter)
            .await?;

        let mut report = SyncReport::default();

        if ids.is_empty() {
            info!("No new matches for account {}", self.account_id);
            return Ok(report);
        }

        let snapshot = self.registry.loaded_flags_for(&ids)?;
        let plans: Vec<(String, FetchPlan)> = ids
            .iter()
            .map(|id| {
                let plan = match snapshot.get(id) {
                    Some(loaded) if loaded.covers(&options.categories) => FetchPlan::Known,
                    Some(loaded) => FetchPlan::New {
                        missing: options.categories.missing_from(loaded),
                        absent: false,
                    },
                    None => FetchPlan::New {
                        missing: options.categories,
                        absent: true,
                    },
                };
                (id.clone(), plan)
            })
            .collect();

        let known = plans
            .iter()
            .filter(|(_, p)| matches!(p, FetchPlan::Known))
            .count();
        info!(
            "Syncing {} matches for account {} ({} known, {} new or partial)",
            plans.len(),
            self.account_id,
            known,
            plans.len() - known
        );

        let mut staged: Vec<StagedEnrichment> = Vec::new();
        let mut processed_in_batch = 0usize;

        self.begin_batch()?;

        {
            let mut outcomes = stream::iter(plans.into_iter().map(|(match_id, plan)| {
                let api = Arc::clone(&self.api);
                let limiter = &limiter;
                let attempts = options.retry_attempts;
                let base_delay = options.retry_base_delay;
                async move {
                    fetch_match(api, limiter, match_id, plan, attempts, base_delay).await
                }
            }))
            .buffer_unordered(options.max_in_flight.max(1));

            while let Some(outcome) = outcomes.next().await {
                let applied = match outcome {
                    MatchOutcome::Failed { match_id, error } => {
                        if error.is_fatal() {
                            self.rollback_batch();
                            return Err(SyncError::Auth(error.to_string()));
                        }
                        warn!("Match {} failed: {}", match_id, error);
                        report.matches_failed += 1;
                        report.errors.push(SyncFailure {
                            match_id,
                            error: error.to_string(),
                        });
                        Ok(())
                    }
                    MatchOutcome::Known { match_id, stats } => {
                        self.apply_known(match_id, stats, options, &mut report, &mut staged)
                    }
                    MatchOutcome::New {
                        match_id,
                        missing,
                        stats,
                        skill,
                        events,
                    } => self.apply_new(
                        match_id,
                        missing,
                        stats,
                        skill,
                        events,
                        options,
                        &mut report,
                        &mut staged,
                    ),
                };

                if let Err(e) = applied {
                    self.rollback_batch();
                    return Err(SyncError::Database(e));
                }

                processed_in_batch += 1;
                if processed_in_batch >= options.batch_size.max(1) {
                    if let Err(e) = self.flush_batch(&mut staged, options, &mut report) {
                        self.rollback_batch();
                        return Err(SyncError::Database(e));
                    }
                    processed_in_batch = 0;

                    if self.cancel.is_cancelled() {
                        info!(
                            "Sync of account {} cancelled between batches",
                            self.account_id
                        );
                        report.cancelled = true;
                        break;
                    }

                    self.begin_batch()?;
                }
            }
        }

        if !report.cancelled {
            if let Err(e) = self.flush_batch(&mut staged, options, &mut report) {
                self.rollback_batch();
                return Err(SyncError::Database(e));
            }

            if options.deferred_scoring {
                let filled = self.backfill_scores()?;
                debug!("Deferred pass filled {} scores", filled);
            }

            // The watermark only advances after everything committed cleanly,
            // so failed matches are retried by the next incremental run.
            if report.matches_failed == 0 {
                if let Some(newest) = ids.first() {
                    self.account.set_meta(LAST_SYNCED_MATCH_KEY, newest)?;
                }
            }
        }

        info!(
            "Sync of account {} finished: {} inserted, {} enriched, {} failed",
            self.account_id, report.matches_inserted, report.matches_enriched, report.matches_failed
        );

        Ok(report)
    }

    /// Compute every missing enrichment score in one ordered pass over the
    /// account's full chronological history.
    pub fn backfill_scores(&self) -> Result<usize, SyncError> {
        let missing: HashSet<String> = self
            .account
            .match_ids_missing_score()?
            .into_iter()
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let history = self.registry.statline_history(&self.account_id)?;
        let scores = scoring::deferred_scores(history);

        self.account.begin()?;
        let mut filled = 0;
        for (match_id, score) in scores {
            if !missing.contains(&match_id) {
                continue;
            }
            if let Err(e) = self.account.set_score(&match_id, score) {
                let _ = self.account.rollback();
                return Err(SyncError::Database(e));
            }
            filled += 1;
        }
        self.account.commit()?;

        Ok(filled)
    }

    /// Page the account's recent match ids, newest first.
    async fn collect_match_ids(
        &self,
        mode: SyncMode,
        options: &SyncOptions,
        watermark: Option<&str>,
        limiter: &RateLimiter,
    ) -> Result<Vec<String>, SyncError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let api = Arc::clone(&self.api);
            let account_id = self.account_id.clone();
            let current_cursor = cursor.clone();

            let page = with_retry(
                limiter,
                options.retry_attempts,
                options.retry_base_delay,
                move || {
                    let api = api.clone();
                    let account_id = account_id.clone();
                    let cursor = current_cursor.clone();
                    async move { api.list_match_ids(&account_id, cursor.as_deref()).await }
                },
            )
            .await
            .map_err(|e| {
                if e.is_fatal() {
                    SyncError::Auth(e.to_string())
                } else {
                    SyncError::Listing(e)
                }
            })?;

            for id in page.ids {
                if mode == SyncMode::Incremental && watermark == Some(id.as_str()) {
                    return Ok(ids);
                }
                ids.push(id);
                if ids.len() >= options.max_matches {
                    return Ok(ids);
                }
            }

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }

    /// Known-match path: no shared-table writes, only the contribution row,
    /// the recomputed counter, and this account's enrichment.
    fn apply_known(
        &self,
        match_id: String,
        stats: MatchStats,
        options: &SyncOptions,
        report: &mut SyncReport,
        staged: &mut Vec<StagedEnrichment>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();

        self.upsert_roster_aliases(&stats)?;
        self.registry
            .record_contribution(&match_id, &self.account_id, now)?;
        self.registry.recompute_synced_count(&match_id)?;

        let own = match stats.statline(&self.account_id) {
            Some(entry) => entry.to_participant(&match_id, None),
            None => {
                warn!(
                    "Account {} absent from roster of match {}",
                    self.account_id, match_id
                );
                report.matches_failed += 1;
                report.errors.push(SyncFailure {
                    match_id,
                    error: "account absent from match roster".to_string(),
                });
                return Ok(());
            }
        };

        let roster_ids: Vec<String> = stats.roster.iter().map(|e| e.account_id.clone()).collect();
        staged.push(StagedEnrichment {
            match_id,
            start_time: stats.info.start_time,
            end_time: stats.info.end_time,
            metric: own.performance_metric(),
            with_tracked_friends: self.played_with_tracked(&roster_ids, options),
        });

        Ok(())
    }

    /// New-match path: upsert the fetched categories with insert-or-ignore
    /// keys, raise the loaded flags, then enrich exactly like the known path.
    #[allow(clippy::too_many_arguments)]
    fn apply_new(
        &self,
        match_id: String,
        missing: CategorySet,
        stats: Option<MatchStats>,
        skill: Vec<SkillEntry>,
        events: Vec<EventEntry>,
        options: &SyncOptions,
        report: &mut SyncReport,
        staged: &mut Vec<StagedEnrichment>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let mut fetched = CategorySet::NONE;

        if let Some(stats) = &stats {
            let created = self
                .registry
                .insert_match(&stats.match_row(), &self.account_id, now)?;
            if created {
                report.matches_inserted += 1;
            }

            if missing.participants {
                let ranks: HashMap<String, u32> = skill
                    .iter()
                    .map(|s| (s.account_id.clone(), s.rank))
                    .collect();
                self.registry
                    .insert_participants(&stats.participant_rows(&ranks))?;
                fetched.participants = true;
            }

            if missing.medals {
                self.registry.insert_medals(&stats.medal_rows())?;
                fetched.medals = true;
            }

            self.upsert_roster_aliases(stats)?;
        }

        if missing.events {
            // Re-check against current registry state: a concurrent first
            // contributor may have landed the log since the snapshot.
            let current = self
                .registry
                .loaded_flags(&match_id)?
                .unwrap_or(CategorySet::NONE);
            if !current.events {
                let rows: Vec<MatchEvent> = events
                    .into_iter()
                    .map(|e| e.into_match_event(&match_id))
                    .collect();
                self.registry.insert_events(&rows)?;
            }
            fetched.events = true;
        }

        self.registry.raise_loaded_flags(&match_id, &fetched)?;
        self.registry
            .record_contribution(&match_id, &self.account_id, now)?;
        self.registry.recompute_synced_count(&match_id)?;

        let own = match &stats {
            Some(stats) => stats
                .statline(&self.account_id)
                .map(|e| e.to_participant(&match_id, None)),
            None => self.registry.get_participant(&match_id, &self.account_id)?,
        };

        let own = match own {
            Some(own) => own,
            None => {
                warn!(
                    "Account {} absent from roster of match {}",
                    self.account_id, match_id
                );
                report.matches_failed += 1;
                report.errors.push(SyncFailure {
                    match_id,
                    error: "account absent from match roster".to_string(),
                });
                return Ok(());
            }
        };

        let (start_time, end_time, roster_ids) = match &stats {
            Some(stats) => (
                stats.info.start_time,
                stats.info.end_time,
                stats.roster.iter().map(|e| e.account_id.clone()).collect(),
            ),
            None => {
                let stored = self.registry.get_match(&match_id)?.ok_or_else(|| {
                    DatabaseError::NotFound(format!("Match {}", match_id))
                })?;
                (
                    stored.row.start_time,
                    stored.row.end_time,
                    self.registry.participant_account_ids(&match_id)?,
                )
            }
        };

        staged.push(StagedEnrichment {
            match_id,
            start_time,
            end_time,
            metric: own.performance_metric(),
            with_tracked_friends: self.played_with_tracked(&roster_ids, options),
        });

        Ok(())
    }

    /// Write staged enrichment in chronological order and commit both
    /// stores.
    fn flush_batch(
        &self,
        staged: &mut Vec<StagedEnrichment>,
        options: &SyncOptions,
        report: &mut SyncReport,
    ) -> Result<(), DatabaseError> {
        staged.sort_by(|a, b| {
            (a.start_time, a.match_id.as_str()).cmp(&(b.start_time, b.match_id.as_str()))
        });

        for entry in staged.drain(..) {
            let previous = match self.registry.previous_match_for(
                &self.account_id,
                entry.start_time,
                &entry.match_id,
            )? {
                Some((prev_id, prev_end)) => Some((
                    prev_end,
                    self.account
                        .enrichment(&prev_id)?
                        .and_then(|e| e.session_id),
                )),
                None => None,
            };
            let session_id =
                scoring::assign_session(previous, entry.start_time, options.session_gap);

            let score = if options.deferred_scoring {
                None
            } else {
                let metrics = self.registry.metric_history_through(
                    &self.account_id,
                    entry.start_time,
                    &entry.match_id,
                )?;
                Some(scoring::percentile_score(&metrics, entry.metric))
            };

            self.account.upsert_enrichment(&Enrichment {
                match_id: entry.match_id,
                score,
                session_id: Some(session_id),
                with_tracked_friends: entry.with_tracked_friends,
                updated_at: Utc::now(),
            })?;
            report.matches_enriched += 1;
        }

        self.registry.commit()?;
        self.account.commit()?;
        Ok(())
    }

    fn begin_batch(&self) -> Result<(), SyncError> {
        self.registry.begin()?;
        self.account.begin()?;
        Ok(())
    }

    fn rollback_batch(&self) {
        let _ = self.registry.rollback();
        let _ = self.account.rollback();
    }

    /// Upsert every roster display name into the alias directory.
    fn upsert_roster_aliases(&self, stats: &MatchStats) -> Result<(), DatabaseError> {
        for entry in &stats.roster {
            if let Some(name) = &entry.display_name {
                let source = if entry.account_id == self.account_id {
                    AliasSource::Sync
                } else {
                    AliasSource::Roster
                };
                self.registry.upsert_alias(&Alias {
                    account_id: entry.account_id.clone(),
                    display_name: name.clone(),
                    last_seen: stats.info.end_time,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Whether another tracked account appears on the roster.
    fn played_with_tracked(&self, roster_ids: &[String], options: &SyncOptions) -> bool {
        roster_ids.iter().any(|id| {
            *id != self.account_id && options.tracked_accounts.iter().any(|t| t == id)
        })
    }
}

/// Fetch everything one match needs, respecting the rate limiter. The
/// new-match path issues its calls concurrently; each call retries
/// transient errors with exponential backoff.
async fn fetch_match(
    api: Arc<dyn TelemetryApi>,
    limiter: &RateLimiter,
    match_id: String,
    plan: FetchPlan,
    attempts: u32,
    base_delay: Duration,
) -> MatchOutcome {
    match plan {
        FetchPlan::Known => {
            let result = {
                let api = api.clone();
                let id = match_id.clone();
                with_retry(limiter, attempts, base_delay, move || {
                    let api = api.clone();
                    let id = id.clone();
                    async move { api.get_match_stats(&id).await }
                })
                .await
            };

            match result {
                Ok(stats) => MatchOutcome::Known { match_id, stats },
                Err(error) => MatchOutcome::Failed { match_id, error },
            }
        }
        FetchPlan::New { missing, absent } => {
            let needs_stats = absent || missing.participants || missing.medals;
            let needs_skill = missing.participants;
            let needs_events = missing.events;

            let stats_call = async {
                if !needs_stats {
                    return Ok(None);
                }
                let api = api.clone();
                let id = match_id.clone();
                with_retry(limiter, attempts, base_delay, move || {
                    let api = api.clone();
                    let id = id.clone();
                    async move { api.get_match_stats(&id).await }
                })
                .await
                .map(Some)
            };

            let skill_call = async {
                if !needs_skill {
                    return Ok(Vec::new());
                }
                let api = api.clone();
                let id = match_id.clone();
                with_retry(limiter, attempts, base_delay, move || {
                    let api = api.clone();
                    let id = id.clone();
                    async move { api.get_skill(&id, &[]).await }
                })
                .await
            };

            let events_call = async {
                if !needs_events {
                    return Ok(Vec::new());
                }
                let api = api.clone();
                let id = match_id.clone();
                with_retry(limiter, attempts, base_delay, move || {
                    let api = api.clone();
                    let id = id.clone();
                    async move { api.get_events(&id).await }
                })
                .await
            };

            let (stats, skill, events) = tokio::join!(stats_call, skill_call, events_call);

            let mut errors = Vec::new();
            let stats = stats.unwrap_or_else(|e| {
                errors.push(e);
                None
            });
            let skill = skill.unwrap_or_else(|e| {
                errors.push(e);
                Vec::new()
            });
            let events = events.unwrap_or_else(|e| {
                errors.push(e);
                Vec::new()
            });

            if let Some(pos) = errors.iter().position(|e| e.is_fatal()) {
                return MatchOutcome::Failed {
                    match_id,
                    error: errors.swap_remove(pos),
                };
            }
            if let Some(error) = errors.into_iter().next() {
                return MatchOutcome::Failed { match_id, error };
            }

            MatchOutcome::New {
                match_id,
                missing,
                stats,
                skill,
                events,
            }
        }
    }
}

/// Retry a telemetry call with bounded exponential backoff: transient
/// errors (timeout, rate-limited, 5xx) retry up to `attempts` times with
/// the delay doubling each attempt; everything else fails immediately.
/// Each attempt takes its own rate-limiter slot.
async fn with_retry<T, F, Fut>(
    limiter: &RateLimiter,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, TelemetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TelemetryError>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;

    loop {
        limiter.acquire().await;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(
                    "Transient telemetry error (attempt {}/{}): {}",
                    attempt, attempts, e
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
