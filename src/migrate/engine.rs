//! Re-runnable fold of a legacy per-account store into the shared registry.
//!
//! Legacy installations duplicated every match's roster, events, and medals
//! into each participant's own store. The backfill walks one account's
//! legacy rows chronologically: shared rows are contributed only when the
//! registry does not have the match yet, enrichment is recomputed for every
//! match, and the participant counter is re-derived from the contribution
//! log so repeated and out-of-order runs converge on identical content.

use chrono::Utc;
use tracing::{info, warn};

use crate::config::StorePaths;
use crate::migrate::{
    MigrateOptions, MigrationError, MigrationFailure, MigrationReport, BACKFILL_CORE,
    BACKFILL_EVENTS, BACKFILL_MEDALS,
};
use crate::storage::account::{AccountStore, MIGRATED_AT_KEY};
use crate::storage::database::DatabaseError;
use crate::storage::registry::RegistryStore;
use crate::storage::types::{Alias, AliasSource, CategorySet, Enrichment, MatchRow};
use crate::sync::scoring;

/// Backfill engine for one account's legacy store.
pub struct Migrator {
    registry: RegistryStore,
    account: AccountStore,
    account_id: String,
}

impl Migrator {
    /// Create a migrator over already-open stores.
    pub fn new(registry: RegistryStore, account: AccountStore) -> Self {
        let account_id = account.account_id().to_string();
        Self {
            registry,
            account,
            account_id,
        }
    }

    /// Open the stores under the given layout and create a migrator.
    pub fn open(paths: &StorePaths, account_id: &str) -> Result<Self, DatabaseError> {
        let registry = RegistryStore::open(&paths.registry())?;
        let account = AccountStore::open(&paths.account_store(account_id), account_id)?;
        Ok(Self::new(registry, account))
    }

    /// The shared registry this migrator writes to.
    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    /// The account store this migrator writes to.
    pub fn account(&self) -> &AccountStore {
        &self.account
    }

    /// Fold the account's legacy store into the registry.
    ///
    /// Idempotent: running twice for the same account, or for several
    /// accounts in any order, yields identical final registry content.
    /// Interrupted runs resume on retry without duplicating rows.
    pub fn migrate_account(
        &mut self,
        options: &MigrateOptions,
    ) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();

        if !self.account.has_legacy_tables()? {
            info!(
                "Account {} has no legacy store; nothing to migrate",
                self.account_id
            );
            return Ok(report);
        }

        let legacy_matches = self.account.legacy_match_rows()?;
        info!(
            "Migrating {} legacy matches for account {}",
            legacy_matches.len(),
            self.account_id
        );

        let batch_size = options.batch_size.max(1);
        let mut processed_in_batch = 0usize;

        self.begin_batch()?;

        for row in legacy_matches {
            let match_id = row.match_id.clone();
            match self.migrate_one(row, options) {
                Ok(contributed) => {
                    if contributed {
                        report.matches_migrated += 1;
                    } else {
                        report.matches_skipped_already_shared += 1;
                    }
                }
                Err(MigrateRowError::Skip(reason)) => {
                    warn!("Legacy match {} skipped: {}", match_id, reason);
                    report.matches_failed += 1;
                    report.errors.push(MigrationFailure {
                        match_id,
                        error: reason,
                    });
                }
                Err(MigrateRowError::Fatal(e)) => {
                    self.rollback_batch();
                    return Err(MigrationError::Database(e));
                }
            }

            processed_in_batch += 1;
            if processed_in_batch >= batch_size {
                self.commit_batch()?;
                processed_in_batch = 0;
                self.begin_batch()?;
            }
        }

        self.commit_batch()?;

        // Scores are filled in one ordered pass over the full history, like
        // the sync engine's deferred mode.
        self.backfill_scores()?;

        self.account
            .set_meta(MIGRATED_AT_KEY, &Utc::now().to_rfc3339())?;

        info!(
            "Migration of account {} finished: {} migrated, {} already shared, {} failed",
            self.account_id,
            report.matches_migrated,
            report.matches_skipped_already_shared,
            report.matches_failed
        );

        Ok(report)
    }

    /// Fold one legacy match. Returns true when this run contributed the
    /// shared rows, false when another account already had.
    fn migrate_one(
        &self,
        row: MatchRow,
        options: &MigrateOptions,
    ) -> Result<bool, MigrateRowError> {
        let match_id = row.match_id.clone();
        let now = Utc::now();

        let participants = self.account.legacy_participants(&match_id)?;
        if !participants
            .iter()
            .any(|(p, _)| p.account_id == self.account_id)
        {
            return Err(MigrateRowError::Skip(
                "account absent from legacy roster".to_string(),
            ));
        }

        let contributed = if self.registry.match_exists(&match_id)? {
            false
        } else {
            let events = self.account.legacy_events(&match_id)?;
            let medals = self.account.legacy_medals(&match_id)?;

            self.registry.insert_match(&row, &self.account_id, now)?;
            self.registry
                .insert_participants(&participants.iter().map(|(p, _)| p.clone()).collect::<Vec<_>>())?;

            let mut steps = BACKFILL_CORE;
            if !events.is_empty() {
                steps |= BACKFILL_EVENTS;
            }
            if !medals.is_empty() {
                steps |= BACKFILL_MEDALS;
            }
            self.registry.insert_events(&events)?;
            self.registry.insert_medals(&medals)?;
            self.registry.raise_loaded_flags(&match_id, &CategorySet::ALL)?;
            self.registry.mark_backfill_steps(&match_id, steps)?;

            true
        };

        // Legacy stores carried display names inline; fold them into the
        // alias directory with the match end as the observation time.
        for (p, display_name) in &participants {
            if let Some(name) = display_name {
                self.registry.upsert_alias(&Alias {
                    account_id: p.account_id.clone(),
                    display_name: name.clone(),
                    last_seen: row.end_time,
                    source: AliasSource::Backfill,
                })?;
            }
        }

        self.registry
            .record_contribution(&match_id, &self.account_id, now)?;
        self.registry.recompute_synced_count(&match_id)?;

        // Enrichment is recomputed from the legacy statline either way.
        let previous = match self.registry.previous_match_for(
            &self.account_id,
            row.start_time,
            &match_id,
        )? {
            Some((prev_id, prev_end)) => Some((
                prev_end,
                self.account
                    .enrichment(&prev_id)?
                    .and_then(|e| e.session_id),
            )),
            None => None,
        };
        let session_id = scoring::assign_session(previous, row.start_time, options.session_gap);

        let with_tracked_friends = participants.iter().any(|(p, _)| {
            p.account_id != self.account_id
                && options.tracked_accounts.iter().any(|t| *t == p.account_id)
        });

        self.account.upsert_enrichment(&Enrichment {
            match_id,
            score: None,
            session_id: Some(session_id),
            with_tracked_friends,
            updated_at: now,
        })?;

        Ok(contributed)
    }

    /// Fill every missing enrichment score in one ordered pass.
    fn backfill_scores(&self) -> Result<(), MigrationError> {
        let missing: std::collections::HashSet<String> = self
            .account
            .match_ids_missing_score()?
            .into_iter()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let history = self.registry.statline_history(&self.account_id)?;
        let scores = scoring::deferred_scores(history);

        self.account.begin()?;
        for (match_id, score) in scores {
            if !missing.contains(&match_id) {
                continue;
            }
            if let Err(e) = self.account.set_score(&match_id, score) {
                let _ = self.account.rollback();
                return Err(MigrationError::Database(e));
            }
        }
        self.account.commit()?;

        Ok(())
    }

    fn begin_batch(&self) -> Result<(), MigrationError> {
        self.registry.begin()?;
        self.account.begin()?;
        Ok(())
    }

    fn commit_batch(&self) -> Result<(), MigrationError> {
        self.registry.commit()?;
        self.account.commit()?;
        Ok(())
    }

    fn rollback_batch(&self) {
        let _ = self.registry.rollback();
        let _ = self.account.rollback();
    }
}

/// Outcome classification for one legacy row.
enum MigrateRowError {
    /// Recorded per-match, the run continues.
    Skip(String),
    /// Aborts the current batch and the run.
    Fatal(DatabaseError),
}

impl From<DatabaseError> for MigrateRowError {
    fn from(e: DatabaseError) -> Self {
        MigrateRowError::Fatal(e)
    }
}
