//! Integration tests for the backfill engine: legacy stores fold into the
//! registry exactly once, re-runs and out-of-order multi-account runs
//! converge on identical content, and counters are re-derived.

use chrono::{Duration, TimeZone, Utc};
use matchvault::migrate::{BACKFILL_CORE, BACKFILL_EVENTS, BACKFILL_MEDALS};
use matchvault::storage::types::{MatchEvent, MatchRow, MedalTally, Outcome, Participant, TeamScore};
use matchvault::storage::{AccountStore, MIGRATED_AT_KEY};
use matchvault::{MigrateOptions, Migrator, StorePaths};

fn legacy_row(match_id: &str, offset_minutes: i64) -> MatchRow {
    let start = Utc.with_ymd_and_hms(2025, 10, 4, 19, 0, 0).unwrap()
        + Duration::minutes(offset_minutes);
    MatchRow {
        match_id: match_id.to_string(),
        start_time: start,
        end_time: start + Duration::minutes(11),
        playlist_id: Some("pl-btb".to_string()),
        playlist_name: Some("Big Team Battle".to_string()),
        map_id: Some("map-highlands".to_string()),
        map_name: Some("Highlands".to_string()),
        variant_id: None,
        variant_name: None,
        ranked: false,
        special: false,
        duration_seconds: 660,
        team_scores: vec![TeamScore { team: 0, score: 100 }],
    }
}

fn legacy_participant(
    match_id: &str,
    account_id: &str,
    name: &str,
    kills: u32,
) -> (Participant, Option<String>) {
    (
        Participant {
            match_id: match_id.to_string(),
            account_id: account_id.to_string(),
            team: Some(0),
            outcome: Outcome::Win,
            rank: 3,
            score: 1500,
            kills,
            deaths: 6,
            assists: 4,
            shots_fired: 90,
            shots_hit: 45,
            damage_dealt: 1300.0,
            damage_taken: 900.0,
        },
        Some(name.to_string()),
    )
}

fn legacy_event(match_id: &str, time_ms: u64) -> MatchEvent {
    MatchEvent {
        match_id: match_id.to_string(),
        category: "kill".to_string(),
        time_ms,
        actor_id: Some("acct-a".to_string()),
        actor_name: Some("PlayerA".to_string()),
        target_id: Some("acct-b".to_string()),
        target_name: Some("PlayerB".to_string()),
        type_hint: None,
        payload: None,
    }
}

fn legacy_medal(match_id: &str, account_id: &str, medal_id: i64) -> MedalTally {
    MedalTally {
        match_id: match_id.to_string(),
        account_id: account_id.to_string(),
        medal_id,
        count: 1,
    }
}

/// Build account A's legacy store: m1 (shared with B, with events and
/// medals) and m2 (A only, bare).
fn build_legacy_store_a(paths: &StorePaths) {
    let store = AccountStore::open(&paths.account_store("acct-a"), "acct-a").unwrap();
    store
        .insert_legacy_match(
            &legacy_row("m1", 0),
            &[
                legacy_participant("m1", "acct-a", "PlayerA", 14),
                legacy_participant("m1", "acct-b", "PlayerB", 9),
            ],
            &[legacy_event("m1", 30_000), legacy_event("m1", 95_000)],
            &[
                legacy_medal("m1", "acct-a", 101),
                legacy_medal("m1", "acct-b", 101),
            ],
        )
        .unwrap();
    store
        .insert_legacy_match(
            &legacy_row("m2", 40),
            &[legacy_participant("m2", "acct-a", "PlayerA", 6)],
            &[],
            &[],
        )
        .unwrap();
}

/// Build account B's legacy store: the same m1 plus B-only m3.
fn build_legacy_store_b(paths: &StorePaths) {
    let store = AccountStore::open(&paths.account_store("acct-b"), "acct-b").unwrap();
    store
        .insert_legacy_match(
            &legacy_row("m1", 0),
            &[
                legacy_participant("m1", "acct-a", "PlayerA", 14),
                legacy_participant("m1", "acct-b", "PlayerB", 9),
            ],
            &[legacy_event("m1", 30_000), legacy_event("m1", 95_000)],
            &[
                legacy_medal("m1", "acct-a", 101),
                legacy_medal("m1", "acct-b", 101),
            ],
        )
        .unwrap();
    store
        .insert_legacy_match(
            &legacy_row("m3", 90),
            &[legacy_participant("m3", "acct-b", "PlayerB", 11)],
            &[legacy_event("m3", 12_000)],
            &[legacy_medal("m3", "acct-b", 202)],
        )
        .unwrap();
}

#[test]
fn test_migrate_single_account() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let paths = StorePaths::new(dir.path());
    build_legacy_store_a(&paths);

    let mut migrator = Migrator::open(&paths, "acct-a").unwrap();
    let report = migrator
        .migrate_account(&MigrateOptions::default())
        .expect("Migration failed");

    assert_eq!(report.matches_migrated, 2);
    assert_eq!(report.matches_skipped_already_shared, 0);
    assert_eq!(report.matches_failed, 0);

    let registry = migrator.registry();
    assert_eq!(registry.count_matches().unwrap(), 2);
    assert_eq!(registry.count_participants("m1").unwrap(), 2);
    assert_eq!(registry.count_events("m1").unwrap(), 2);
    assert_eq!(registry.count_medals("m1").unwrap(), 2);

    let m1 = registry.get_match("m1").unwrap().expect("Match not found");
    assert_eq!(m1.first_account_id, "acct-a");
    assert_eq!(m1.synced_account_count, 1);
    assert!(m1.loaded.participants && m1.loaded.events && m1.loaded.medals);
    assert_eq!(
        m1.backfill_steps,
        BACKFILL_CORE | BACKFILL_EVENTS | BACKFILL_MEDALS
    );

    // m2 carried no events or medals, so only the core bit is set.
    let m2 = registry.get_match("m2").unwrap().unwrap();
    assert_eq!(m2.backfill_steps, BACKFILL_CORE);

    // Legacy display names landed in the alias directory.
    let alias = registry.get_alias("acct-b").unwrap().expect("Alias not found");
    assert_eq!(alias.display_name, "PlayerB");

    // Enrichment recomputed from legacy data, scores filled by the final
    // ordered pass.
    let account = migrator.account();
    assert_eq!(account.count_enrichment().unwrap(), 2);
    for id in ["m1", "m2"] {
        let e = account.enrichment(id).unwrap().expect("Enrichment not found");
        assert!(e.score.is_some());
        assert!(e.session_id.is_some());
    }
    assert!(account.meta_value(MIGRATED_AT_KEY).unwrap().is_some());
}

#[test]
fn test_remigration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::new(dir.path());
    build_legacy_store_a(&paths);

    let mut migrator = Migrator::open(&paths, "acct-a").unwrap();
    migrator.migrate_account(&MigrateOptions::default()).unwrap();

    let registry = migrator.registry();
    let matches_before = registry.count_matches().unwrap();
    let participants_before = registry.count_participants("m1").unwrap();
    let events_before = registry.count_events("m1").unwrap();
    let medals_before = registry.count_medals("m1").unwrap();
    drop(migrator);

    // Second run over the same legacy data: everything is already shared.
    let mut migrator = Migrator::open(&paths, "acct-a").unwrap();
    let report = migrator.migrate_account(&MigrateOptions::default()).unwrap();

    assert_eq!(report.matches_migrated, 0);
    assert_eq!(report.matches_skipped_already_shared, 2);

    let registry = migrator.registry();
    assert_eq!(registry.count_matches().unwrap(), matches_before);
    assert_eq!(registry.count_participants("m1").unwrap(), participants_before);
    assert_eq!(registry.count_events("m1").unwrap(), events_before);
    assert_eq!(registry.count_medals("m1").unwrap(), medals_before);
    assert_eq!(
        registry.get_match("m1").unwrap().unwrap().synced_account_count,
        1
    );
}

#[test]
fn test_out_of_order_multi_account_migration() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::new(dir.path());
    build_legacy_store_a(&paths);
    build_legacy_store_b(&paths);

    let mut options = MigrateOptions::default();
    options.tracked_accounts = vec!["acct-a".to_string(), "acct-b".to_string()];

    // B migrates before A.
    let mut migrator_b = Migrator::open(&paths, "acct-b").unwrap();
    let report_b = migrator_b.migrate_account(&options).unwrap();
    assert_eq!(report_b.matches_migrated, 2);
    drop(migrator_b);

    let mut migrator_a = Migrator::open(&paths, "acct-a").unwrap();
    let report_a = migrator_a.migrate_account(&options).unwrap();

    // A's shared copy of m1 was already contributed by B.
    assert_eq!(report_a.matches_migrated, 1);
    assert_eq!(report_a.matches_skipped_already_shared, 1);

    let registry = migrator_a.registry();
    assert_eq!(registry.count_matches().unwrap(), 3);
    assert_eq!(registry.count_participants("m1").unwrap(), 2);
    assert_eq!(registry.count_events("m1").unwrap(), 2);

    let m1 = registry.get_match("m1").unwrap().unwrap();
    assert_eq!(m1.first_account_id, "acct-b");
    assert_eq!(m1.synced_account_count, 2);

    // Both accounts hold private enrichment for the shared match.
    assert!(migrator_a.account().enrichment("m1").unwrap().is_some());
    let e = migrator_a.account().enrichment("m1").unwrap().unwrap();
    assert!(e.with_tracked_friends);
    drop(migrator_a);

    let store_b = AccountStore::open(&paths.account_store("acct-b"), "acct-b").unwrap();
    assert!(store_b.enrichment("m1").unwrap().is_some());
    assert!(store_b.enrichment("m3").unwrap().is_some());
}

#[test]
fn test_migration_without_legacy_tables_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let paths = StorePaths::new(dir.path());

    // Fresh (post-registry) account store, no legacy tables.
    AccountStore::open(&paths.account_store("acct-a"), "acct-a").unwrap();

    let mut migrator = Migrator::open(&paths, "acct-a").unwrap();
    let report = migrator.migrate_account(&MigrateOptions::default()).unwrap();

    assert_eq!(report.matches_migrated, 0);
    assert_eq!(report.matches_skipped_already_shared, 0);
    assert_eq!(report.matches_failed, 0);
    assert_eq!(migrator.registry().count_matches().unwrap(), 0);
}
