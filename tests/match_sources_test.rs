//! End-to-end tests for the match source view over synced data: two stores
//! served as one logical table, with enrichment nulls where an account
//! played a match but never synced it.

mod common;

use std::sync::Arc;

use common::{match_stats, test_options, MockTelemetry, Player};
use matchvault::storage::types::{MatchFilters, Outcome};
use matchvault::{MatchSource, StorePaths, SyncEngine, SyncMode};

#[tokio::test]
async fn test_view_composes_registry_and_enrichment() -> anyhow::Result<()> {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let paths = StorePaths::new(dir.path());

    let api = Arc::new(MockTelemetry::new());
    for (id, offset) in [("m1", 0), ("m2", 30)] {
        api.add_match(
            match_stats(
                id,
                offset,
                &[
                    Player::new("acct-a", "PlayerA", 12, 5),
                    Player::new("acct-b", "PlayerB", 9, 7),
                ],
            ),
            3,
        );
    }
    // A played both matches; B only ever syncs m1.
    api.set_history("acct-a", &["m2", "m1"]);
    api.set_history("acct-b", &["m1"]);

    let options = test_options();
    let mut engine_a = SyncEngine::open(api.clone(), &paths, "acct-a")?;
    engine_a.sync_account(SyncMode::Full, &options).await?;
    drop(engine_a);
    let mut engine_b = SyncEngine::open(api.clone(), &paths, "acct-b")?;
    engine_b.sync_account(SyncMode::Full, &options).await?;
    drop(engine_b);

    // Account A sees both matches, fully enriched, newest first.
    let source_a = MatchSource::open(&paths, "acct-a")?;
    let records = source_a.load_matches(&MatchFilters::default())?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].match_id, "m2");
    assert_eq!(records[1].match_id, "m1");
    for record in &records {
        assert_eq!(record.kills, 12);
        assert_eq!(record.outcome, Outcome::Win);
        assert!(record.performance_score.is_some());
        assert!(record.session_id.is_some());
        assert_eq!(record.playlist_name.as_deref(), Some("Ranked Arena"));
    }

    // Account B has a roster row for m2 (contributed by A's sync) but no
    // private enrichment for it.
    let source_b = MatchSource::open(&paths, "acct-b")?;
    let records = source_b.load_matches(&MatchFilters::default())?;
    assert_eq!(records.len(), 2);

    let m2 = records.iter().find(|r| r.match_id == "m2").unwrap();
    assert_eq!(m2.kills, 9);
    assert_eq!(m2.performance_score, None);
    assert_eq!(m2.session_id, None);
    assert_eq!(m2.with_tracked_friends, None);

    let m1 = records.iter().find(|r| r.match_id == "m1").unwrap();
    assert!(m1.performance_score.is_some());

    let single = source_b.load_match("m1")?.expect("Match not found");
    assert_eq!(single.deaths, 7);
    assert!(source_b.load_match("nope")?.is_none());

    Ok(())
}
