//! Percentile performance scoring and session grouping.
//!
//! The score of a match is the percentile rank of its statline metric among
//! all of the account's matches at or before it, inclusive. Ties on start
//! time are broken by match id, so the inline per-match computation and the
//! deferred single-pass computation agree exactly.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::storage::types::HistoryPoint;

/// Percentile rank of `metric` among `metrics_through`, which must already
/// include the scored match itself.
pub fn percentile_score(metrics_through: &[f64], metric: f64) -> f64 {
    if metrics_through.is_empty() {
        return 100.0;
    }

    let at_or_below = metrics_through.iter().filter(|m| **m <= metric).count();
    100.0 * at_or_below as f64 / metrics_through.len() as f64
}

/// Compute every score of a chronological history in one pass.
///
/// Sorts by `(start_time, match_id)` and maintains a running ordered list of
/// metrics, so the whole history costs O(n log n) instead of the quadratic
/// cost of scoring each match against a re-read prefix.
pub fn deferred_scores(mut history: Vec<HistoryPoint>) -> Vec<(String, f64)> {
    history.sort_by(|a, b| {
        (a.start_time, a.match_id.as_str()).cmp(&(b.start_time, b.match_id.as_str()))
    });

    let mut ordered: Vec<f64> = Vec::with_capacity(history.len());
    let mut scores = Vec::with_capacity(history.len());

    for point in history {
        let idx = ordered.partition_point(|m| *m <= point.metric);
        ordered.insert(idx, point.metric);
        let score = 100.0 * (idx + 1) as f64 / ordered.len() as f64;
        scores.push((point.match_id, score));
    }

    scores
}

/// Assign a session id for a match starting at `start_time`.
///
/// The match joins the previous session when it starts within `gap` of the
/// previous match's end; otherwise it opens a fresh session.
pub fn assign_session(
    previous: Option<(DateTime<Utc>, Option<String>)>,
    start_time: DateTime<Utc>,
    gap: Duration,
) -> String {
    if let Some((prev_end, Some(prev_session))) = previous {
        if start_time - prev_end <= gap {
            return prev_session;
        }
    }

    Uuid::new_v4().to_string()
}
