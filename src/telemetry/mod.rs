//! Remote telemetry API abstraction.
//!
//! The sync and backfill engines consume the remote service exclusively
//! through [`TelemetryApi`], so tests and alternative transports can swap
//! the implementation.

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpTelemetryClient;
pub use types::{EventEntry, MatchIdPage, MatchStats, SkillEntry};

/// Typed failures of the remote telemetry API.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The resource no longer exists upstream. Recorded, never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote rejected the call for rate reasons. Retryable.
    #[error("Rate limited by remote API")]
    RateLimited,

    /// The call exceeded its timeout. Retryable.
    #[error("Request timed out")]
    Timeout,

    /// Connectivity or server-side trouble. Retryable.
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// Credentials were rejected. Fatal to the whole run.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The payload could not be decoded.
    #[error("Malformed payload: {0}")]
    Decode(String),

    /// Any other remote failure.
    #[error("Remote API error: {0}")]
    Api(String),
}

impl TelemetryError {
    /// Whether a bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TelemetryError::RateLimited | TelemetryError::Timeout | TelemetryError::Transient(_)
        )
    }

    /// Whether the error invalidates the whole run rather than one match.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TelemetryError::Auth(_))
    }
}

/// Remote telemetry API consumed by the sync engine.
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    /// Page an account's recent match ids, newest first.
    async fn list_match_ids(
        &self,
        account_id: &str,
        cursor: Option<&str>,
    ) -> Result<MatchIdPage, TelemetryError>;

    /// Fetch the full stats payload for a match: match core, roster
    /// statlines, and medal tallies.
    async fn get_match_stats(&self, match_id: &str) -> Result<MatchStats, TelemetryError>;

    /// Fetch per-player skill data for a match. An empty `account_ids`
    /// slice requests every participant.
    async fn get_skill(
        &self,
        match_id: &str,
        account_ids: &[String],
    ) -> Result<Vec<SkillEntry>, TelemetryError>;

    /// Fetch the full event log for a match.
    async fn get_events(&self, match_id: &str) -> Result<Vec<EventEntry>, TelemetryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TelemetryError::RateLimited.is_transient());
        assert!(TelemetryError::Timeout.is_transient());
        assert!(TelemetryError::Transient("503".to_string()).is_transient());
        assert!(!TelemetryError::NotFound("m1".to_string()).is_transient());
        assert!(!TelemetryError::Auth("bad token".to_string()).is_transient());
        assert!(TelemetryError::Auth("bad token".to_string()).is_fatal());
        assert!(!TelemetryError::RateLimited.is_fatal());
    }
}
