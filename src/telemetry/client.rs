//! HTTP implementation of the telemetry API.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::types::{EventEntry, MatchIdPage, MatchStats, SkillEntry};
use super::{TelemetryApi, TelemetryError};

/// Telemetry API client over HTTP with bearer authentication.
pub struct HttpTelemetryClient {
    /// HTTP client
    http: reqwest::Client,
    /// Base URL for the API
    base_url: String,
    /// API key for authentication
    api_key: String,
}

impl HttpTelemetryClient {
    /// Create a new client.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, TelemetryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Send a GET request and decode the JSON payload.
    async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, TelemetryError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TelemetryError::Timeout
                } else if e.is_connect() {
                    TelemetryError::Transient(e.to_string())
                } else {
                    TelemetryError::Api(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| TelemetryError::Decode(e.to_string()))
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(TelemetryError::Auth(format!("API returned status {}", status)))
        } else if status.as_u16() == 404 {
            Err(TelemetryError::NotFound(path.to_string()))
        } else if status.as_u16() == 429 {
            Err(TelemetryError::RateLimited)
        } else if status.is_server_error() {
            Err(TelemetryError::Transient(format!(
                "API returned status {}",
                status
            )))
        } else {
            Err(TelemetryError::Api(format!("API returned status {}", status)))
        }
    }
}

#[async_trait]
impl TelemetryApi for HttpTelemetryClient {
    async fn list_match_ids(
        &self,
        account_id: &str,
        cursor: Option<&str>,
    ) -> Result<MatchIdPage, TelemetryError> {
        let path = format!("/accounts/{}/matches", account_id);
        match cursor {
            Some(cursor) => self.get_json(&path, &[("cursor", cursor)]).await,
            None => self.get_json(&path, &[]).await,
        }
    }

    async fn get_match_stats(&self, match_id: &str) -> Result<MatchStats, TelemetryError> {
        self.get_json(&format!("/matches/{}/stats", match_id), &[])
            .await
    }

    async fn get_skill(
        &self,
        match_id: &str,
        account_ids: &[String],
    ) -> Result<Vec<SkillEntry>, TelemetryError> {
        let path = format!("/matches/{}/skill", match_id);
        if account_ids.is_empty() {
            self.get_json(&path, &[]).await
        } else {
            let accounts = account_ids.join(",");
            self.get_json(&path, &[("accounts", accounts.as_str())]).await
        }
    }

    async fn get_events(&self, match_id: &str) -> Result<Vec<EventEntry>, TelemetryError> {
        self.get_json(&format!("/matches/{}/events", match_id), &[])
            .await
    }
}
