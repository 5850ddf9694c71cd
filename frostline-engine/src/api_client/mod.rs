//! Typed client for the engine's HTTP API.
//!
//! Used by the status CLI; the DTOs in [`types`] are shared with the
//! server so the contract lives in one place.

pub mod types;

use anyhow::{Context, Result};

use types::HealthState;

/// Default API base URL for a local engine.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7944";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the engine health snapshot.
    pub async fn get_health(&self) -> Result<HealthState> {
        let url = format!("{}/api/v0/health", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .context("health endpoint returned an error status")?;
        resp.json().await.context("malformed health response")
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
