//! Alert batch delivery to the downstream webhook.

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::alert::Alert;
use crate::error::{Error, Result};

/// Thin client over the alert webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    url: String,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// POST a batch. Non-2xx counts as failure so the drain task re-queues.
    pub async fn post_alerts(&self, alerts: &[Alert]) -> Result<()> {
        let body = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "total_alertas": alerts.len(),
            "is_batched": true,
            "alertas": alerts,
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Webhook(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Webhook(format!("webhook returned {status}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Priority;

    #[test]
    fn alert_batch_body_shape() {
        let alert = Alert::system("GW", "GATEWAY OFFLINE há 15 min".into(), "t".into());
        let body = json!({
            "timestamp": "2025-06-02T12:00:00Z",
            "total_alertas": 1,
            "is_batched": true,
            "alertas": [alert],
        });

        assert_eq!(body["total_alertas"], 1);
        assert_eq!(body["is_batched"], true);
        assert_eq!(body["alertas"][0]["priority"], Priority::Sistema.as_str());
        assert_eq!(body["alertas"][0]["sensor_mac"], "GW");
    }
}
