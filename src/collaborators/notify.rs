use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::NotificationSink;
use crate::models::MatchSummary;

/// Notification sink used when no webhook is configured.
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_perfect_game(&self, summary: &MatchSummary) -> Result<()> {
        info!(
            review_id = %summary.review_id,
            hero = ?summary.player_card_id,
            user = ?summary.user_name,
            "🏆 perfect game"
        );
        Ok(())
    }
}

/// Posts perfect games to an HTTP endpoint (topic fan-out lives behind it).
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify_perfect_game(&self, summary: &MatchSummary) -> Result<()> {
        let body = json!({
            "type": "bgs-perfect-game",
            "reviewId": summary.review_id,
            "summary": summary,
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.url))?
            .error_for_status()
            .context("perfect game webhook rejected notification")?;
        Ok(())
    }
}
