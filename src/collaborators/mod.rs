//! Seams to the systems this service reads from and notifies.
//!
//! Each collaborator is constructed once by the entry point and handed to
//! the `Ingestor`; nothing here holds process-wide state.

pub mod blob;
pub mod notify;
pub mod parser;

pub use blob::{FsBlobStore, HttpBlobStore};
pub use notify::{LogNotifier, WebhookNotifier};
pub use parser::CommandReplayParser;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::models::{MainPlayer, MatchSummary};
use crate::stats::StatisticsPayload;

/// Replay storage, addressed by the locator on the match summary.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when nothing is stored under `locator` (yet).
    async fn read(&self, locator: &str) -> Result<Option<String>>;
}

/// Everything the replay parser gets besides the replay itself.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseInput<'a> {
    pub replay: &'a str,
    pub main_player: Option<&'a MainPlayer>,
    pub battle_result_history: &'a [Value],
    pub face_offs: &'a [Value],
}

#[async_trait::async_trait]
pub trait ReplayParser: Send + Sync {
    /// `Ok(None)` when the replay cannot be turned into stats.
    async fn parse(&self, input: ParseInput<'_>) -> Result<Option<StatisticsPayload>>;
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_perfect_game(&self, summary: &MatchSummary) -> Result<()>;
}
