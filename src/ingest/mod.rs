//! Match-completion ingestion.
//!
//! One event walks: summary → replay → parse → persist run stats → merge
//! best stats → enrich the summary. Any missing precondition ends the event
//! quietly; only infrastructure faults surface as errors, and those fail the
//! whole batch so the queue redelivers it.

pub mod side_effects;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::codec::{self, MAX_RUN_STATS_LENGTH};
use crate::collaborators::{
    BlobStore, CommandReplayParser, FsBlobStore, HttpBlobStore, LogNotifier, NotificationSink,
    ParseInput, ReplayParser, WebhookNotifier,
};
use crate::loader::{load_with_retry, Loaded, RetryPolicy, MIN_REPLAY_LENGTH};
use crate::models::{Config, IngestionRequest, MatchSummary, PersistedRunRecord};
use crate::stats::{MergePlan, StatisticsPayload};
use crate::store::StatsDb;

use side_effects::{combat_winrates, is_perfect_game};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub summary_retry: RetryPolicy,
    pub replay_retry: RetryPolicy,
    pub min_replay_length: usize,
    pub max_run_stats_length: usize,
    pub perfect_game_min_turns: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            summary_retry: RetryPolicy::SUMMARY_ROW,
            replay_retry: RetryPolicy::REPLAY_BLOB,
            min_replay_length: MIN_REPLAY_LENGTH,
            max_run_stats_length: MAX_RUN_STATS_LENGTH,
            perfect_game_min_turns: 8,
        }
    }
}

/// Why an event was dropped without being ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    SummaryNotFound,
    NotBattlegrounds { game_mode: String },
    ReplayNotFound,
    Unparseable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub review_id: String,
    /// False when the run was already stored by an earlier delivery.
    pub run_inserted: bool,
    pub best_stats_written: usize,
    pub perfect_game: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested(IngestReport),
    Abandoned(AbandonReason),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub received: usize,
    pub ingested: usize,
    pub abandoned: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageBody {
    Many(Vec<Option<IngestionRequest>>),
    One(Option<IngestionRequest>),
}

/// Flatten queue message bodies into requests. A body holds either one
/// request or an array of them; `null` entries are skipped.
pub fn parse_message_batch(bodies: &[String]) -> Result<Vec<IngestionRequest>> {
    let mut requests = Vec::new();
    for (index, body) in bodies.iter().enumerate() {
        let parsed: MessageBody = serde_json::from_str(body)
            .with_context(|| format!("message {} is not an ingestion request", index))?;
        match parsed {
            MessageBody::Many(items) => requests.extend(items.into_iter().flatten()),
            MessageBody::One(item) => requests.extend(item),
        }
    }
    Ok(requests)
}

/// Ledger timestamp format: `2024-05-01 10:00:00.123`.
pub fn creation_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

pub struct Ingestor {
    db: Arc<StatsDb>,
    blobs: Arc<dyn BlobStore>,
    parser: Arc<dyn ReplayParser>,
    notifier: Arc<dyn NotificationSink>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        db: Arc<StatsDb>,
        blobs: Arc<dyn BlobStore>,
        parser: Arc<dyn ReplayParser>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            db,
            blobs,
            parser,
            notifier,
            config: IngestConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// Wire up the collaborators named by the environment.
    pub fn from_config(config: &Config, db: Arc<StatsDb>) -> Result<Self> {
        let blobs: Arc<dyn BlobStore> = match (&config.blob_base_url, &config.blob_root) {
            (Some(url), _) => Arc::new(HttpBlobStore::new(url)?),
            (None, Some(root)) => Arc::new(FsBlobStore::new(root)),
            (None, None) => {
                anyhow::bail!("set REPLAY_BLOB_BASE_URL or REPLAY_BLOB_ROOT to locate replays")
            }
        };
        let command = config
            .parser_command
            .as_deref()
            .context("set REPLAY_PARSER_CMD to the replay parser command line")?;
        let parser = Arc::new(CommandReplayParser::from_command_line(command)?);
        let notifier: Arc<dyn NotificationSink> = match &config.perfect_game_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url)?),
            None => Arc::new(LogNotifier),
        };
        Ok(Self::new(db, blobs, parser, notifier))
    }

    pub async fn process_batch(&self, bodies: &[String]) -> Result<BatchSummary> {
        let requests = parse_message_batch(bodies)?;
        self.process_requests(&requests).await
    }

    /// Events run one after another: two events of the same user must not
    /// merge against the same ledger snapshot.
    pub async fn process_requests(&self, requests: &[IngestionRequest]) -> Result<BatchSummary> {
        let mut summary = BatchSummary {
            received: requests.len(),
            ..Default::default()
        };
        for request in requests {
            match self.process_event(request).await? {
                IngestOutcome::Ingested(_) => summary.ingested += 1,
                IngestOutcome::Abandoned(_) => summary.abandoned += 1,
            }
        }
        Ok(summary)
    }

    pub async fn process_event(&self, request: &IngestionRequest) -> Result<IngestOutcome> {
        let review_id = request.review_id.as_str();
        info!(review_id, "processing review");

        let db = self.db.as_ref();
        let summary = match load_with_retry(
            review_id,
            self.config.summary_retry,
            move || db.find_match_summary(review_id),
            |_| true,
        )
        .await?
        {
            Loaded::Found(summary) => summary,
            Loaded::NotFound { attempts } => {
                // the event raced ahead of the summary write; acknowledge and move on
                error!(review_id, attempts, "could not load review");
                return Ok(IngestOutcome::Abandoned(AbandonReason::SummaryNotFound));
            }
        };

        if !summary.is_battlegrounds() {
            info!(review_id, game_mode = %summary.game_mode, "ignoring non-battlegrounds review");
            return Ok(IngestOutcome::Abandoned(AbandonReason::NotBattlegrounds {
                game_mode: summary.game_mode,
            }));
        }

        let blobs = self.blobs.as_ref();
        let replay_key = summary.replay_key.as_str();
        let min_length = self.config.min_replay_length;
        let replay = match load_with_retry(
            replay_key,
            self.config.replay_retry,
            move || blobs.read(replay_key),
            |body: &String| body.len() >= min_length,
        )
        .await?
        {
            Loaded::Found(replay) => replay,
            Loaded::NotFound { .. } => {
                error!(review_id, replay_key, "could not load replay");
                return Ok(IngestOutcome::Abandoned(AbandonReason::ReplayNotFound));
            }
        };
        debug!(review_id, length = replay.len(), "loaded replay");

        let parsed = self
            .parser
            .parse(ParseInput {
                replay: &replay,
                main_player: request.main_player.as_ref(),
                battle_result_history: &request.battle_result_history,
                face_offs: &request.face_offs,
            })
            .await?;
        let Some(stats) = parsed else {
            error!(review_id, "could not parse post-match stats");
            return Ok(IngestOutcome::Abandoned(AbandonReason::Unparseable));
        };
        let stats = stats.with_ratings(request.previous_rating, request.new_rating);

        let json_stats = codec::compress_payload(&stats, self.config.max_run_stats_length)?;
        let run_inserted = self
            .db
            .insert_run_record(&PersistedRunRecord {
                review_id: request.review_id.clone(),
                json_stats,
                user_id: request.user_id.clone(),
                user_name: request.user_name.clone(),
                hero_card_id: request.hero_card_id.clone(),
            })
            .await?;
        if !run_inserted {
            debug!(review_id, "run stats already stored");
        }

        let best_stats_written = match request.user_id.as_deref().filter(|id| !id.is_empty()) {
            Some(user_id) => self.merge_best_stats(request, user_id, &stats).await?,
            None => 0,
        };

        let (board, perfect_game, winrates) = tokio::join!(
            self.persist_final_board(review_id, &stats),
            self.record_perfect_game(&summary, &stats),
            self.persist_combat_winrates(review_id, &stats),
        );
        for (effect, result) in [
            ("final board", board.as_ref().err()),
            ("perfect game", perfect_game.as_ref().err()),
            ("combat winrates", winrates.as_ref().err()),
        ] {
            if let Some(e) = result {
                error!(review_id, effect, error = %e, "summary enrichment failed");
            }
        }
        board?;
        winrates?;
        let perfect_game = perfect_game?;

        Ok(IngestOutcome::Ingested(IngestReport {
            review_id: request.review_id.clone(),
            run_inserted,
            best_stats_written,
            perfect_game,
        }))
    }

    async fn merge_best_stats(
        &self,
        request: &IngestionRequest,
        user_id: &str,
        stats: &StatisticsPayload,
    ) -> Result<usize> {
        let user_ids = self
            .db
            .resolve_user_ids(user_id, request.user_name.as_deref())
            .await?;
        let existing = self.db.best_stats_for_users(&user_ids).await?;

        let as_of = creation_date(Utc::now());
        let plan = MergePlan::from_records(crate::stats::merge(&existing, stats, request, user_id, &as_of));
        debug!(
            review_id = %request.review_id,
            aliases = user_ids.len(),
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            "merged best stats"
        );
        let upserts = plan.len();
        self.db.apply_merge_plan(plan).await?;
        Ok(upserts)
    }

    async fn persist_final_board(&self, review_id: &str, stats: &StatisticsPayload) -> Result<()> {
        let Some(board) = stats.final_board() else {
            return Ok(());
        };
        let compressed = codec::encode(board)?;
        if self.db.set_final_board(review_id, &compressed).await? == 0 {
            debug!(review_id, "no summary row for final board");
        }
        Ok(())
    }

    async fn record_perfect_game(&self, summary: &MatchSummary, stats: &StatisticsPayload) -> Result<bool> {
        if !is_perfect_game(summary, stats, self.config.perfect_game_min_turns) {
            return Ok(false);
        }
        info!(review_id = %summary.review_id, "perfect game");
        if let Err(e) = self.notifier.notify_perfect_game(summary).await {
            warn!(review_id = %summary.review_id, error = %e, "perfect game notification failed");
        }
        if self.db.flag_perfect_game(&summary.review_id).await? == 0 {
            debug!(review_id = %summary.review_id, "no summary row to flag");
        }
        Ok(true)
    }

    async fn persist_combat_winrates(&self, review_id: &str, stats: &StatisticsPayload) -> Result<()> {
        let winrates = combat_winrates(stats);
        if winrates.is_empty() {
            debug!(review_id, "no combat winrates");
            return Ok(());
        }
        let json = serde_json::to_string(&winrates)?;
        self.db.set_combat_winrate(review_id, &json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_message_bodies_flatten() {
        let bodies = vec![
            r#"[{"reviewId":"R1"},null,{"reviewId":"R2","userId":"U1"}]"#.to_string(),
            r#"{"reviewId":"R3"}"#.to_string(),
            "null".to_string(),
            "[]".to_string(),
        ];
        let requests = parse_message_batch(&bodies).unwrap();
        let ids: Vec<&str> = requests.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, ["R1", "R2", "R3"]);
        assert_eq!(requests[1].user_id.as_deref(), Some("U1"));
    }

    #[test]
    fn test_malformed_body_fails_the_batch() {
        assert!(parse_message_batch(&["{not json".to_string()]).is_err());
    }

    #[test]
    fn test_creation_date_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 7).unwrap()
            + chrono::Duration::milliseconds(45);
        assert_eq!(creation_date(now), "2024-05-01 10:00:07.045");
    }
}
