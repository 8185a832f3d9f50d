use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stats::StatName;

pub const BATTLEGROUNDS_GAME_MODE: &str = "battlegrounds";

/// The main player as reported by the client alongside a finished match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainPlayer {
    pub card_id: String,
    #[serde(default)]
    pub highest_win_streak: Option<f64>,
    #[serde(default)]
    pub triple_history: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One match-completion request, as carried by a queue message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub review_id: String,
    #[serde(default)]
    pub hero_card_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub battle_result_history: Vec<Value>,
    #[serde(default)]
    pub main_player: Option<MainPlayer>,
    #[serde(default, alias = "oldMmr")]
    pub previous_rating: Option<f64>,
    #[serde(default, alias = "newMmr")]
    pub new_rating: Option<f64>,
    #[serde(default)]
    pub face_offs: Vec<Value>,
}

impl IngestionRequest {
    /// Hero the match was played with. The main player's card wins over the
    /// request-level hero when both are present.
    pub fn hero(&self) -> Option<&str> {
        self.main_player
            .as_ref()
            .map(|p| p.card_id.as_str())
            .filter(|id| !id.is_empty())
            .or(self.hero_card_id.as_deref())
    }

    pub fn main_player_card_id(&self) -> Option<&str> {
        self.main_player.as_ref().map(|p| p.card_id.as_str())
    }
}

/// Row of `replay_summary`, written by the replay upload step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub review_id: String,
    pub game_mode: String,
    pub replay_key: String,
    pub player_card_id: Option<String>,
    pub additional_result: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl MatchSummary {
    pub fn is_battlegrounds(&self) -> bool {
        self.game_mode == BATTLEGROUNDS_GAME_MODE
    }

    /// First place finish. The column is free text upstream ("1", "1.0", ...).
    pub fn is_first_place(&self) -> bool {
        self.additional_result
            .as_deref()
            .map(str::trim)
            .and_then(|raw| {
                raw.parse::<i64>()
                    .ok()
                    .or_else(|| raw.parse::<f64>().ok().map(|v| v.trunc() as i64))
            })
            == Some(1)
    }
}

/// One row of the per-user best stat ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestStatRecord {
    /// Present when the row already exists in the ledger.
    pub id: Option<i64>,
    pub user_id: String,
    pub stat_name: StatName,
    pub value: f64,
    pub hero_card_id: Option<String>,
    pub review_id: String,
    pub last_update_date: String,
}

/// Row of `bgs_single_run_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRunRecord {
    pub review_id: String,
    pub json_stats: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub hero_card_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub hero_card_id: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub blob_root: Option<String>,
    pub blob_base_url: Option<String>,
    pub parser_command: Option<String>,
    pub perfect_game_webhook_url: Option<String>,
    pub ingest_batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./bgstats.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let ingest_batch_size = std::env::var("INGEST_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(10);

        Ok(Self {
            database_path,
            port,
            blob_root: non_empty_var("REPLAY_BLOB_ROOT"),
            blob_base_url: non_empty_var("REPLAY_BLOB_BASE_URL"),
            parser_command: non_empty_var("REPLAY_PARSER_CMD"),
            perfect_game_webhook_url: non_empty_var("PERFECT_GAME_WEBHOOK_URL"),
            ingest_batch_size,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(additional_result: Option<&str>) -> MatchSummary {
        MatchSummary {
            review_id: "r".to_string(),
            game_mode: "battlegrounds".to_string(),
            replay_key: "k".to_string(),
            player_card_id: None,
            additional_result: additional_result.map(str::to_string),
            user_id: None,
            user_name: None,
        }
    }

    #[test]
    fn test_first_place_parsing() {
        assert!(summary(Some("1")).is_first_place());
        assert!(summary(Some(" 1.0 ")).is_first_place());
        assert!(!summary(Some("2")).is_first_place());
        assert!(!summary(Some("")).is_first_place());
        assert!(!summary(None).is_first_place());
    }

    #[test]
    fn test_request_accepts_legacy_rating_names() {
        let req: IngestionRequest = serde_json::from_str(
            r#"{"reviewId":"R1","heroCardId":"H1","oldMmr":6000,"newMmr":6120}"#,
        )
        .unwrap();
        assert_eq!(req.previous_rating, Some(6000.0));
        assert_eq!(req.new_rating, Some(6120.0));
        assert_eq!(req.hero(), Some("H1"));
    }

    #[test]
    fn test_hero_prefers_main_player_card() {
        let req = IngestionRequest {
            hero_card_id: Some("H1".to_string()),
            main_player: Some(MainPlayer {
                card_id: "H2".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(req.hero(), Some("H2"));
    }
}
