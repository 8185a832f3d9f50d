//! Read path for stored run stats.
//!
//! A request either names one review, or a user (optionally OR'd with a
//! display name) plus an optional hero filter. The result is a JSON array of
//! `{reviewId, stats}` shipped gzip-compressed.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::codec::{self, Decoded};
use crate::models::RetrievalRequest;
use crate::store::{StatsDb, StoredRun};

/// Rows holding a longer blob are never returned.
pub const MAX_RETRIEVABLE_LENGTH: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedRun {
    pub review_id: String,
    pub stats: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Found(Vec<RetrievedRun>),
    /// A single-review lookup missed, redirect table included.
    NotFound,
}

pub struct RetrievalService {
    db: Arc<StatsDb>,
}

impl RetrievalService {
    pub fn new(db: Arc<StatsDb>) -> Self {
        Self { db }
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Retrieval> {
        match request.review_id.as_deref().filter(|id| !id.is_empty()) {
            Some(review_id) => self.retrieve_review(review_id).await,
            None => self.retrieve_user_runs(request).await.map(Retrieval::Found),
        }
    }

    async fn retrieve_review(&self, review_id: &str) -> Result<Retrieval> {
        let mut rows = self.db.runs_for_review(review_id).await?;
        if rows.is_empty() {
            let Some(original) = self.db.perfect_game_original(review_id).await? else {
                error!(review_id, "no post match stats for review");
                return Ok(Retrieval::NotFound);
            };
            debug!(review_id, original = %original, "following perfect game redirect");
            rows = self.db.runs_for_review(&original).await?;
        }
        Ok(Retrieval::Found(decode_rows(rows)))
    }

    async fn retrieve_user_runs(&self, request: &RetrievalRequest) -> Result<Vec<RetrievedRun>> {
        let Some(user_id) = request.user_id.as_deref() else {
            warn!("retrieval request names neither a review nor a user");
            return Ok(Vec::new());
        };
        let user_name = request.user_name.as_deref().filter(|name| !name.is_empty());
        let hero = request.hero_card_id.as_deref().filter(|hero| !hero.is_empty());
        let rows = self.db.runs_for_user(user_id, user_name, hero).await?;
        Ok(decode_rows(rows))
    }
}

/// Drop oversized and undecodable rows, keeping the store's order.
pub fn decode_rows(rows: Vec<StoredRun>) -> Vec<RetrievedRun> {
    rows.into_iter()
        .filter(|row| !row.json_stats.is_empty())
        .filter(|row| {
            let fits = row.json_stats.chars().count() <= MAX_RETRIEVABLE_LENGTH;
            if !fits {
                debug!(review_id = %row.review_id, "skipping oversized run stats");
            }
            fits
        })
        .filter_map(|row| match codec::decode::<Value>(&row.json_stats) {
            Decoded::Ok { value, .. } => Some(RetrievedRun {
                review_id: row.review_id,
                stats: value,
            }),
            Decoded::Unparseable => {
                warn!(review_id = %row.review_id, run_id = row.id, "dropping undecodable run stats");
                None
            }
        })
        .collect()
}

pub fn gzip_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value).context("Failed to serialize retrieval result")?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    encoder.finish().context("Failed to gzip retrieval result")
}

/// Status plus gzip body, ready for either the HTTP route or the
/// base64 envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResponse {
    pub status: u16,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_base64_encoded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<EnvelopeHeaders>,
}

#[derive(Debug, Serialize)]
pub struct EnvelopeHeaders {
    #[serde(rename = "Content-Type")]
    pub content_type: &'static str,
    #[serde(rename = "Content-Encoding")]
    pub content_encoding: &'static str,
}

impl RetrievalResponse {
    pub const CONTENT_TYPE: &'static str = "text/html";
    pub const CONTENT_ENCODING: &'static str = "gzip";

    pub fn from_retrieval(retrieval: &Retrieval) -> Result<Self> {
        match retrieval {
            Retrieval::Found(runs) => Ok(Self {
                status: 200,
                body: Some(gzip_json(runs)?),
            }),
            Retrieval::NotFound => Ok(Self::not_found()),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: None,
        }
    }

    pub fn envelope(&self) -> Envelope {
        match &self.body {
            Some(body) => Envelope {
                status_code: self.status,
                is_base64_encoded: Some(true),
                body: Some(STANDARD.encode(body)),
                headers: Some(EnvelopeHeaders {
                    content_type: Self::CONTENT_TYPE,
                    content_encoding: Self::CONTENT_ENCODING,
                }),
            },
            None => Envelope {
                status_code: self.status,
                is_base64_encoded: None,
                body: None,
                headers: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    fn row(id: i64, review_id: &str, json_stats: String) -> StoredRun {
        StoredRun {
            id,
            review_id: review_id.to_string(),
            json_stats,
        }
    }

    fn gunzip(bytes: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_decode_rows_filters_and_keeps_order() {
        let compressed = codec::encode(&json!({"luckFactor": 2.0})).unwrap();
        let rows = vec![
            row(4, "R4", compressed),
            row(3, "R3", "x".repeat(MAX_RETRIEVABLE_LENGTH + 1)),
            row(2, "R2", "not a payload".to_string()),
            row(1, "R1", r#"{"luckFactor": 1}"#.to_string()),
            row(0, "R0", String::new()),
        ];
        let runs = decode_rows(rows);
        assert_eq!(
            runs,
            vec![
                RetrievedRun {
                    review_id: "R4".to_string(),
                    stats: json!({"luckFactor": 2.0}),
                },
                RetrievedRun {
                    review_id: "R1".to_string(),
                    stats: json!({"luckFactor": 1}),
                },
            ]
        );
    }

    #[test]
    fn test_length_limit_is_inclusive() {
        // a JSON string literal padded to exactly the limit
        let padded = format!("\"{}\"", "a".repeat(MAX_RETRIEVABLE_LENGTH - 2));
        assert_eq!(decode_rows(vec![row(1, "R1", padded)]).len(), 1);
    }

    #[test]
    fn test_found_response_envelope() {
        let retrieval = Retrieval::Found(vec![RetrievedRun {
            review_id: "R1".to_string(),
            stats: json!({"rerolls": 3}),
        }]);
        let response = RetrievalResponse::from_retrieval(&retrieval).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            gunzip(response.body.as_deref().unwrap()),
            r#"[{"reviewId":"R1","stats":{"rerolls":3}}]"#
        );

        let envelope = serde_json::to_value(response.envelope()).unwrap();
        assert_eq!(envelope["statusCode"], 200);
        assert_eq!(envelope["isBase64Encoded"], true);
        assert_eq!(envelope["headers"]["Content-Encoding"], "gzip");
        assert_eq!(envelope["headers"]["Content-Type"], "text/html");
        let body = STANDARD
            .decode(envelope["body"].as_str().unwrap())
            .unwrap();
        assert_eq!(gunzip(&body), r#"[{"reviewId":"R1","stats":{"rerolls":3}}]"#);
    }

    #[test]
    fn test_not_found_envelope_has_only_status() {
        let envelope = serde_json::to_string(&RetrievalResponse::not_found().envelope()).unwrap();
        assert_eq!(envelope, r#"{"statusCode":404}"#);
    }

    #[tokio::test]
    async fn test_single_review_falls_back_to_perfect_game_redirect() {
        let db = Arc::new(StatsDb::open_in_memory().unwrap());
        db.insert_run_record(&crate::models::PersistedRunRecord {
            review_id: "R1".to_string(),
            json_stats: codec::encode(&json!({"luckFactor": 0.25})).unwrap(),
            user_id: Some("U1".to_string()),
            user_name: None,
            hero_card_id: Some("H1".to_string()),
        })
        .await
        .unwrap();
        db.add_perfect_game_alias("PG1", "R1").await.unwrap();

        let service = RetrievalService::new(db);
        let by_alias = RetrievalRequest {
            review_id: Some("PG1".to_string()),
            ..Default::default()
        };
        match service.retrieve(&by_alias).await.unwrap() {
            Retrieval::Found(runs) => {
                assert_eq!(runs.len(), 1);
                assert_eq!(runs[0].review_id, "R1");
                assert_eq!(runs[0].stats, json!({"luckFactor": 0.25}));
            }
            Retrieval::NotFound => panic!("redirect not followed"),
        }

        let missing = RetrievalRequest {
            review_id: Some("nope".to_string()),
            ..Default::default()
        };
        assert_eq!(service.retrieve(&missing).await.unwrap(), Retrieval::NotFound);
    }
}
