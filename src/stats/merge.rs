//! Reconciles one match's stats against a user's stored best values.

use tracing::debug;

use super::extractors::StatName;
use super::payload::StatisticsPayload;
use crate::models::{BestStatRecord, IngestionRequest};

/// Writes produced by one merge. Records in `updates` carry their ledger id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub creates: Vec<BestStatRecord>,
    pub updates: Vec<BestStatRecord>,
}

impl MergePlan {
    pub fn from_records(records: Vec<BestStatRecord>) -> Self {
        let (updates, creates) = records.into_iter().partition(|r| r.id.is_some());
        Self { creates, updates }
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len()
    }
}

/// A candidate replaces the stored best only when it is a real, non-zero
/// number strictly above it. Ties keep the older record.
pub fn improves_on(candidate: f64, existing: Option<f64>) -> bool {
    candidate.is_finite() && candidate != 0.0 && existing.map_or(true, |best| candidate > best)
}

/// Upserts for every stat this match improved. `existing` holds the ledger
/// rows of the user and all of its aliases.
pub fn merge(
    existing: &[BestStatRecord],
    stats: &StatisticsPayload,
    request: &IngestionRequest,
    user_id: &str,
    as_of: &str,
) -> Vec<BestStatRecord> {
    StatName::ALL
        .into_iter()
        .filter_map(|stat_name| {
            let candidate = stat_name.extract(stats, request);
            let current = existing.iter().find(|r| r.stat_name == stat_name);
            if !improves_on(candidate, current.map(|r| r.value)) {
                if !candidate.is_finite() {
                    debug!(review_id = %request.review_id, stat = %stat_name, candidate, "discarding non-finite stat");
                }
                return None;
            }
            Some(BestStatRecord {
                id: current.and_then(|r| r.id),
                user_id: user_id.to_string(),
                stat_name,
                value: candidate,
                hero_card_id: request.hero().map(str::to_string),
                review_id: request.review_id.clone(),
                last_update_date: as_of.to_string(),
            })
        })
        .collect()
}
