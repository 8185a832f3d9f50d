use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

use super::StatsDb;
use crate::models::PersistedRunRecord;

/// A `bgs_single_run_stats` row as read back for retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: i64,
    pub review_id: String,
    pub json_stats: String,
}

impl StoredRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            review_id: row.get(1)?,
            json_stats: row.get(2)?,
        })
    }
}

impl StatsDb {
    /// Insert-or-ignore on review id. Returns whether a row was written.
    pub async fn insert_run_record(&self, record: &PersistedRunRecord) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changes = conn.execute(
            "INSERT OR IGNORE INTO bgs_single_run_stats \
             (review_id, json_stats, user_id, user_name, hero_card_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.review_id,
                record.json_stats,
                record.user_id,
                record.user_name,
                record.hero_card_id,
            ],
        )?;
        Ok(changes > 0)
    }

    pub async fn runs_for_review(&self, review_id: &str) -> Result<Vec<StoredRun>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, review_id, json_stats FROM bgs_single_run_stats WHERE review_id = ?1",
        )?;
        let rows = stmt.query_map(params![review_id], StoredRun::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Runs owned by `user_id` (or recorded under `user_name`), newest first.
    pub async fn runs_for_user(
        &self,
        user_id: &str,
        user_name: Option<&str>,
        hero_card_id: Option<&str>,
    ) -> Result<Vec<StoredRun>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, review_id, json_stats FROM bgs_single_run_stats \
             WHERE (user_id = ?1 OR (?2 IS NOT NULL AND user_name = ?2)) \
             AND (?3 IS NULL OR hero_card_id = ?3) \
             ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![user_id, user_name, hero_card_id], StoredRun::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Original review id behind a perfect-game alias.
    pub async fn perfect_game_original(&self, review_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let original = conn
            .query_row(
                "SELECT original_review_id FROM bgs_perfect_game WHERE review_id = ?1",
                params![review_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(original)
    }

    pub async fn add_perfect_game_alias(&self, review_id: &str, original_review_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO bgs_perfect_game (review_id, original_review_id) VALUES (?1, ?2)",
            params![review_id, original_review_id],
        )?;
        Ok(())
    }
}
