use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::StatsDb;
use crate::models::MatchSummary;

impl StatsDb {
    pub async fn find_match_summary(&self, review_id: &str) -> Result<Option<MatchSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT review_id, game_mode, replay_key, player_card_id, additional_result, user_id, user_name \
             FROM replay_summary WHERE review_id = ?1",
        )?;
        let summary = stmt
            .query_row(params![review_id], |row| {
                Ok(MatchSummary {
                    review_id: row.get(0)?,
                    game_mode: row.get(1)?,
                    replay_key: row.get(2)?,
                    player_card_id: row.get(3)?,
                    additional_result: row.get(4)?,
                    user_id: row.get(5)?,
                    user_name: row.get(6)?,
                })
            })
            .optional()?;
        Ok(summary)
    }

    /// Written by the replay upload step; exposed for tooling and tests.
    pub async fn upsert_match_summary(&self, summary: &MatchSummary) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO replay_summary \
             (review_id, game_mode, replay_key, player_card_id, additional_result, user_id, user_name) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(review_id) DO UPDATE SET \
             game_mode = excluded.game_mode, replay_key = excluded.replay_key, \
             player_card_id = excluded.player_card_id, additional_result = excluded.additional_result, \
             user_id = excluded.user_id, user_name = excluded.user_name",
            params![
                summary.review_id,
                summary.game_mode,
                summary.replay_key,
                summary.player_card_id,
                summary.additional_result,
                summary.user_id,
                summary.user_name,
            ],
        )?;
        Ok(())
    }

    pub async fn set_final_board(&self, review_id: &str, compressed_board: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE replay_summary SET final_comp = ?1 WHERE review_id = ?2",
            params![compressed_board, review_id],
        )?;
        Ok(changed)
    }

    pub async fn flag_perfect_game(&self, review_id: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE replay_summary SET bgs_perfect_game = 1 WHERE review_id = ?1",
            params![review_id],
        )?;
        Ok(changed)
    }

    /// Upsert: the `bgs_run_stats` row may not exist yet for a fresh review.
    pub async fn set_combat_winrate(&self, review_id: &str, winrates_json: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT INTO bgs_run_stats (review_id, combat_winrate) VALUES (?1, ?2) \
             ON CONFLICT(review_id) DO UPDATE SET combat_winrate = excluded.combat_winrate",
            params![review_id, winrates_json],
        )?;
        Ok(changed)
    }

    /// `(final_comp, bgs_perfect_game, combat_winrate)` for a review.
    pub async fn match_enrichment(
        &self,
        review_id: &str,
    ) -> Result<Option<(Option<String>, bool, Option<String>)>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT s.final_comp, s.bgs_perfect_game, r.combat_winrate \
                 FROM replay_summary s LEFT JOIN bgs_run_stats r ON r.review_id = s.review_id \
                 WHERE s.review_id = ?1",
                params![review_id],
                |row| {
                    let perfect: i64 = row.get(1)?;
                    Ok((row.get(0)?, perfect != 0, row.get(2)?))
                },
            )
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> MatchSummary {
        MatchSummary {
            review_id: "R1".to_string(),
            game_mode: "battlegrounds".to_string(),
            replay_key: "2024/05/R1.xml.zip".to_string(),
            player_card_id: Some("H1".to_string()),
            additional_result: Some("1".to_string()),
            user_id: Some("U1".to_string()),
            user_name: Some("daedin".to_string()),
        }
    }

    #[tokio::test]
    async fn test_summary_round_trip_and_enrichment() {
        let db = StatsDb::open_in_memory().unwrap();
        assert!(db.find_match_summary("R1").await.unwrap().is_none());

        db.upsert_match_summary(&summary()).await.unwrap();
        assert_eq!(db.find_match_summary("R1").await.unwrap(), Some(summary()));

        assert_eq!(db.set_final_board("R1", "eJy=").await.unwrap(), 1);
        assert_eq!(db.flag_perfect_game("R1").await.unwrap(), 1);
        assert_eq!(db.set_combat_winrate("R1", "[]").await.unwrap(), 1);
        assert_eq!(db.flag_perfect_game("missing").await.unwrap(), 0);

        let (board, perfect, winrate) = db.match_enrichment("R1").await.unwrap().unwrap();
        assert_eq!(board.as_deref(), Some("eJy="));
        assert!(perfect);
        assert_eq!(winrate.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_combat_winrate_creates_missing_run_stats_row() {
        let db = StatsDb::open_in_memory().unwrap();
        db.upsert_match_summary(&summary()).await.unwrap();
        let (_, _, winrate) = db.match_enrichment("R1").await.unwrap().unwrap();
        assert_eq!(winrate, None);

        assert_eq!(db.set_combat_winrate("R1", r#"[{"turn":1,"winrate":50.0}]"#).await.unwrap(), 1);
        assert_eq!(db.set_combat_winrate("R1", "[]").await.unwrap(), 1);
        let (_, _, winrate) = db.match_enrichment("R1").await.unwrap().unwrap();
        assert_eq!(winrate.as_deref(), Some("[]"));
    }
}
