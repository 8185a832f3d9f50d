use anyhow::Result;
use futures_util::future::try_join_all;
use rusqlite::{params, params_from_iter, types::Value};
use tracing::{debug, warn};

use super::StatsDb;
use crate::models::BestStatRecord;
use crate::stats::{MergePlan, StatName};

/// One independent ledger statement.
#[derive(Debug, Clone, PartialEq)]
pub enum BestStatWrite {
    /// All new rows of one merge, inserted by a single statement.
    Insert(Vec<BestStatRecord>),
    Update(BestStatRecord),
}

impl BestStatWrite {
    pub fn from_plan(plan: MergePlan) -> Vec<BestStatWrite> {
        let mut writes = Vec::with_capacity(plan.updates.len() + 1);
        if !plan.creates.is_empty() {
            writes.push(BestStatWrite::Insert(plan.creates));
        }
        writes.extend(plan.updates.into_iter().map(BestStatWrite::Update));
        writes
    }
}

impl StatsDb {
    pub async fn best_stats_for_users(&self, user_ids: &[String]) -> Result<Vec<BestStatRecord>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; user_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, user_id, stat_name, value, hero_card_id, review_id, last_update_date \
             FROM bgs_user_best_stats WHERE user_id IN ({}) ORDER BY id ASC",
            placeholders
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(user_ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, user_id, stat_name, value, hero_card_id, review_id, last_update_date) in rows {
            let Ok(stat_name) = stat_name.parse::<StatName>() else {
                warn!(id, stat_name = %stat_name, "skipping ledger row with retired stat name");
                continue;
            };
            records.push(BestStatRecord {
                id: Some(id),
                user_id,
                stat_name,
                value,
                hero_card_id,
                review_id,
                last_update_date,
            });
        }
        Ok(records)
    }

    /// Execute one statement and return the number of rows it touched.
    pub async fn execute_best_stat_write(&self, write: &BestStatWrite) -> Result<usize> {
        let conn = self.conn.lock().await;
        let changed = match write {
            BestStatWrite::Insert(records) if records.is_empty() => 0,
            BestStatWrite::Insert(records) => {
                let rows = vec!["(?, ?, ?, ?, ?, ?)"; records.len()].join(",\n");
                let sql = format!(
                    "INSERT INTO bgs_user_best_stats \
                     (user_id, stat_name, value, hero_card_id, last_update_date, review_id) \
                     VALUES {}",
                    rows
                );
                let values = records.iter().flat_map(|r| {
                    [
                        Value::Text(r.user_id.clone()),
                        Value::Text(r.stat_name.as_str().to_string()),
                        Value::Real(r.value),
                        r.hero_card_id.clone().map_or(Value::Null, Value::Text),
                        Value::Text(r.last_update_date.clone()),
                        Value::Text(r.review_id.clone()),
                    ]
                });
                conn.execute(&sql, params_from_iter(values))?
            }
            BestStatWrite::Update(record) => {
                let Some(id) = record.id else {
                    anyhow::bail!("update of best stat {} without a ledger id", record.stat_name);
                };
                conn.execute(
                    "UPDATE bgs_user_best_stats \
                     SET value = ?1, hero_card_id = ?2, last_update_date = ?3, review_id = ?4 \
                     WHERE id = ?5",
                    params![
                        record.value,
                        record.hero_card_id,
                        record.last_update_date,
                        record.review_id,
                        id,
                    ],
                )?
            }
        };
        Ok(changed)
    }

    /// Dispatch every statement of a merge at once. Rows are keyed by stat
    /// name and independent, so no transaction spans them.
    pub async fn apply_merge_plan(&self, plan: MergePlan) -> Result<usize> {
        let writes = BestStatWrite::from_plan(plan);
        if writes.is_empty() {
            return Ok(0);
        }
        let counts = try_join_all(writes.iter().map(|w| self.execute_best_stat_write(w))).await?;
        let total = counts.into_iter().sum();
        debug!(statements = writes.len(), rows = total, "best stats written");
        Ok(total)
    }
}
