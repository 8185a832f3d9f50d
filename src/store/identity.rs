use anyhow::Result;
use rusqlite::params;

use super::StatsDb;

impl StatsDb {
    /// Every user id that shares a username with the triggering user.
    ///
    /// The user id itself is always part of the result, first.
    pub async fn resolve_user_ids(&self, user_id: &str, user_name: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT m.user_id FROM user_mapping m \
             INNER JOIN ( \
                 SELECT DISTINCT username FROM user_mapping \
                 WHERE (username = ?1 OR username = ?2 OR user_id = ?2) \
                 AND username IS NOT NULL AND username != '' AND username != 'null' \
             ) AS x ON x.username = m.username \
             ORDER BY m.user_id",
        )?;
        let aliases = stmt
            .query_map(params![user_name, user_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut ids = vec![user_id.to_string()];
        ids.extend(aliases.into_iter().filter(|alias| alias != user_id));
        Ok(ids)
    }

    /// Maintained by the account service; exposed for tooling and tests.
    pub async fn add_user_mapping(&self, user_id: &str, username: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_mapping (user_id, username) VALUES (?1, ?2)",
            params![user_id, username],
        )?;
        Ok(())
    }
}
