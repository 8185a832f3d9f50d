//! SQLite persistence for match summaries, run stats and the best stat ledger.
//!
//! One connection behind an async mutex. Statements are short and the
//! ingestion path is sequential per batch, so a pool buys nothing here.

mod best_stats;
mod identity;
mod runs;
mod summaries;

pub use best_stats::BestStatWrite;
pub use runs::StoredRun;

use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::Mutex;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS replay_summary (
    review_id TEXT PRIMARY KEY,
    game_mode TEXT NOT NULL,
    replay_key TEXT NOT NULL,
    player_card_id TEXT,
    additional_result TEXT,
    user_id TEXT,
    user_name TEXT,
    final_comp TEXT,
    bgs_perfect_game INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS bgs_run_stats (
    review_id TEXT PRIMARY KEY,
    combat_winrate TEXT
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS bgs_single_run_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    review_id TEXT NOT NULL UNIQUE,
    json_stats TEXT NOT NULL,
    user_id TEXT,
    user_name TEXT,
    hero_card_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_single_run_stats_user
    ON bgs_single_run_stats(user_id, id DESC);

CREATE INDEX IF NOT EXISTS idx_single_run_stats_user_name
    ON bgs_single_run_stats(user_name, id DESC);

-- Perfect games are re-published under synthetic review ids.
CREATE TABLE IF NOT EXISTS bgs_perfect_game (
    review_id TEXT PRIMARY KEY,
    original_review_id TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS user_mapping (
    user_id TEXT NOT NULL,
    username TEXT
);

CREATE INDEX IF NOT EXISTS idx_user_mapping_username ON user_mapping(username);
CREATE INDEX IF NOT EXISTS idx_user_mapping_user_id ON user_mapping(user_id);

CREATE TABLE IF NOT EXISTS bgs_user_best_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    stat_name TEXT NOT NULL,
    value REAL NOT NULL,
    hero_card_id TEXT,
    last_update_date TEXT NOT NULL,
    review_id TEXT NOT NULL,
    UNIQUE (user_id, stat_name)
);
"#;

#[derive(Clone)]
pub struct StatsDb {
    conn: Arc<Mutex<Connection>>,
}

impl StatsDb {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let db = Self::init(conn)?;
        info!("📊 stats database ready at {}", db_path);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}
