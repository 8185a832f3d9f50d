//! Ingest Batch Binary
//!
//! Processes queue message bodies as one batch and prints a JSON summary.
//! Each file holds one message body: a request object or an array of them.
//!
//! Usage:
//!   ingest_batch --blob-root ./replays --parser-cmd "node dist/parse.js" msg1.json msg2.json
//!   cat msg.json | ingest_batch -
//!
//! Environment:
//!   DATABASE_PATH - SQLite file (default: ./bgstats.db)
//!   REPLAY_BLOB_ROOT / REPLAY_BLOB_BASE_URL - Where replays live
//!   REPLAY_PARSER_CMD - Replay parser command line
//!   PERFECT_GAME_WEBHOOK_URL - Perfect game notifications (optional)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use bgstats_backend::{ingest::Ingestor, models::Config, store::StatsDb};

#[derive(Parser, Debug)]
#[command(name = "ingest_batch")]
#[command(about = "Run one batch of post-match ingestion requests")]
struct Args {
    /// Message body files (`-` reads stdin)
    #[arg(required = true)]
    messages: Vec<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "./bgstats.db")]
    database_path: String,

    /// Local directory holding replays
    #[arg(long, env = "REPLAY_BLOB_ROOT")]
    blob_root: Option<String>,

    /// Base URL replays are served from
    #[arg(long, env = "REPLAY_BLOB_BASE_URL")]
    blob_base_url: Option<String>,

    /// Replay parser command line
    #[arg(long, env = "REPLAY_PARSER_CMD")]
    parser_cmd: Option<String>,

    /// Perfect game webhook
    #[arg(long, env = "PERFECT_GAME_WEBHOOK_URL")]
    webhook_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("bgstats_backend=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut bodies = Vec::with_capacity(args.messages.len());
    for path in &args.messages {
        bodies.push(read_message(path).await?);
    }
    info!("Loaded {} message bodies", bodies.len());

    let config = Config {
        database_path: args.database_path,
        port: 0,
        blob_root: args.blob_root,
        blob_base_url: args.blob_base_url,
        parser_command: args.parser_cmd,
        perfect_game_webhook_url: args.webhook_url,
        ingest_batch_size: bodies.len(),
    };
    let db = Arc::new(StatsDb::open(&config.database_path)?);
    let ingestor = Ingestor::from_config(&config, db)?;

    let summary = ingestor.process_batch(&bodies).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn read_message(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        tokio::io::stdin()
            .read_to_string(&mut body)
            .await
            .context("Failed to read stdin")?;
        return Ok(body);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
