//! Retrieve Stats Binary
//!
//! Runs one retrieval against the local database and prints the response
//! envelope (`statusCode`, `isBase64Encoded`, `body`, `headers`).
//!
//! Usage:
//!   retrieve_stats --review-id 3f1c...
//!   retrieve_stats --user-id 1234 --user-name daedin --hero-card-id TB_BaconShop_HERO_28
//!   retrieve_stats --request '{"reviewId":"3f1c..."}'

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use bgstats_backend::{
    models::RetrievalRequest,
    retrieval::{RetrievalResponse, RetrievalService},
    store::StatsDb,
};

#[derive(Parser, Debug)]
#[command(name = "retrieve_stats")]
#[command(about = "Look up stored post-match stats")]
struct Args {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "./bgstats.db")]
    database_path: String,

    /// Raw JSON request body; overrides the individual flags
    #[arg(long)]
    request: Option<String>,

    #[arg(long)]
    review_id: Option<String>,

    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    user_name: Option<String>,

    #[arg(long)]
    hero_card_id: Option<String>,
}

impl Args {
    fn retrieval_request(&self) -> Result<RetrievalRequest> {
        if let Some(raw) = &self.request {
            return serde_json::from_str(raw).context("--request is not a retrieval request");
        }
        Ok(RetrievalRequest {
            review_id: self.review_id.clone(),
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            hero_card_id: self.hero_card_id.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let request = args.retrieval_request()?;
    debug!(?request, "retrieving");

    let db = Arc::new(StatsDb::open(&args.database_path)?);
    let retrieval = RetrievalService::new(db).retrieve(&request).await?;
    let response = RetrievalResponse::from_retrieval(&retrieval)?;

    println!("{}", serde_json::to_string(&response.envelope())?);
    Ok(())
}
