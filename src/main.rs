//! bgstats - Battlegrounds post-match stats server
//! Ingestion worker fed by an in-process queue, retrieval served over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bgstats_backend::{
    api::{create_router, AppState},
    ingest::{
        worker::{run_ingest_worker, BatchRetry},
        Ingestor,
    },
    models::Config,
    retrieval::RetrievalService,
    store::StatsDb,
};

/// Messages buffered ahead of the worker before `start` callers wait.
const QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // loads .env first so RUST_LOG from it reaches the subscriber
    let config = Config::from_env()?;
    init_tracing();

    info!("🚀 bgstats post-match service starting");

    let db = Arc::new(StatsDb::open(&config.database_path)?);
    let ingestor = Arc::new(Ingestor::from_config(&config, db.clone())?);

    let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
    tokio::spawn(run_ingest_worker(
        ingestor,
        rx,
        config.ingest_batch_size,
        BatchRetry::default(),
    ));

    let app = create_router(AppState {
        queue,
        retrieval: Arc::new(RetrievalService::new(db)),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bgstats_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
