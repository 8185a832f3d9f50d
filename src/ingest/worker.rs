//! In-process queue consumer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::Ingestor;

/// Bounded redelivery for a batch that failed on an infrastructure fault.
/// Replaying a batch is safe: run inserts are insert-or-ignore and the
/// ledger merge ignores ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRetry {
    pub max_attempts: u32,
    /// Grows linearly: `backoff * attempt` before the next attempt.
    pub backoff: Duration,
}

impl Default for BatchRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Drain message bodies in batches of up to `batch_size` until every sender
/// is dropped. A failing batch is processed again up to
/// `retry.max_attempts` times before it is given up on.
pub async fn run_ingest_worker(
    ingestor: Arc<Ingestor>,
    mut queue: mpsc::Receiver<String>,
    batch_size: usize,
    retry: BatchRetry,
) {
    info!(batch_size, max_attempts = retry.max_attempts, "📥 ingestion worker started");
    while let Some(first) = queue.recv().await {
        let mut batch = vec![first];
        while batch.len() < batch_size.max(1) {
            match queue.try_recv() {
                Ok(body) => batch.push(body),
                Err(_) => break,
            }
        }
        process_with_retry(&ingestor, &batch, retry).await;
    }
    info!("ingestion queue closed, worker exiting");
}

async fn process_with_retry(ingestor: &Ingestor, batch: &[String], retry: BatchRetry) {
    let max_attempts = retry.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match ingestor.process_batch(batch).await {
            Ok(summary) => {
                info!(
                    received = summary.received,
                    ingested = summary.ingested,
                    abandoned = summary.abandoned,
                    attempt,
                    "batch processed"
                );
                return;
            }
            Err(e) if attempt < max_attempts => {
                let delay = retry.backoff * attempt;
                warn!(
                    messages = batch.len(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "batch failed, retrying"
                );
                sleep(delay).await;
            }
            Err(e) => {
                error!(
                    messages = batch.len(),
                    attempts = max_attempts,
                    error = %e,
                    bodies = ?batch,
                    "batch failed, giving up"
                );
            }
        }
    }
}
