//! Bounded polling for records that are referenced before they are visible.
//!
//! A match-completion event can overtake the writes it points at (the
//! summary row, the replay upload). Polling a fixed number of times absorbs
//! that race. Running out of attempts is a normal outcome and is reported as
//! `Loaded::NotFound`, not as an error.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Replay responses shorter than this are the blob store's "no such key" page.
pub const MIN_REPLAY_LENGTH: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const SUMMARY_ROW: RetryPolicy = RetryPolicy {
        max_attempts: 15,
        delay: Duration::from_secs(1),
    };

    pub const REPLAY_BLOB: RetryPolicy = RetryPolicy {
        max_attempts: 15,
        delay: Duration::from_millis(500),
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    Found(T),
    NotFound { attempts: u32 },
}

impl<T> Loaded<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Loaded::Found(value) => Some(value),
            Loaded::NotFound { .. } => None,
        }
    }
}

/// Poll `fetch` until it returns something `is_ready` accepts.
///
/// Sleeps `policy.delay` between attempts, never after the last one. Errors
/// from `fetch` are infrastructure faults and end the polling immediately.
pub async fn load_with_retry<T, F, Fut, R>(
    key: &str,
    policy: RetryPolicy,
    mut fetch: F,
    is_ready: R,
) -> Result<Loaded<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    R: Fn(&T) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match fetch().await? {
            Some(value) if is_ready(&value) => return Ok(Loaded::Found(value)),
            _ => debug!(key, attempt, "not visible yet"),
        }
        if attempt < attempts {
            sleep(policy.delay).await;
        }
    }

    warn!(key, attempts, "gave up waiting for record");
    Ok(Loaded::NotFound { attempts })
}
