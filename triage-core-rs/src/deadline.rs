//! # Operations With a Deadline
//!
//! Races a future against a timer. When the timer wins, the future is
//! dropped, which cancels it at its next suspension point. Work the future
//! already handed off (an in-flight HTTP request, a spawned task) may still
//! finish in the background, but the caller is released on time.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Message recorded when the reasoning engine misses its deadline
pub const TIMEOUT_REASON: &str = "AI_TIMEOUT";

/// The deadline passed before the operation completed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("AI_TIMEOUT")]
pub struct DeadlineElapsed {
    pub deadline: Duration,
}

/// Result of a completed operation together with its elapsed time on the
/// tokio clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

/// Runs `operation`, giving up after `deadline`.
pub async fn run_with_deadline<F, T>(deadline: Duration, operation: F) -> Result<Timed<T>, DeadlineElapsed>
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    match tokio::time::timeout(deadline, operation).await {
        Ok(value) => Ok(Timed {
            value,
            elapsed: started.elapsed(),
        }),
        Err(_) => {
            debug!(deadline_ms = %deadline.as_millis(), "Operation abandoned at deadline");
            Err(DeadlineElapsed { deadline })
        }
    }
}
