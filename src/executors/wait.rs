//! # Fixed Pauses
//!
//! Element-less `wait` steps sleep for a fixed duration. The engine caps
//! the duration at the step ceiling and the time left in the run; the pause
//! itself yields to cancellation so an aborted run does not sit out a long
//! wait.

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// How a pause ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Elapsed { actual_ms: u64 },
    Cancelled { actual_ms: u64 },
}

impl PauseOutcome {
    pub fn actual_ms(self) -> u64 {
        match self {
            Self::Elapsed { actual_ms } | Self::Cancelled { actual_ms } => actual_ms,
        }
    }
}

/// Sleeps `duration_ms` unless `cancel` fires first.
#[instrument(skip(cancel))]
pub async fn pause(duration_ms: u64, cancel: &CancellationToken) -> PauseOutcome {
    let start = Instant::now();
    info!(duration_ms, "⏳ Waiting");

    tokio::select! {
        _ = sleep(Duration::from_millis(duration_ms)) => {
            let actual_ms = start.elapsed().as_millis() as u64;
            info!(actual_ms, "✅ Wait finished");
            PauseOutcome::Elapsed { actual_ms }
        }
        _ = cancel.cancelled() => {
            PauseOutcome::Cancelled { actual_ms: start.elapsed().as_millis() as u64 }
        }
    }
}

/// Element-wait polling interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
