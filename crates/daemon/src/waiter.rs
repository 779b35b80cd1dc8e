use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{SessionError, TransferSession};
use crate::tracker::{is_tracker_ok, is_tracker_updating};

/// How often tracker state is re-queried while a tracker is updating
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {0:?} waiting for tracker update")]
    Timeout(Duration),

    #[error("wait for tracker update cancelled")]
    Cancelled,

    #[error("torrent reported no trackers")]
    NoTrackers,

    #[error("failed to get torrent trackers: {0}")]
    Session(#[from] SessionError),
}

/// Poll tracker state until it leaves the Updating verdict.
///
/// Returns `Ok(true)` when the trackers settle OK and `Ok(false)` when they
/// settle in any other state. Each iteration blocks on the earliest of the
/// next tick, the deadline and cancellation; cancellation always wins a tie.
/// The deadline also bounds a tracker query still in flight.
pub async fn wait_for_tracker_update(
    session: &dyn TransferSession,
    hash: &str,
    poll_interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<bool, WaitError> {
    if cancel.is_cancelled() {
        return Err(WaitError::Cancelled);
    }

    let start = Instant::now();
    let deadline = start + timeout;
    let mut ticker = interval_at(start + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = sleep_until(deadline) => return Err(WaitError::Timeout(timeout)),
            _ = ticker.tick() => {}
        }

        let records = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = sleep_until(deadline) => return Err(WaitError::Timeout(timeout)),
            records = session.trackers(hash) => records?,
        };

        if records.is_empty() {
            return Err(WaitError::NoTrackers);
        }

        if !is_tracker_updating(&records) {
            let ok = is_tracker_ok(&records);
            debug!(hash, ok, "Tracker update settled");
            return Ok(ok);
        }
    }
}
