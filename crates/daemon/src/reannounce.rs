use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{SessionError, TransferSession};
use crate::tracker::is_tracker_ok;

#[derive(Debug, Error)]
pub enum ReannounceError {
    #[error("reannounce took too long ({attempts} attempts)")]
    TookTooLong { attempts: u32 },

    #[error("reannounce cancelled")]
    Cancelled,

    #[error("torrent reported no trackers")]
    NoTrackers,

    #[error("reannounce failed: {0}")]
    Session(#[from] SessionError),
}

/// States of the bounded reannounce loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Announcing,
    Waiting,
    Resolved,
    Exhausted,
    Cancelled,
}

/// Per-transfer retry budget and progress
struct Reannouncer<'a> {
    session: &'a dyn TransferSession,
    hash: &'a str,
    max_attempts: u32,
    interval: Duration,
    cancel: &'a CancellationToken,
    attempts: u32,
}

impl Reannouncer<'_> {
    async fn step(&mut self, state: RetryState) -> Result<RetryState, ReannounceError> {
        match state {
            RetryState::Announcing => self.announce().await,
            RetryState::Waiting => self.wait_and_check().await,
            terminal => Ok(terminal),
        }
    }

    async fn announce(&mut self) -> Result<RetryState, ReannounceError> {
        if self.attempts >= self.max_attempts {
            return Ok(RetryState::Exhausted);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(RetryState::Cancelled),
            result = self.session.reannounce(self.hash) => result?,
        }

        self.attempts += 1;
        debug!(
            hash = self.hash,
            attempt = self.attempts,
            max_attempts = self.max_attempts,
            "Reannounce sent"
        );
        Ok(RetryState::Waiting)
    }

    async fn wait_and_check(&mut self) -> Result<RetryState, ReannounceError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(RetryState::Cancelled),
            _ = sleep(self.interval) => {}
        }

        let records = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(RetryState::Cancelled),
            records = self.session.trackers(self.hash) => records?,
        };

        if records.is_empty() {
            return Err(ReannounceError::NoTrackers);
        }

        if is_tracker_ok(&records) {
            Ok(RetryState::Resolved)
        } else {
            Ok(RetryState::Announcing)
        }
    }
}

/// Reannounce a torrent until its trackers report OK or the attempt budget runs out.
///
/// Each attempt announces, waits `interval`, then re-checks tracker state.
/// A budget of zero attempts is exhausted immediately without announcing.
pub async fn reannounce(
    session: &dyn TransferSession,
    hash: &str,
    max_attempts: u32,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), ReannounceError> {
    let mut machine = Reannouncer {
        session,
        hash,
        max_attempts,
        interval,
        cancel,
        attempts: 0,
    };

    let mut state = if cancel.is_cancelled() {
        RetryState::Cancelled
    } else {
        RetryState::Announcing
    };

    loop {
        match state {
            RetryState::Resolved => return Ok(()),
            RetryState::Exhausted => {
                return Err(ReannounceError::TookTooLong {
                    attempts: machine.attempts,
                })
            }
            RetryState::Cancelled => return Err(ReannounceError::Cancelled),
            RetryState::Announcing | RetryState::Waiting => {
                state = machine.step(state).await?;
            }
        }
    }
}
