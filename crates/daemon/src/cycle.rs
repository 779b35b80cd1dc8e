use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Options, Selector};
use crate::gates::{check_gates, GateResult, SkipReason};
use crate::reannounce::{reannounce, ReannounceError};
use crate::session::{SessionError, Transfer, TransferSession};
use crate::tracker::{classify, tracker_host, TrackerStatus, Verdict};
use crate::waiter::{wait_for_tracker_update, WaitError};

/// Result of one transfer's pass through the cycle
#[derive(Debug)]
pub enum ReannounceOutcome {
    Skipped(SkipReason),
    /// Tracker finished updating on its own and reported OK
    WaitedOk,
    Reannounced,
    Failed(ReannounceError),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to get torrents: {0}")]
    List(#[source] SessionError),

    #[error("no torrent found for hash: {0}")]
    NotFound(String),
}

/// Per-outcome tallies for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub total: usize,
    pub skipped: usize,
    pub waited_ok: usize,
    pub reannounced: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &ReannounceOutcome) {
        self.total += 1;
        match outcome {
            ReannounceOutcome::Skipped(_) => self.skipped += 1,
            ReannounceOutcome::WaitedOk => self.waited_ok += 1,
            ReannounceOutcome::Reannounced => self.reannounced += 1,
            ReannounceOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Run one scan cycle: list transfers, evaluate each one concurrently and wait
/// for every unit to finish before returning.
pub async fn run_cycle(
    session: Arc<dyn TransferSession>,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<CycleReport, CycleError> {
    let filter = options.filter();
    let transfers = session
        .list_transfers(&filter)
        .await
        .map_err(CycleError::List)?;

    if let Selector::Hash(hash) = &options.selector {
        if transfers.is_empty() {
            return Err(CycleError::NotFound(hash.clone()));
        }
    }

    debug!("Found {} candidate torrents", transfers.len());

    let mut units = JoinSet::new();
    for transfer in transfers {
        let session = Arc::clone(&session);
        let options = options.clone();
        let cancel = cancel.clone();

        units.spawn(async move {
            let outcome = process_transfer(session.as_ref(), &transfer, &options, &cancel).await;
            log_outcome(&transfer, &outcome);
            outcome
        });
    }

    let mut report = CycleReport::default();
    while let Some(joined) = units.join_next().await {
        match joined {
            Ok(outcome) => report.record(&outcome),
            Err(e) => {
                error!("Reannounce task failed to complete: {}", e);
                report.total += 1;
                report.failed += 1;
            }
        }
    }

    debug!(
        total = report.total,
        skipped = report.skipped,
        waited_ok = report.waited_ok,
        reannounced = report.reannounced,
        failed = report.failed,
        "Cycle complete"
    );
    Ok(report)
}

/// Evaluate a single transfer: gates, optional wait for an in-flight update, then reannounce.
pub async fn process_transfer(
    session: &dyn TransferSession,
    transfer: &Transfer,
    options: &Options,
    cancel: &CancellationToken,
) -> ReannounceOutcome {
    let hash = transfer.hash.as_str();

    if let GateResult::Skip(reason) = check_gates(transfer, options.max_age) {
        return ReannounceOutcome::Skipped(reason);
    }

    if classify(&transfer.trackers) == Verdict::Updating {
        debug!(hash, "Waiting for tracker update");

        match wait_for_tracker_update(
            session,
            hash,
            options.poll_interval,
            options.interval,
            cancel,
        )
        .await
        {
            Ok(true) => return ReannounceOutcome::WaitedOk,
            Ok(false) => debug!(hash, "Tracker update finished without OK - reannouncing"),
            Err(WaitError::Cancelled) => return ReannounceOutcome::Skipped(SkipReason::Cancelled),
            Err(WaitError::Timeout(timeout)) => {
                debug!(hash, ?timeout, "Tracker update timed out - reannouncing")
            }
            Err(e) => warn!(hash, error = %e, "Tracker update failed - reannouncing"),
        }
    }

    match reannounce(
        session,
        hash,
        options.max_attempts,
        options.interval,
        cancel,
    )
    .await
    {
        Ok(()) => ReannounceOutcome::Reannounced,
        Err(ReannounceError::Cancelled) => ReannounceOutcome::Skipped(SkipReason::Cancelled),
        Err(e) => ReannounceOutcome::Failed(e),
    }
}

/// Host of the tracker a transfer is using, for log fields
fn transfer_tracker(transfer: &Transfer) -> String {
    if !transfer.tracker.is_empty() {
        return tracker_host(&transfer.tracker);
    }

    transfer
        .trackers
        .iter()
        .find(|record| record.status != TrackerStatus::Disabled)
        .map(|record| tracker_host(&record.url))
        .unwrap_or_default()
}

fn log_outcome(transfer: &Transfer, outcome: &ReannounceOutcome) {
    let hash = transfer.hash.as_str();
    let tracker = transfer_tracker(transfer);

    match outcome {
        ReannounceOutcome::Skipped(SkipReason::Cancelled) => {
            debug!(hash, tracker = %tracker, "Reannounce cancelled")
        }
        ReannounceOutcome::Skipped(reason) => {
            info!(hash, tracker = %tracker, reason = %reason, "Skipping torrent")
        }
        ReannounceOutcome::WaitedOk => {
            info!(hash, tracker = %tracker, "Tracker resolved itself - skipping")
        }
        ReannounceOutcome::Reannounced => {
            info!(hash, tracker = %tracker, "Reannounced successfully")
        }
        ReannounceOutcome::Failed(e) => {
            warn!(hash, tracker = %tracker, error = %e, "Reannounce failed")
        }
    }
}
