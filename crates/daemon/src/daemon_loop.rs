use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{Options, Selector};
use crate::cycle::{run_cycle, CycleError, CycleReport};
use crate::session::TransferSession;

/// Run in the mode the options select: one targeted cycle, or the continuous daemon.
pub async fn execute(
    session: Arc<dyn TransferSession>,
    options: &Options,
    cancel: CancellationToken,
) -> Result<(), CycleError> {
    match &options.selector {
        Selector::Hash(_) => run_targeted(session, options, &cancel).await.map(|_| ()),
        Selector::AllStalled => {
            run_daemon(session, options, cancel).await;
            Ok(())
        }
    }
}

/// Run exactly one cycle against the selected torrent
pub async fn run_targeted(
    session: Arc<dyn TransferSession>,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<CycleReport, CycleError> {
    if let Selector::Hash(hash) = &options.selector {
        info!("Reannouncing torrent {}", hash);
    }
    run_cycle(session, options, cancel).await
}

/// Main daemon loop: one cycle per tick until cancelled.
///
/// A cycle always drains before the next tick is awaited, so cycles never
/// overlap. Cycle errors are logged and the loop carries on.
pub async fn run_daemon(
    session: Arc<dyn TransferSession>,
    options: &Options,
    cancel: CancellationToken,
) {
    info!("Starting torrent reannouncement daemon");
    info!("Scan interval: {} seconds", options.interval.as_secs());
    info!("Max torrent age: {} seconds", options.max_age);
    info!("Max reannounce attempts: {}", options.max_attempts);

    let mut ticker = interval_at(Instant::now() + options.interval, options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Stopping torrent reannouncement daemon");
                return;
            }
            _ = ticker.tick() => {}
        }

        match run_cycle(Arc::clone(&session), options, &cancel).await {
            Ok(report) if report.reannounced > 0 || report.failed > 0 => {
                info!(
                    "Cycle complete: {} torrents, {} reannounced, {} failed",
                    report.total, report.reannounced, report.failed
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error during reannounce cycle: {}", e);
            }
        }
    }
}
