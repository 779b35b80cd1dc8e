use crate::session::Transfer;
use crate::tracker::is_tracker_ok;

#[derive(Debug, Clone, PartialEq)]
pub enum GateResult {
    Pass,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooOld,
    HasPeers,
    TrackerOk,
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::TooOld => "torrent too old",
            SkipReason::HasPeers => "torrent has peers",
            SkipReason::TrackerOk => "tracker OK",
            SkipReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Evaluate all gates to determine if a transfer should be reannounced
/// Gates are checked in order:
/// 1. Active for longer than max_age seconds
/// 2. Connected to at least one seed or peer
/// 3. Tracker already reports OK
pub fn check_gates(transfer: &Transfer, max_age: i64) -> GateResult {
    // Gate 1: too old to bother, likely abandoned
    if transfer.time_active > max_age {
        return GateResult::Skip(SkipReason::TooOld);
    }

    // Gate 2: already in the swarm, tracker state is irrelevant
    if transfer.num_seeds > 0 || transfer.num_leechs > 0 {
        return GateResult::Skip(SkipReason::HasPeers);
    }

    // Gate 3: tracker is fine
    if is_tracker_ok(&transfer.trackers) {
        return GateResult::Skip(SkipReason::TrackerOk);
    }

    GateResult::Pass
}

pub fn should_reannounce(transfer: &Transfer, max_age: i64) -> bool {
    check_gates(transfer, max_age) == GateResult::Pass
}
