use serde::{Deserialize, Deserializer};
use url::Url;

/// Phrases trackers echo back when they reject a torrent they do not know
const UNREGISTERED_PHRASES: &[&str] = &["unregistered", "not registered", "not found", "not exist"];

/// Tracker status as reported by the qBittorrent WebUI (codes 0..=4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Disabled,
    NotContacted,
    Ok,
    Updating,
    NotWorking,
}

impl TrackerStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TrackerStatus::Disabled,
            1 => TrackerStatus::NotContacted,
            2 => TrackerStatus::Ok,
            3 => TrackerStatus::Updating,
            // 4 is "not working"; anything newer is treated the same way
            _ => TrackerStatus::NotWorking,
        }
    }
}

impl<'de> Deserialize<'de> for TrackerStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Ok(TrackerStatus::from_code(code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackerRecord {
    pub url: String,
    pub status: TrackerStatus,
    #[serde(rename = "msg", default)]
    pub message: String,
}

impl TrackerRecord {
    pub fn new(url: impl Into<String>, status: TrackerStatus, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            message: message.into(),
        }
    }
}

/// Semantic summary of a transfer's tracker records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Updating,
    NotOk,
}

/// Summarise tracker records into a single verdict.
///
/// OK wins over Updating: a transfer with one healthy tracker is never waited on.
pub fn classify(records: &[TrackerRecord]) -> Verdict {
    if is_tracker_ok(records) {
        Verdict::Ok
    } else if is_tracker_updating(records) {
        Verdict::Updating
    } else {
        Verdict::NotOk
    }
}

/// Returns true if any enabled tracker reports OK without an unregistered-style message.
///
/// Records are evaluated in listed order. The message check runs before the status
/// check so a tracker reporting OK while still echoing a rejection is not trusted,
/// and such a record settles the verdict as not OK.
pub fn is_tracker_ok(records: &[TrackerRecord]) -> bool {
    for record in records {
        if record.status == TrackerStatus::Disabled {
            continue;
        }

        if is_unregistered(&record.message) {
            return false;
        }

        if record.status == TrackerStatus::Ok {
            return true;
        }
    }

    false
}

/// Returns true if every enabled tracker is mid-update (Updating or NotContacted).
///
/// An empty list is not updating. A list of only disabled trackers is vacuously updating.
pub fn is_tracker_updating(records: &[TrackerRecord]) -> bool {
    if records.is_empty() {
        return false;
    }

    records
        .iter()
        .filter(|record| record.status != TrackerStatus::Disabled)
        .all(|record| {
            matches!(
                record.status,
                TrackerStatus::Updating | TrackerStatus::NotContacted
            )
        })
}

/// Case-insensitive match against the unregistered phrase set
pub fn is_unregistered(message: &str) -> bool {
    let message = message.to_lowercase();
    UNREGISTERED_PHRASES
        .iter()
        .any(|phrase| message.contains(phrase))
}

/// Host of a tracker announce URL, for log fields.
///
/// Falls back to the raw string when the URL has no parsable host.
pub fn tracker_host(tracker: &str) -> String {
    Url::parse(tracker)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_lowercase()))
        .unwrap_or_else(|| tracker.to_string())
}
