use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::tracker::TrackerRecord;

/// Snapshot of one torrent as listed by the transfer client
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transfer {
    pub hash: String,
    #[serde(default)]
    pub name: String,
    /// Seconds the torrent has been active
    #[serde(default)]
    pub time_active: i64,
    #[serde(default)]
    pub num_seeds: i64,
    #[serde(default)]
    pub num_leechs: i64,
    /// Currently active tracker URL, empty when none is working
    #[serde(default)]
    pub tracker: String,
    #[serde(default)]
    pub trackers: Vec<TrackerRecord>,
}

/// Server-side selection applied when listing transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentFilter {
    All,
    Stalled,
    StalledDownloading,
    Hashes(Vec<String>),
}

impl TorrentFilter {
    /// Value of the WebUI `filter` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            TorrentFilter::All | TorrentFilter::Hashes(_) => "all",
            TorrentFilter::Stalled => "stalled",
            TorrentFilter::StalledDownloading => "stalled_downloading",
        }
    }

    pub fn hashes(&self) -> Option<&[String]> {
        match self {
            TorrentFilter::Hashes(hashes) => Some(hashes),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request to transfer client failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid transfer client URL: {0}")]
    InvalidUrl(String),
}

/// Connection to a transfer client.
///
/// Implementations must be safe to call concurrently from many tasks; the
/// reannounce engine shares a single session across every per-transfer unit
/// without any locking of its own.
#[async_trait]
pub trait TransferSession: Send + Sync {
    async fn login(&self) -> Result<(), SessionError>;

    /// List transfers matching the filter, with tracker records populated.
    ///
    /// A transfer whose trackers cannot be fetched is left out of the listing.
    async fn list_transfers(&self, filter: &TorrentFilter) -> Result<Vec<Transfer>, SessionError>;

    async fn trackers(&self, hash: &str) -> Result<Vec<TrackerRecord>, SessionError>;

    /// Ask the client to re-announce the torrent to all of its trackers
    async fn reannounce(&self, hash: &str) -> Result<(), SessionError>;
}
