#![allow(dead_code)]

use async_trait::async_trait;
use qbrr_daemon::session::{SessionError, TorrentFilter, Transfer, TransferSession};
use qbrr_daemon::tracker::{TrackerRecord, TrackerStatus};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn record(status: TrackerStatus, message: &str) -> TrackerRecord {
    TrackerRecord::new("https://tracker.example.org/announce", status, message)
}

pub fn transfer(
    hash: &str,
    time_active: i64,
    num_seeds: i64,
    num_leechs: i64,
    trackers: Vec<TrackerRecord>,
) -> Transfer {
    Transfer {
        hash: hash.to_string(),
        name: format!("{}.iso", hash),
        time_active,
        num_seeds,
        num_leechs,
        tracker: String::new(),
        trackers,
    }
}

/// In-memory transfer client with scripted tracker responses.
///
/// Each `trackers` call pops the next scripted response for the hash; the last
/// one repeats forever. A reannounce can swap in a new script.
#[derive(Default)]
pub struct ScriptedSession {
    transfers: Mutex<Vec<Transfer>>,
    scripts: Mutex<HashMap<String, VecDeque<Vec<TrackerRecord>>>>,
    after_reannounce: Mutex<HashMap<String, Vec<TrackerRecord>>>,
    failing_reannounce: Mutex<HashSet<String>>,
    panicking_reannounce: Mutex<HashSet<String>>,
    tracker_delay: Mutex<Option<Duration>>,
    reannounced: Mutex<Vec<String>>,
    list_error: AtomicBool,
    pub list_calls: AtomicUsize,
    pub tracker_calls: AtomicUsize,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transfers(transfers: Vec<Transfer>) -> Self {
        let session = Self::new();
        for transfer in &transfers {
            session.script(&transfer.hash, vec![transfer.trackers.clone()]);
        }
        *session.transfers.lock().unwrap() = transfers;
        session
    }

    pub fn script(&self, hash: &str, responses: Vec<Vec<TrackerRecord>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(hash.to_string(), responses.into());
    }

    /// Tracker records reported once the hash has been reannounced
    pub fn resolve_on_reannounce(&self, hash: &str, records: Vec<TrackerRecord>) {
        self.after_reannounce
            .lock()
            .unwrap()
            .insert(hash.to_string(), records);
    }

    pub fn fail_reannounce(&self, hash: &str) {
        self.failing_reannounce
            .lock()
            .unwrap()
            .insert(hash.to_string());
    }

    pub fn panic_on_reannounce(&self, hash: &str) {
        self.panicking_reannounce
            .lock()
            .unwrap()
            .insert(hash.to_string());
    }

    /// Make every `trackers` call take this long to answer
    pub fn slow_trackers(&self, delay: Duration) {
        *self.tracker_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_listing(&self) {
        self.list_error.store(true, Ordering::SeqCst);
    }

    pub fn reannounce_count(&self, hash: &str) -> usize {
        self.reannounced
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.as_str() == hash)
            .count()
    }

    pub fn total_reannounces(&self) -> usize {
        self.reannounced.lock().unwrap().len()
    }
}

fn not_found(endpoint: &str) -> SessionError {
    SessionError::Status {
        endpoint: endpoint.to_string(),
        status: 404,
    }
}

#[async_trait]
impl TransferSession for ScriptedSession {
    async fn login(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn list_transfers(&self, filter: &TorrentFilter) -> Result<Vec<Transfer>, SessionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.list_error.load(Ordering::SeqCst) {
            return Err(SessionError::Status {
                endpoint: "api/v2/torrents/info".to_string(),
                status: 500,
            });
        }

        let transfers = self.transfers.lock().unwrap().clone();
        Ok(match filter.hashes() {
            Some(hashes) => transfers
                .into_iter()
                .filter(|t| hashes.contains(&t.hash))
                .collect(),
            None => transfers,
        })
    }

    async fn trackers(&self, hash: &str) -> Result<Vec<TrackerRecord>, SessionError> {
        self.tracker_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.tracker_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(hash)
            .ok_or_else(|| not_found("api/v2/torrents/trackers"))?;

        if script.len() > 1 {
            Ok(script.pop_front().unwrap_or_default())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }

    async fn reannounce(&self, hash: &str) -> Result<(), SessionError> {
        let panics = self.panicking_reannounce.lock().unwrap().contains(hash);
        if panics {
            panic!("client crashed while reannouncing {}", hash);
        }

        if self.failing_reannounce.lock().unwrap().contains(hash) {
            return Err(not_found("api/v2/torrents/reannounce"));
        }

        self.reannounced.lock().unwrap().push(hash.to_string());
        if let Some(records) = self.after_reannounce.lock().unwrap().get(hash) {
            self.script(hash, vec![records.clone()]);
        }
        Ok(())
    }
}
