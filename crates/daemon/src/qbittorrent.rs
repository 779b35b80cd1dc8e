//! qBittorrent WebUI (`/api/v2`) implementation of [`TransferSession`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::DaemonConfig;
use crate::session::{SessionError, TorrentFilter, Transfer, TransferSession};
use crate::tracker::TrackerRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix of the DHT/PeX/LSD pseudo-entries in the tracker list
const PSEUDO_TRACKER_PREFIX: &str = "** [";

/// Cookie-authenticated WebUI session.
///
/// The underlying reqwest client pools connections and keeps the `SID` cookie,
/// so one session can be shared across tasks.
#[derive(Debug, Clone)]
pub struct QbitSession {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl QbitSession {
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, SessionError> {
        let mut base_url =
            Url::parse(host).map_err(|e| SessionError::InvalidUrl(format!("{}: {}", host, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(config: &DaemonConfig) -> Result<Self, SessionError> {
        Self::new(&config.host, &config.username, &config.password)
    }

    fn endpoint(&self, path: &str) -> Result<Url, SessionError> {
        self.base_url
            .join(path)
            .map_err(|e| SessionError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Send an authenticated request, logging in again once if the session expired
    async fn send<F>(&self, path: &str, build: F) -> Result<Response, SessionError>
    where
        F: Fn(&Client, Url) -> RequestBuilder + Send + Sync,
    {
        let url = self.endpoint(path)?;
        let response = build(&self.client, url.clone()).send().await?;

        if response.status() == StatusCode::FORBIDDEN {
            debug!("WebUI session rejected, logging in again");
            self.login().await?;
            let response = build(&self.client, url).send().await?;
            return check_status(path, response);
        }

        check_status(path, response)
    }
}

fn check_status(path: &str, response: Response) -> Result<Response, SessionError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SessionError::Status {
            endpoint: path.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl TransferSession for QbitSession {
    async fn login(&self) -> Result<(), SessionError> {
        let url = self.endpoint("api/v2/auth/login")?;
        let response = self
            .client
            .post(url)
            .header(REFERER, self.base_url.as_str())
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(SessionError::Auth(
                "client IP banned after too many failed login attempts".to_string(),
            ));
        }

        let response = check_status("api/v2/auth/login", response)?;
        let body = response.text().await?;
        if body.trim() == "Ok." {
            debug!("Logged in to qBittorrent at {}", self.base_url);
            Ok(())
        } else {
            Err(SessionError::Auth("invalid username or password".to_string()))
        }
    }

    async fn list_transfers(&self, filter: &TorrentFilter) -> Result<Vec<Transfer>, SessionError> {
        let mut query = vec![("filter", filter.as_query().to_string())];
        if let Some(hashes) = filter.hashes() {
            query.push(("hashes", hashes.join("|")));
        }

        let response = self
            .send("api/v2/torrents/info", |client, url| client.get(url).query(&query))
            .await?;
        let transfers: Vec<Transfer> = response
            .json()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;

        // Tracker fetch failures drop only the affected torrent
        let mut listed = Vec::with_capacity(transfers.len());
        for mut transfer in transfers {
            match self.trackers(&transfer.hash).await {
                Ok(records) => {
                    transfer.trackers = records;
                    listed.push(transfer);
                }
                Err(e) => warn!(
                    hash = %transfer.hash,
                    error = %e,
                    "Failed to get torrent trackers - skipping torrent"
                ),
            }
        }

        Ok(listed)
    }

    async fn trackers(&self, hash: &str) -> Result<Vec<TrackerRecord>, SessionError> {
        let response = self
            .send("api/v2/torrents/trackers", |client, url| {
                client.get(url).query(&[("hash", hash)])
            })
            .await?;
        let records: Vec<TrackerRecord> = response
            .json()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;

        Ok(records
            .into_iter()
            .filter(|record| !record.url.starts_with(PSEUDO_TRACKER_PREFIX))
            .collect())
    }

    async fn reannounce(&self, hash: &str) -> Result<(), SessionError> {
        self.send("api/v2/torrents/reannounce", |client, url| {
            client.post(url).form(&[("hashes", hash)])
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerStatus;
    use httpmock::prelude::*;
    use serde_json::json;

    fn session_for(server: &MockServer) -> QbitSession {
        QbitSession::new(&server.base_url(), "admin", "adminadmin").expect("valid session")
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/auth/login")
                .body_includes("username=admin");
            then.status(200).body("Ok.");
        });

        session_for(&server).login().await.expect("login should succeed");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_rejected_credentials() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200).body("Fails.");
        });

        let result = session_for(&server).login().await;
        assert!(matches!(result, Err(SessionError::Auth(_))));
    }

    #[tokio::test]
    async fn test_login_banned() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(403);
        });

        let result = session_for(&server).login().await;
        assert!(matches!(result, Err(SessionError::Auth(_))));
    }

    #[tokio::test]
    async fn test_list_transfers_populates_trackers() {
        let server = MockServer::start_async().await;
        let info = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/info")
                .query_param("filter", "stalled");
            then.status(200).json_body(json!([{
                "hash": "abc123",
                "name": "ubuntu.iso",
                "time_active": 42,
                "num_seeds": 0,
                "num_leechs": 0,
                "tracker": "",
                "state": "stalledDL"
            }]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/trackers")
                .query_param("hash", "abc123");
            then.status(200).json_body(json!([
                {"url": "** [DHT] **", "status": 2, "msg": ""},
                {
                    "url": "https://tracker.example.org/announce",
                    "status": 4,
                    "msg": "unregistered torrent"
                }
            ]));
        });

        let transfers = session_for(&server)
            .list_transfers(&TorrentFilter::Stalled)
            .await
            .expect("listing should succeed");

        info.assert_async().await;
        assert_eq!(transfers.len(), 1);
        let transfer = &transfers[0];
        assert_eq!(transfer.hash, "abc123");
        assert_eq!(transfer.time_active, 42);
        assert_eq!(transfer.trackers.len(), 1);
        assert_eq!(transfer.trackers[0].status, TrackerStatus::NotWorking);
        assert_eq!(transfer.trackers[0].message, "unregistered torrent");
    }

    #[tokio::test]
    async fn test_list_transfers_drops_torrent_removed_mid_listing() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/info");
            then.status(200).json_body(json!([
                {"hash": "good", "name": "good.iso", "time_active": 10},
                {"hash": "gone", "name": "gone.iso", "time_active": 10}
            ]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/trackers")
                .query_param("hash", "good");
            then.status(200).json_body(json!([
                {"url": "https://tracker.example.org/announce", "status": 4, "msg": ""}
            ]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/trackers")
                .query_param("hash", "gone");
            then.status(404);
        });

        let transfers = session_for(&server)
            .list_transfers(&TorrentFilter::Stalled)
            .await
            .expect("one missing torrent should not fail the listing");

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].hash, "good");
        assert_eq!(transfers[0].trackers.len(), 1);
    }

    #[tokio::test]
    async fn test_list_transfers_by_hash() {
        let server = MockServer::start_async().await;
        let info = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/info")
                .query_param("filter", "all")
                .query_param("hashes", "aaa|bbb");
            then.status(200).json_body(json!([]));
        });

        let transfers = session_for(&server)
            .list_transfers(&TorrentFilter::Hashes(vec![
                "aaa".to_string(),
                "bbb".to_string(),
            ]))
            .await
            .expect("listing should succeed");

        info.assert_async().await;
        assert!(transfers.is_empty());
    }

    #[tokio::test]
    async fn test_reannounce_posts_hash() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/reannounce")
                .body_includes("hashes=abc123");
            then.status(200);
        });

        session_for(&server)
            .reannounce("abc123")
            .await
            .expect("reannounce should succeed");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_hash_is_status_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/torrents/trackers");
            then.status(404);
        });

        let result = session_for(&server).trackers("missing").await;
        assert!(matches!(
            result,
            Err(SessionError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_forbidden_triggers_single_relogin() {
        let server = MockServer::start_async().await;
        let login = server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200).body("Ok.");
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/torrents/reannounce");
            then.status(403);
        });

        let result = session_for(&server).reannounce("abc123").await;

        login.assert_async().await;
        assert!(matches!(
            result,
            Err(SessionError::Status { status: 403, .. })
        ));
    }

    #[test]
    fn test_base_url_with_subpath() {
        let session = QbitSession::new("http://nas.local/qbittorrent", "", "").unwrap();
        let url = session.endpoint("api/v2/auth/login").unwrap();
        assert_eq!(url.as_str(), "http://nas.local/qbittorrent/api/v2/auth/login");
    }

    #[test]
    fn test_invalid_host() {
        let result = QbitSession::new("not a url", "", "");
        assert!(result.is_err());
    }
}
