use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::session::TorrentFilter;
use crate::waiter::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_HOST: &str = "http://localhost:8080";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;
pub const DEFAULT_INTERVAL_SECS: u64 = 7;
/// Attempt budget used in daemon mode when the default was not overridden
pub const DAEMON_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub log_level: String,
    pub max_age_secs: i64,
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub hash: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            username: String::new(),
            password: String::new(),
            log_level: "info".to_string(),
            max_age_secs: 300,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_secs: DEFAULT_INTERVAL_SECS,
            hash: None,
        }
    }
}

/// Values given on the command line; each one wins over file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub username: Option<String>,
    pub log_level: Option<String>,
    pub max_age_secs: Option<i64>,
    pub max_attempts: Option<u32>,
    pub interval_secs: Option<u64>,
    pub hash: Option<String>,
}

/// Load configuration from an optional TOML file, then the process environment,
/// then command line overrides, and validate the result.
pub fn load_config(
    path: Option<&std::path::Path>,
    overrides: &ConfigOverrides,
) -> Result<DaemonConfig> {
    let mut config = read_config_file(path)?;
    apply_env(&mut config, |key| std::env::var(key).ok());
    apply_overrides(&mut config, overrides);
    validate_config(&config)?;
    Ok(config)
}

fn read_config_file(path: Option<&std::path::Path>) -> Result<DaemonConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<DaemonConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            DaemonConfig::default()
        }
    } else {
        tracing::debug!("No config path provided, using defaults");
        DaemonConfig::default()
    };

    Ok(config)
}

/// Apply `QBITTORRENT_*` variables and the `QBT_WEBUI_PORT` fallback
pub fn apply_env<F>(config: &mut DaemonConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(host) = non_empty("QBITTORRENT_HOST") {
        config.host = host;
    } else if config.host == DEFAULT_HOST {
        // Container images expose the WebUI port instead of a full host
        if let Some(port) = non_empty("QBT_WEBUI_PORT") {
            config.host = format!("http://localhost:{}", port);
        }
    }

    if let Some(username) = non_empty("QBITTORRENT_USERNAME") {
        config.username = username;
    }
    if let Some(password) = non_empty("QBITTORRENT_PASSWORD") {
        config.password = password;
    }
}

pub fn apply_overrides(config: &mut DaemonConfig, overrides: &ConfigOverrides) {
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(username) = &overrides.username {
        config.username = username.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.log_level = level.clone();
    }
    if let Some(max_age) = overrides.max_age_secs {
        config.max_age_secs = max_age;
    }
    if let Some(max_attempts) = overrides.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(interval) = overrides.interval_secs {
        config.interval_secs = interval;
    }
    if let Some(hash) = &overrides.hash {
        config.hash = Some(hash.clone());
    }
}

pub fn validate_config(config: &DaemonConfig) -> Result<()> {
    match Url::parse(&config.host) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => anyhow::bail!("host must use http or https, got {}", url.scheme()),
        Err(e) => anyhow::bail!("host is not a valid URL ({}): {}", config.host, e),
    }

    if config.interval_secs == 0 {
        anyhow::bail!("interval_secs must be at least 1");
    }

    if config.max_age_secs < 0 {
        anyhow::bail!("max_age_secs cannot be negative");
    }

    if let Some(hash) = &config.hash {
        if hash.trim().is_empty() {
            anyhow::bail!("hash cannot be empty");
        }
    }

    Ok(())
}

/// Which transfers a cycle acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    AllStalled,
    Hash(String),
}

/// Policy parameters fixed at startup and shared by every cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub max_age: i64,
    pub max_attempts: u32,
    /// Delay between reannounce attempts, scan tick and tracker-update timeout
    pub interval: Duration,
    pub poll_interval: Duration,
    pub selector: Selector,
}

impl Options {
    pub fn from_config(config: &DaemonConfig) -> Self {
        let selector = match &config.hash {
            Some(hash) => Selector::Hash(hash.trim().to_lowercase()),
            None => Selector::AllStalled,
        };

        // The full default budget is meant for one-shot runs; the daemon
        // comes back every interval anyway
        let max_attempts = if selector == Selector::AllStalled
            && config.max_attempts == DEFAULT_MAX_ATTEMPTS
        {
            DAEMON_MAX_ATTEMPTS
        } else {
            config.max_attempts
        };

        Self {
            max_age: config.max_age_secs,
            max_attempts,
            interval: Duration::from_secs(config.interval_secs),
            poll_interval: DEFAULT_POLL_INTERVAL,
            selector,
        }
    }

    pub fn filter(&self) -> TorrentFilter {
        match &self.selector {
            Selector::AllStalled => TorrentFilter::Stalled,
            Selector::Hash(hash) => TorrentFilter::Hashes(vec![hash.clone()]),
        }
    }
}
