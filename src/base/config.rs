//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::{Res, Void};

/// Default Telegram Bot API base URL.
fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

/// Default long-poll timeout, in seconds.
fn default_poll_timeout_secs() -> u64 {
    10
}

/// Default database endpoint (durable, on local disk).
fn default_db_endpoint() -> String {
    "surrealkv://data/db".to_string()
}

fn default_db_namespace() -> String {
    "everyone".to_string()
}

fn default_db_database() -> String {
    "bot".to_string()
}

/// Default number of mentions per broadcast message.
fn default_broadcast_chunk_size() -> usize {
    4
}

/// Default number of characters of a display name kept in a mention.
fn default_mention_name_max_chars() -> usize {
    10
}

/// Default reaper wake interval, in seconds.
fn default_reaper_interval_secs() -> u64 {
    10
}

/// Default retention of broadcast messages (7 days), in seconds.
fn default_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Default number of expired messages reaped per tick.
fn default_reaper_batch_size() -> usize {
    1
}

/// Default delay between membership queries during a sweep, in milliseconds.
fn default_sweep_pace_ms() -> u64 {
    1000
}

/// Configuration for the everyone-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Telegram bot token (`TELEGRAM_TOKEN`).
    pub telegram_token: String,
    /// Telegram Bot API base URL (`TELEGRAM_API_URL`).
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    /// Long-poll timeout for update retrieval (`POLL_TIMEOUT_SECS`).
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Database endpoint, e.g. `mem://`, `surrealkv://data/db` or `ws://host:8000` (`DB_ENDPOINT`).
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Database username; sign-in is skipped when empty (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: String,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: String,
    /// Mentions per broadcast message (`BROADCAST_CHUNK_SIZE`).
    #[serde(default = "default_broadcast_chunk_size")]
    pub broadcast_chunk_size: usize,
    /// Characters of a display name kept in a mention (`MENTION_NAME_MAX_CHARS`).
    #[serde(default = "default_mention_name_max_chars")]
    pub mention_name_max_chars: usize,
    /// Reaper wake interval (`REAPER_INTERVAL_SECS`).
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    /// How long broadcast messages are kept before deletion (`RETENTION_SECS`).
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Expired messages reaped per tick (`REAPER_BATCH_SIZE`).
    #[serde(default = "default_reaper_batch_size")]
    pub reaper_batch_size: usize,
    /// Delay between membership queries during a sweep (`SWEEP_PACE_MS`).
    #[serde(default = "default_sweep_pace_ms")]
    pub sweep_pace_ms: u64,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            telegram_api_url: default_telegram_api_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            db_endpoint: default_db_endpoint(),
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            db_username: String::new(),
            db_password: String::new(),
            broadcast_chunk_size: default_broadcast_chunk_size(),
            mention_name_max_chars: default_mention_name_max_chars(),
            reaper_interval_secs: default_reaper_interval_secs(),
            retention_secs: default_retention_secs(),
            reaper_batch_size: default_reaper_batch_size(),
            sweep_pace_ms: default_sweep_pace_ms(),
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("EVERYONE_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize::<ConfigInner>()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Checks the bounds of the tunables.
    pub fn validate(&self) -> Void {
        if self.telegram_token.is_empty() {
            return Err(anyhow::anyhow!("Telegram token must be set."));
        }

        if self.broadcast_chunk_size < 1 {
            return Err(anyhow::anyhow!("Broadcast chunk size must be at least 1."));
        }

        if self.mention_name_max_chars < 1 {
            return Err(anyhow::anyhow!("Mention name length must be at least 1."));
        }

        if self.reaper_interval_secs < 1 || self.retention_secs < 1 || self.reaper_batch_size < 1 {
            return Err(anyhow::anyhow!("Reaper interval, retention and batch size must be at least 1."));
        }

        if self.poll_timeout_secs > 50 {
            return Err(anyhow::anyhow!("Poll timeout must be at most 50 seconds."));
        }

        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn sweep_pace(&self) -> Duration {
        Duration::from_millis(self.sweep_pace_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}
