//! Server configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use nexus_matching::spatial::DEFAULT_RESOLUTION;
use nexus_services::{HubConfig, OverflowPolicy};

const DEV_AUTH_SECRET: &str = "neighbornexus-dev-secret";

/// Everything the server reads from its environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: String,
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub auth_secret: String,
    /// True when `AUTH_SECRET` was not set
    pub using_dev_secret: bool,
    pub hub: HubConfig,
    pub spatial_resolution: u8,
}

impl AppConfig {
    /// Load configuration from the process environment
    ///
    /// Reads:
    /// - SERVER_PORT (8080), STORE_DB_PATH (data/nexus.db)
    /// - OPENAI_API_KEY (optional), EMBEDDING_MODEL
    /// - AUTH_SECRET (falls back to a development secret)
    /// - HUB_QUEUE_CAPACITY, HUB_OVERFLOW, HUB_READ_DEADLINE_SECS,
    ///   HUB_PING_INTERVAL_SECS, HUB_WRITE_DEADLINE_SECS, HUB_MAX_FRAME_BYTES
    /// - SPATIAL_RESOLUTION (8)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = HubConfig::default();
        let read_deadline = Duration::from_secs(parse_or(
            &get,
            "HUB_READ_DEADLINE_SECS",
            defaults.read_deadline.as_secs(),
        )?);
        let ping_interval = Duration::from_secs(parse_or(
            &get,
            "HUB_PING_INTERVAL_SECS",
            defaults.ping_interval.as_secs(),
        )?);
        if ping_interval >= read_deadline {
            return Err(ConfigError::PingInterval {
                ping_secs: ping_interval.as_secs(),
                read_secs: read_deadline.as_secs(),
            });
        }

        let hub = HubConfig {
            queue_capacity: parse_or(&get, "HUB_QUEUE_CAPACITY", defaults.queue_capacity)?,
            overflow: parse_or(&get, "HUB_OVERFLOW", OverflowPolicy::Evict)?,
            read_deadline,
            ping_interval,
            write_deadline: Duration::from_secs(parse_or(
                &get,
                "HUB_WRITE_DEADLINE_SECS",
                defaults.write_deadline.as_secs(),
            )?),
            max_frame_bytes: parse_or(&get, "HUB_MAX_FRAME_BYTES", defaults.max_frame_bytes)?,
            auth_timeout: read_deadline,
        };
        if hub.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "HUB_QUEUE_CAPACITY".to_string(),
                error: "must be at least 1".to_string(),
            });
        }

        let spatial_resolution = parse_or(&get, "SPATIAL_RESOLUTION", DEFAULT_RESOLUTION)?;
        if spatial_resolution > 15 {
            return Err(ConfigError::Invalid {
                field: "SPATIAL_RESOLUTION".to_string(),
                error: format!("{} is outside 0-15", spatial_resolution),
            });
        }

        let auth_secret = get("AUTH_SECRET");
        let using_dev_secret = auth_secret.is_none();

        Ok(Self {
            port: parse_or(&get, "SERVER_PORT", 8080)?,
            db_path: get("STORE_DB_PATH").unwrap_or_else(|| "data/nexus.db".to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            auth_secret: auth_secret.unwrap_or_else(|| DEV_AUTH_SECRET.to_string()),
            using_dev_secret,
            hub,
            spatial_resolution,
        })
    }
}

fn parse_or<T, G>(get: &G, field: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(field) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            field: field.to_string(),
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {error}")]
    Invalid { field: String, error: String },

    #[error("HUB_PING_INTERVAL_SECS ({ping_secs}) must be shorter than HUB_READ_DEADLINE_SECS ({read_secs})")]
    PingInterval { ping_secs: u64, read_secs: u64 },
}
