//! Process configuration: defaults, `MAEGASHIRA_*` environment overrides,
//! and routing-table file loading.

use crate::config::validation::{parse_table, TableIssue};
use crate::models::route::RoutingTable;
use log::debug;
use serde::Deserialize;
use std::env;

/// Redis connection settings for the post-transaction sink.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}

impl RedisSettings {
    /// Connection URL in the `redis://` scheme.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/", password, self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

/// Management API listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub enabled: bool,
    pub hostname: String,
    pub port: u16,
    /// Bearer token required on the protected endpoints.
    pub key: String,
}

/// Service-discovery strategy run by the primary controller.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DiscoverySettings {
    None,
    Docker {
        #[serde(default = "default_refresh_interval_ms")]
        refresh_interval_ms: u64,
        #[serde(default = "default_docker_socket")]
        socket_path: String,
    },
}

fn default_refresh_interval_ms() -> u64 {
    10_000
}

fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

/// Complete process configuration.
///
/// Precedence is CLI flags over environment variables over built-in
/// defaults; the CLI applies its overrides on top of [`Settings::from_env`].
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Public listener bind address.
    pub hostname: String,
    /// Public listener port.
    pub port: u16,
    /// Worker count; `0` means one per available CPU.
    pub workers: usize,
    /// Default upstream deadline in milliseconds.
    pub timeout_ms: u64,
    /// Drain window for in-flight requests at shutdown.
    pub grace_period_ms: u64,
    /// Enables the Redis-backed post-transaction queue.
    pub clustering: bool,
    /// Log level name (`trace` to `off`), taken from `MAEGASHIRA_LOG_LEVEL`
    /// with `RUST_LOG` as the fallback.
    pub log_level: String,
    pub redis: RedisSettings,
    pub api: ApiSettings,
    pub discovery: DiscoverySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8080,
            workers: 0,
            timeout_ms: 5000,
            grace_period_ms: 500,
            clustering: false,
            log_level: "info".to_string(),
            redis: RedisSettings {
                host: "127.0.0.1".to_string(),
                port: 6379,
                password: None,
            },
            api: ApiSettings {
                enabled: false,
                hostname: "127.0.0.1".to_string(),
                port: 8081,
                key: String::new(),
            },
            discovery: DiscoverySettings::None,
        }
    }
}

impl Settings {
    /// Builds settings from defaults overridden by `MAEGASHIRA_*` variables.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();

        if let Some(hostname) = env_string("MAEGASHIRA_HOSTNAME") {
            settings.hostname = hostname;
        }
        if let Some(port) = env_parsed("MAEGASHIRA_PORT") {
            settings.port = port;
        }
        if let Some(clustering) = env_bool("MAEGASHIRA_CLUSTERING") {
            settings.clustering = clustering;
        }
        if let Some(host) = env_string("MAEGASHIRA_REDIS_HOST") {
            settings.redis.host = host;
        }
        if let Some(port) = env_parsed("MAEGASHIRA_REDIS_PORT") {
            settings.redis.port = port;
        }
        if let Some(password) = env_string("MAEGASHIRA_REDIS_PASSWORD") {
            settings.redis.password = Some(password);
        }
        if let Some(enabled) = env_bool("MAEGASHIRA_API_ENABLED") {
            settings.api.enabled = enabled;
        }
        if let Some(hostname) = env_string("MAEGASHIRA_API_HOSTNAME") {
            settings.api.hostname = hostname;
        }
        if let Some(port) = env_parsed("MAEGASHIRA_API_PORT") {
            settings.api.port = port;
        }
        if let Some(key) = env_string("MAEGASHIRA_API_KEY") {
            settings.api.key = key;
        }
        if let Some(level) = env_string("MAEGASHIRA_LOG_LEVEL").or_else(|| env_string("RUST_LOG"))
        {
            settings.log_level = level;
        }
        if let Some(timeout) = env_parsed("MAEGASHIRA_TIMEOUT") {
            settings.timeout_ms = timeout;
        }

        settings
    }

    /// Whether transaction response headers should be emitted.
    pub fn debug_headers(&self) -> bool {
        matches!(self.log_level.to_ascii_lowercase().as_str(), "debug" | "trace")
    }
}

/// Failure to produce a routing table from a file.
#[derive(Debug, thiserror::Error)]
pub enum TableFileError {
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} failed validation with {} issue(s)", .issues.len())]
    Invalid { path: String, issues: Vec<TableIssue> },
}

/// Loads and validates a routing-table file (a JSON array of routes).
pub fn load_table_file(path: &str) -> Result<RoutingTable, TableFileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| TableFileError::Unreadable {
        path: path.to_string(),
        source,
    })?;

    let candidate: serde_json::Value =
        serde_json::from_str(&contents).map_err(|source| TableFileError::Malformed {
            path: path.to_string(),
            source,
        })?;

    let table = parse_table(candidate).map_err(|issues| TableFileError::Invalid {
        path: path.to_string(),
        issues,
    })?;

    debug!("loaded routing table with {} route(s) from {}", table.len(), path);
    Ok(table)
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|value| {
        matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
