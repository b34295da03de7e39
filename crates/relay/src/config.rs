//! Process configuration, read once from the environment before the pipeline starts.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Where a consumer group with no committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(ConfigError::Invalid {
                key: "KAFKA_OFFSET_RESET",
                reason: format!("expected earliest or latest, got {:?}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KafkaConfig {
    pub broker: String,
    pub topic: String,
    pub group_id: String,
    pub offset_reset: OffsetReset,
}

/// The part of the configuration the relay policy reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Empty means every origin is relayed.
    pub origin_filter: String,
    pub endpoint: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub relay: RelayConfig,
    /// Bearer token for the downstream API, may be empty
    pub api_token: String,
    /// Instance name used in logs and metric labels
    pub instance_name: String,
    pub log_level: String,
    pub health_addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset and empty keys take their
    /// defaults, except `ORIGIN`, where an empty value disables the filter.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let offset_reset = OffsetReset::parse(&var("KAFKA_OFFSET_RESET", "latest"))?;

        let kafka = KafkaConfig {
            broker: var("KAFKA_BROKER", "localhost:9092"),
            topic: var("KAFKA_TOPIC", "anyker-topic"),
            group_id: var("KAFKA_GROUP_ID", "anyker-group"),
            offset_reset,
        };

        let request_timeout = lookup("HTTP_CLIENT_TIMEOUT")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        let relay = RelayConfig {
            origin_filter: lookup("ORIGIN").unwrap_or_else(|| "telegram".to_string()),
            endpoint: var("API_ENDPOINT", "http://localhost:8080/messages"),
            request_timeout,
        };

        let health_addr = var("HEALTH_ADDR", "0.0.0.0:9090");
        let health_addr = health_addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            key: "HEALTH_ADDR",
            reason: format!("{}: {}", health_addr, e),
        })?;

        Ok(Self {
            kafka,
            relay,
            api_token: var("API_TOKEN", ""),
            instance_name: var("NANOBOT_NAME", "anyker-nanobot-1"),
            log_level: normalize_log_level(&var("LOG_LEVEL", "info")),
            health_addr,
        })
    }
}

/// Lowercase a level name for `EnvFilter`. `fatal` and `panic` collapse to
/// `error`; anything else unknown becomes `info`.
pub fn normalize_log_level(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => level,
        "fatal" | "panic" => "error".to_string(),
        _ => "info".to_string(),
    }
}
