//! Static process configuration, loaded once at startup from a TOML
//! file. There is no hot-reload subsystem here (out of scope); a config
//! change means a restart.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Selects the queue backend variant: `true` drains `message_queue`
    /// rows under a leader lock, `false` publishes to Kafka topics.
    #[serde(default)]
    pub mysql_as_mq: bool,

    /// Whether the 30s quota cache sits in front of `source_quota`/
    /// `global_quota` lookups.
    #[serde(default = "default_true")]
    pub open_cache: bool,

    #[serde(default = "default_max_retry")]
    pub max_retry_count: i32,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: String,
    pub redis_url: String,

    #[serde(default = "default_kafka_brokers")]
    pub kafka_brokers: String,
    #[serde(default = "default_kafka_group")]
    pub kafka_group_id: String,

    /// Opaque per-channel vendor credentials, keyed by lowercase channel
    /// name (`"email"`, `"sms"`, `"chat"`). This crate never reads the
    /// values itself; they exist so a caller wiring up adapters has
    /// somewhere to load them from.
    #[serde(default)]
    pub channel_credentials: HashMap<String, HashMap<String, String>>,
}

fn default_true() -> bool {
    true
}

fn default_max_retry() -> i32 {
    3
}

fn default_port() -> u16 {
    8080
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_group() -> String {
    "msgqd".to_string()
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| Error::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let cfg: Config = toml::from_str(
            r#"
            database_url = "postgres://localhost/msgq"
            redis_url = "redis://localhost"
            "#,
        )
        .unwrap();
        assert!(!cfg.mysql_as_mq);
        assert!(cfg.open_cache);
        assert_eq!(cfg.max_retry_count, 3);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn recognized_keys_override_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            mysql_as_mq = true
            open_cache = false
            max_retry_count = 5
            port = 9090
            database_url = "postgres://localhost/msgq"
            redis_url = "redis://localhost"
            "#,
        )
        .unwrap();
        assert!(cfg.mysql_as_mq);
        assert!(!cfg.open_cache);
        assert_eq!(cfg.max_retry_count, 5);
        assert_eq!(cfg.port, 9090);
    }
}
