//! # Config
//!
//! `qy-hub.toml`. Every section and key is optional; a missing file means all
//! defaults. Configuration is read once at startup and shared read-only.

use crate::suggest::scope::UnreadableStreams;
use qy_core::{PrefixCase, DEFAULT_LIMIT, DEFAULT_RANGE_SECS};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Default, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub suggest: SuggestConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub failures: FailureConfig,
    /// Streams registered at startup.
    #[serde(default)]
    pub streams: Vec<SeedStream>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct SuggestConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_range_secs")]
    pub default_range_secs: i64,
    #[serde(default)]
    pub prefix_case: PrefixCase,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
    #[serde(default)]
    pub unreadable_streams: UnreadableStreams,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            max_limit: 100,
            default_range_secs: DEFAULT_RANGE_SECS,
            prefix_case: PrefixCase::Sensitive,
            query_timeout_ms: 5_000,
            unreadable_streams: UnreadableStreams::Drop,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct IndexConfig {
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default = "default_shard_capacity")]
    pub shard_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            shards: 4,
            shard_capacity: 100_000,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct FailureConfig {
    #[serde(default = "default_failure_capacity")]
    pub capacity: usize,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self { capacity: 1_000 }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct SeedStream {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}
fn default_limit() -> usize {
    DEFAULT_LIMIT
}
fn default_max_limit() -> usize {
    100
}
fn default_range_secs() -> i64 {
    DEFAULT_RANGE_SECS
}
fn default_query_timeout() -> u64 {
    5_000
}
fn default_shards() -> usize {
    4
}
fn default_shard_capacity() -> usize {
    100_000
}
fn default_failure_capacity() -> usize {
    1_000
}

impl Config {
    /// Load from `path`. A missing file yields defaults; an unreadable or
    /// unparsable one is logged and also yields defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                return Self::default();
            }
        };
        match Self::parse(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Clamp values that would make the service unusable.
    fn normalize(&mut self) {
        let suggest = &mut self.suggest;
        if suggest.max_limit == 0 {
            tracing::warn!("suggest.max_limit must be positive, using 100");
            suggest.max_limit = 100;
        }
        if suggest.limit == 0 || suggest.limit > suggest.max_limit {
            let clamped = suggest.limit.clamp(1, suggest.max_limit);
            tracing::warn!("suggest.limit {} out of range, using {}", suggest.limit, clamped);
            suggest.limit = clamped;
        }
        if suggest.default_range_secs <= 0 {
            tracing::warn!(
                "suggest.default_range_secs must be positive, using {}",
                DEFAULT_RANGE_SECS
            );
            suggest.default_range_secs = DEFAULT_RANGE_SECS;
        }
        if suggest.query_timeout_ms == 0 {
            suggest.query_timeout_ms = default_query_timeout();
        }
        if self.index.shards == 0 {
            self.index.shards = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.suggest.limit, 20);
        assert_eq!(config.suggest.default_range_secs, 300);
        assert_eq!(config.suggest.prefix_case, PrefixCase::Sensitive);
        assert_eq!(config.suggest.unreadable_streams, UnreadableStreams::Drop);
        assert_eq!(config.index.shards, 4);
        assert!(config.streams.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [suggest]
            limit = 10
            prefix_case = "insensitive"
            unreadable_streams = "reject"
            query_timeout_ms = 250

            [index]
            shards = 8

            [[streams]]
            id = "web"
            title = "Web servers"

            [[streams]]
            id = "db"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.suggest.limit, 10);
        assert_eq!(config.suggest.prefix_case, PrefixCase::Insensitive);
        assert_eq!(config.suggest.unreadable_streams, UnreadableStreams::Reject);
        assert_eq!(config.suggest.query_timeout_ms, 250);
        assert_eq!(config.index.shards, 8);
        assert_eq!(config.index.shard_capacity, 100_000);
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[0].title.as_deref(), Some("Web servers"));
    }

    #[test]
    fn test_out_of_range_values_normalized() {
        let config = Config::parse(
            r#"
            [suggest]
            limit = 500
            max_limit = 50
            default_range_secs = -1

            [index]
            shards = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.suggest.limit, 50);
        assert_eq!(config.suggest.default_range_secs, 300);
        assert_eq!(config.index.shards, 1);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(Config::parse("[suggest\nlimit = ").is_err());
        assert!(Config::parse("[suggest]\nprefix_case = \"sometimes\"").is_err());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = Config::load(Path::new("/nonexistent/qy-hub.toml"));
        assert_eq!(config.suggest.limit, 20);
    }
}
