//! Node configuration.
//!
//! Stored as JSON. Every field has a default, so a config file only needs the
//! values it changes.

use std::path::Path;
use std::time::Duration;

use gossip_p2p::{Difficulty, EngineConfig};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Configuration of one gossip node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// Address peers connect to; also the address announced to the network.
    pub p2p_address: String,
    /// Address local applications connect to.
    pub api_address: String,
    /// Base URL of the bootstrap service.
    pub bootstrap_url: String,
    /// Proof-of-work difficulty in leading zero hex digits, at most
    /// [`Difficulty::MAX`]. Every gossiped message is stamped with it.
    pub difficulty: u8,
    /// Number of message IDs kept for duplicate suppression.
    pub cache_size: usize,
    /// Maximum number of known peers.
    pub degree: usize,
    /// Number of peers each message is forwarded to.
    pub fanout: usize,
    /// TTL of join and leave announcements.
    pub join_ttl: i32,
    /// Seconds between peer-list requests to a seed node.
    pub peer_list_interval_secs: u64,
    /// Seconds between heartbeats to the bootstrap service.
    pub heartbeat_interval_secs: u64,
    /// Seconds between re-fetches of the bootstrap peer view, if enabled.
    pub bootstrap_refresh_interval_secs: Option<u64>,
    /// Seconds a peer connection may take to deliver its message.
    pub read_timeout_secs: u64,
    /// Capacity of the queue between the API server and the engine.
    pub announce_queue_size: usize,
    /// Capacity of the queue carrying notifications to subscribers.
    pub notification_queue_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            p2p_address: "127.0.0.1:7001".to_string(),
            api_address: "127.0.0.1:7002".to_string(),
            bootstrap_url: "http://127.0.0.1:8080".to_string(),
            difficulty: 4,
            cache_size: 1_000,
            degree: 30,
            fanout: 2,
            join_ttl: 5,
            peer_list_interval_secs: 60,
            heartbeat_interval_secs: 60,
            bootstrap_refresh_interval_secs: None,
            read_timeout_secs: 5,
            announce_queue_size: 64,
            notification_queue_size: 256,
        }
    }
}

impl NodeConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodeError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or a value is out of range.
    pub fn from_json(content: &str) -> Result<Self, NodeError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| NodeError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NodeError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| NodeError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.p2p_address.is_empty() {
            return Err(NodeError::Config("p2p_address cannot be empty".to_string()));
        }
        if self.api_address.is_empty() {
            return Err(NodeError::Config("api_address cannot be empty".to_string()));
        }
        if !self.bootstrap_url.starts_with("http://") {
            return Err(NodeError::Config(
                "bootstrap_url must start with http://".to_string(),
            ));
        }
        if self.difficulty > Difficulty::MAX {
            return Err(NodeError::Config(format!(
                "difficulty cannot exceed {}",
                Difficulty::MAX
            )));
        }
        if self.fanout == 0 {
            return Err(NodeError::Config("fanout must be greater than zero".to_string()));
        }
        if self.degree == 0 {
            return Err(NodeError::Config("degree must be greater than zero".to_string()));
        }
        if self.cache_size == 0 {
            return Err(NodeError::Config(
                "cache_size must be greater than zero".to_string(),
            ));
        }
        if self.join_ttl < 1 {
            return Err(NodeError::Config("join_ttl must be at least 1".to_string()));
        }
        if self.peer_list_interval_secs == 0 || self.heartbeat_interval_secs == 0 {
            return Err(NodeError::Config(
                "ticker intervals must be greater than zero".to_string(),
            ));
        }
        if self.bootstrap_refresh_interval_secs == Some(0) {
            return Err(NodeError::Config(
                "bootstrap_refresh_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(NodeError::Config(
                "read_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.announce_queue_size == 0 || self.notification_queue_size == 0 {
            return Err(NodeError::Config(
                "queue sizes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the difficulty is out of range.
    pub fn engine_config(&self) -> Result<EngineConfig, NodeError> {
        let difficulty = Difficulty::new(self.difficulty)?;
        Ok(EngineConfig::default()
            .with_fanout(self.fanout)
            .with_degree(self.degree)
            .with_cache_size(self.cache_size)
            .with_difficulty(difficulty)
            .with_join_ttl(self.join_ttl))
    }

    /// Interval between peer-list requests.
    #[must_use]
    pub const fn peer_list_interval(&self) -> Duration {
        Duration::from_secs(self.peer_list_interval_secs)
    }

    /// Interval between heartbeats.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Interval between bootstrap re-fetches, if enabled.
    #[must_use]
    pub fn bootstrap_refresh_interval(&self) -> Option<Duration> {
        self.bootstrap_refresh_interval_secs.map(Duration::from_secs)
    }

    /// Read timeout for inbound peer connections.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fanout, 2);
        assert_eq!(config.join_ttl, 5);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
        assert!(config.bootstrap_refresh_interval().is_none());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = NodeConfig::from_json(r#"{"p2p_address": "10.0.0.1:9000", "fanout": 4}"#).unwrap();
        assert_eq!(config.p2p_address, "10.0.0.1:9000");
        assert_eq!(config.fanout, 4);
        assert_eq!(config.degree, NodeConfig::default().degree);
    }

    #[test]
    fn invalid_json_is_config_error() {
        assert!(matches!(
            NodeConfig::from_json("{not json"),
            Err(NodeError::Config(_))
        ));
    }

    #[test_case(|c: &mut NodeConfig| c.p2p_address.clear() ; "empty p2p address")]
    #[test_case(|c: &mut NodeConfig| c.api_address.clear() ; "empty api address")]
    #[test_case(|c: &mut NodeConfig| c.bootstrap_url = "ftp://x".to_string() ; "bad bootstrap scheme")]
    #[test_case(|c: &mut NodeConfig| c.difficulty = 9 ; "difficulty too high")]
    #[test_case(|c: &mut NodeConfig| c.difficulty = 64 ; "full digest difficulty")]
    #[test_case(|c: &mut NodeConfig| c.fanout = 0 ; "zero fanout")]
    #[test_case(|c: &mut NodeConfig| c.degree = 0 ; "zero degree")]
    #[test_case(|c: &mut NodeConfig| c.cache_size = 0 ; "zero cache")]
    #[test_case(|c: &mut NodeConfig| c.join_ttl = 0 ; "zero join ttl")]
    #[test_case(|c: &mut NodeConfig| c.heartbeat_interval_secs = 0 ; "zero heartbeat")]
    #[test_case(|c: &mut NodeConfig| c.bootstrap_refresh_interval_secs = Some(0) ; "zero refresh")]
    #[test_case(|c: &mut NodeConfig| c.announce_queue_size = 0 ; "zero announce queue")]
    fn validate_rejects(mutate: fn(&mut NodeConfig)) {
        let mut config = NodeConfig::default();
        mutate(&mut config);
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gossipd.json");

        let config = NodeConfig {
            bootstrap_refresh_interval_secs: Some(120),
            difficulty: 2,
            ..NodeConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(NodeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_missing_file_names_path() {
        let err = NodeConfig::load("/nonexistent/gossipd.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gossipd.json"));
    }

    #[test]
    fn engine_config_carries_values() {
        let config = NodeConfig {
            fanout: 3,
            degree: 9,
            difficulty: 1,
            ..NodeConfig::default()
        };
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.fanout, 3);
        assert_eq!(engine.degree, 9);
        assert_eq!(engine.difficulty.zeros(), 1);
    }
}
