//! Configuration types for Squall

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// This node's name; must match the name peers address it by
    pub node_name: String,

    /// Address to listen on
    pub listen_addr: String,

    /// HTTP port for the remote search control surface
    pub http_port: u16,

    /// Peer nodes: node name -> base URL (e.g. "http://node2:8080")
    #[serde(default)]
    pub peers: HashMap<String, String>,

    /// Search execution configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Remote search protocol configuration
    #[serde(default)]
    pub remote: RemoteProtocolConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_name: "node1".to_string(),
            listen_addr: "0.0.0.0".to_string(),
            http_port: 8080,
            peers: HashMap::new(),
            search: SearchConfig::default(),
            remote: RemoteProtocolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate the configuration. Fatal problems are returned as
    /// `Err(Vec<String>)`; the server refuses to start on any of them.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.node_name.is_empty() {
            errors.push("node_name must not be empty".to_string());
        }

        if let Err(e) = self.search.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.remote.validate() {
            errors.extend(e);
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Search execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum concurrent shard search workers per node task
    #[serde(default = "default_max_threads_per_task")]
    pub max_threads_per_task: usize,

    /// Capacity of the bounded handoff queue between shard searches and
    /// the extraction step
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
}

fn default_max_threads_per_task() -> usize {
    4
}

fn default_handoff_capacity() -> usize {
    1024
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_threads_per_task: default_max_threads_per_task(),
            handoff_capacity: default_handoff_capacity(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.max_threads_per_task == 0 {
            errors.push("search.max_threads_per_task must be at least 1".to_string());
        }
        if self.handoff_capacity == 0 {
            errors.push("search.handoff_capacity must be at least 1".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Remote search protocol configuration (client and server side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProtocolConfig {
    /// Delay between poll requests on the client side
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Bounded wait for new completion state inside one server-side poll
    #[serde(default = "default_poll_wait", with = "humantime_serde")]
    pub poll_wait: Duration,

    /// Idle time after which a remote search handle is evicted
    #[serde(default = "default_handle_ttl", with = "humantime_serde")]
    pub handle_ttl: Duration,

    /// Interval between eviction sweeps
    #[serde(default = "default_evict_interval", with = "humantime_serde")]
    pub evict_interval: Duration,

    /// Maximum number of cached remote search handles
    #[serde(default = "default_handle_capacity")]
    pub handle_capacity: usize,

    /// Connect timeout for remote protocol requests
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Overall timeout for one remote protocol request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_poll_wait() -> Duration {
    Duration::from_secs(1)
}

fn default_handle_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_evict_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_handle_capacity() -> usize {
    256
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for RemoteProtocolConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            poll_wait: default_poll_wait(),
            handle_ttl: default_handle_ttl(),
            evict_interval: default_evict_interval(),
            handle_capacity: default_handle_capacity(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl RemoteProtocolConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.handle_capacity == 0 {
            errors.push("remote.handle_capacity must be at least 1".to_string());
        }
        if self.poll_wait > self.handle_ttl {
            errors.push("remote.poll_wait must not exceed remote.handle_ttl".to_string());
        }
        if self.evict_interval > self.handle_ttl {
            errors.push("remote.evict_interval must not exceed remote.handle_ttl".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level filter
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = ServerConfig::default();
        config.search.max_threads_per_task = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("max_threads_per_task")));
    }

    #[test]
    fn test_validate_rejects_poll_wait_above_ttl() {
        let mut config = ServerConfig::default();
        config.remote.poll_wait = Duration::from_secs(120);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_humantime() {
        let toml = r#"
            node_name = "node2"
            listen_addr = "0.0.0.0"
            http_port = 8081

            [remote]
            poll_interval = "250ms"
            handle_ttl = "2m"
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.remote.poll_interval, Duration::from_millis(250));
        assert_eq!(config.remote.handle_ttl, Duration::from_secs(120));
        assert_eq!(config.search.max_threads_per_task, 4);
    }
}
