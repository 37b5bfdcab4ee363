//! Client Configuration

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// Default cap on idle pooled connections
pub const DEFAULT_MAX_IDLE: usize = 16;

/// Configuration for the client and its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or IP
    pub host: String,
    /// Server port
    pub port: u16,
    /// Maximum idle connections kept for reuse. Connections released into a
    /// full pool are closed.
    pub max_idle: usize,
    /// Optional TCP connect timeout (used by the TCP engine)
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_idle: DEFAULT_MAX_IDLE,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for `host:port` with every other setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Returns the server address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:6379");
        assert_eq!(config.max_idle, DEFAULT_MAX_IDLE);
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn test_new_keeps_other_defaults() {
        let config = ClientConfig::new("redis.local", 6380);
        assert_eq!(config.addr(), "redis.local:6380");
        assert_eq!(config.max_idle, DEFAULT_MAX_IDLE);
    }
}
