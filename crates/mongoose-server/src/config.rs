//! Gateway configuration

use clap::ValueEnum;
use mongoose_mongodb::{Connector, MemoryConnector, MongoConnector, PoolConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Where connections lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    /// Real MongoDB servers
    #[default]
    Mongodb,
    /// In-process store; nothing persists
    Memory,
}

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1:27080)
    pub bind_addr: SocketAddr,
    /// Timeout for establishing a connection (default: 2s)
    pub connect_timeout: Duration,
    /// Documents per batch when a request gives no `batch_size` (default: 15)
    pub default_batch_size: usize,
    /// Maximum request body size in bytes (default: 10MB)
    pub max_body_bytes: usize,
    pub backend: BackendKind,
    /// Maximum connections per MongoDB client pool (default: driver default)
    pub max_pool_size: Option<u32>,
    /// Idle time after which pooled connections are closed (default: none)
    pub max_idle_time: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 27080)),
            connect_timeout: Duration::from_secs(2),
            default_batch_size: 15,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            backend: BackendKind::default(),
            max_pool_size: None,
            max_idle_time: None,
        }
    }
}

impl ServerConfig {
    /// Create a new server config with bind address
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = size;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn max_pool_size(mut self, size: Option<u32>) -> Self {
        self.max_pool_size = size;
        self
    }

    pub fn max_idle_time(mut self, idle: Option<Duration>) -> Self {
        self.max_idle_time = idle;
        self
    }

    /// Pool settings handed to every MongoDB client
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_pool_size: self.max_pool_size,
            max_idle_time: self.max_idle_time,
            ..PoolConfig::default()
        }
    }

    /// Build the connector for the configured backend
    pub fn connector(&self) -> Arc<dyn Connector> {
        match self.backend {
            BackendKind::Mongodb => Arc::new(MongoConnector::with_config(self.pool_config())),
            BackendKind::Memory => Arc::new(MemoryConnector::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:27080");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.default_batch_size, 15);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.backend, BackendKind::Mongodb);
        assert_eq!(config.max_pool_size, None);
        assert_eq!(config.max_idle_time, None);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new("0.0.0.0:8080".parse().unwrap())
            .connect_timeout(Duration::from_millis(500))
            .default_batch_size(50)
            .max_body_bytes(1024)
            .backend(BackendKind::Memory);

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.default_batch_size, 50);
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.backend, BackendKind::Memory);
    }

    #[test]
    fn test_pool_settings_reach_pool_config() {
        let config = ServerConfig::default()
            .max_pool_size(Some(20))
            .max_idle_time(Some(Duration::from_secs(60)));

        let pool = config.pool_config();
        assert_eq!(pool.max_pool_size, Some(20));
        assert_eq!(pool.max_idle_time, Some(Duration::from_secs(60)));
        assert_eq!(pool.app_name.as_deref(), Some("mongoose"));

        let defaults = ServerConfig::default().pool_config();
        assert_eq!(defaults.max_pool_size, None);
        assert_eq!(defaults.max_idle_time, None);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(BackendKind::from_str("memory", true), Ok(BackendKind::Memory));
        assert_eq!(BackendKind::from_str("mongodb", true), Ok(BackendKind::Mongodb));
        assert!(BackendKind::from_str("redis", true).is_err());
    }
}
