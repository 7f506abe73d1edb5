//! Process-wide gateway state

use mongoose_mongodb::{ConnectionRegistry, Connector, CursorRegistry};
use std::sync::Arc;

use crate::config::ServerConfig;

/// Registries shared by every request
pub struct AppState {
    pub connections: ConnectionRegistry,
    pub cursors: CursorRegistry,
    pub default_batch_size: usize,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(connector: Arc<dyn Connector>, config: &ServerConfig) -> Self {
        Self {
            connections: ConnectionRegistry::new(connector)
                .with_connect_timeout(config.connect_timeout),
            cursors: CursorRegistry::new(),
            default_batch_size: config.default_batch_size,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
