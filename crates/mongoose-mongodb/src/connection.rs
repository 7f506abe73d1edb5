//! Named connection registry and server address parsing

use mongoose_common::GatewayError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::backend::{Connection, Connector};

/// Connection name used when a request does not give one
pub const DEFAULT_CONNECTION_NAME: &str = "default";

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_PORT: u16 = 27017;

/// Initial connect timeout (default: 2s)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host[:port]` string.
    ///
    /// Never fails: an empty host yields `localhost:27017`, and a missing or
    /// non-numeric port yields 27017. Trailing junk after the port digits is
    /// ignored.
    pub fn parse(server: &str) -> Self {
        let (host, port) = match server.split_once(':') {
            Some((host, rest)) => (host, leading_port(rest)),
            None => (server, None),
        };

        if host.is_empty() {
            return Self::default();
        }

        Self::new(host, port.unwrap_or(DEFAULT_PORT))
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn leading_port(rest: &str) -> Option<u16> {
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

type ConnectionSlot = Arc<OnceCell<Arc<dyn Connection>>>;

/// Process-wide map from connection name to an established connection.
///
/// A name is bound at most once. Later lookups return the same connection
/// no matter what address they pass; a failed connect binds nothing, so a
/// later request may try again.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    slots: Mutex<HashMap<String, ConnectionSlot>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Set the initial connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Return the connection bound to `name` without connecting
    pub fn lookup(&self, name: Option<&str>) -> Option<Arc<dyn Connection>> {
        let name = name.unwrap_or(DEFAULT_CONNECTION_NAME);
        self.slots
            .lock()
            .get(name)
            .and_then(|slot| slot.get().cloned())
    }

    /// Return the connection bound to `name`, connecting to `host:port` if
    /// there is none yet.
    ///
    /// With no `host` this is a plain lookup. `port` defaults to 27017.
    /// Concurrent callers for the same name share one connect attempt.
    pub async fn get(
        &self,
        name: Option<&str>,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Option<Arc<dyn Connection>> {
        if let Some(connection) = self.lookup(name) {
            return Some(connection);
        }

        let name = name.unwrap_or(DEFAULT_CONNECTION_NAME);
        let address = ServerAddress::new(host?, port.unwrap_or(DEFAULT_PORT));

        let slot = self
            .slots
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();

        let result = slot
            .get_or_try_init(|| async {
                let connection = self
                    .connector
                    .connect(&address, self.connect_timeout)
                    .await?;
                info!(connection = name, %address, "connection established");
                Ok::<_, GatewayError>(connection)
            })
            .await;

        match result {
            Ok(connection) => Some(connection.clone()),
            Err(e) => {
                warn!(connection = name, %address, error = %e, "could not connect");
                None
            }
        }
    }

    /// Names with an established connection
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
