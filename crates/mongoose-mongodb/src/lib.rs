//! MongoDB command layer for mongoose
//!
//! This crate holds everything between an HTTP parameter and the database
//! driver.
//!
//! # Features
//! - JSON parameter decoding with explicit field ordering (`$pyhint`)
//! - Named, lazily established connections
//! - Server-side cursors paged across requests
//! - A driver seam with a MongoDB binding and an in-process store

pub mod backend;
pub mod connection;
pub mod cursor;
pub mod document;
pub mod memory;
pub mod mongo;
pub mod query;

pub use backend::{Connection, Connector, InsertOutcome, Namespace, ResultCursor, WriteStatus};
pub use connection::{ConnectionRegistry, ServerAddress, DEFAULT_CONNECTION_NAME};
pub use cursor::{CursorEntry, CursorId, CursorRegistry, SharedCursor};
pub use document::{decode, decode_many, encode};
pub use memory::MemoryConnector;
pub use mongo::{MongoConnector, PoolConfig};
pub use mongoose_common::{GatewayError, Result};
pub use query::{FindQuery, UpdateSpec};
