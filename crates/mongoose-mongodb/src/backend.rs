//! Driver seam
//!
//! The gateway talks to a database only through these traits. `mongo` binds
//! them to the MongoDB driver; `memory` implements them over in-process maps.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongoose_common::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::ServerAddress;
use crate::query::{FindQuery, UpdateSpec};

/// A `db.collection` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// Establishes connections to a database server
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `address`, giving up after `timeout`
    async fn connect(&self, address: &ServerAddress, timeout: Duration)
        -> Result<Arc<dyn Connection>>;
}

/// An established link to one database server
#[async_trait]
pub trait Connection: Send + Sync {
    /// Address this connection was established against
    fn address(&self) -> &ServerAddress;

    /// Run a database command.
    ///
    /// A command the server rejects is not an error: the reply document
    /// (with `ok: 0`) is returned as-is. `Err` means the server could not be
    /// reached or the driver failed.
    async fn run_command(&self, db: &str, command: Document) -> Result<Document>;

    /// Open a result cursor for a query
    async fn find(&self, namespace: &Namespace, query: FindQuery) -> Result<Box<dyn ResultCursor>>;

    /// Insert documents in order
    async fn insert(&self, namespace: &Namespace, docs: Vec<Document>) -> Result<InsertOutcome>;

    /// Apply an update or replacement
    async fn update(&self, namespace: &Namespace, spec: UpdateSpec) -> Result<WriteStatus>;

    /// Delete every document matching `criteria`
    async fn remove(&self, namespace: &Namespace, criteria: Document) -> Result<WriteStatus>;
}

/// A partially consumed query result
#[async_trait]
pub trait ResultCursor: Send {
    /// Next document, or `None` once the result set is exhausted
    async fn next_document(&mut self) -> Result<Option<Document>>;
}

/// Result of an insert: assigned `_id`s in input order plus the write status
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub ids: Vec<Bson>,
    pub status: WriteStatus,
}

/// Acknowledgement of a single write, shaped like a `getLastError` reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteStatus {
    pub n: u64,
    pub updated_existing: Option<bool>,
    pub upserted: Option<Bson>,
    pub error: Option<String>,
    pub code: Option<i32>,
}

impl WriteStatus {
    /// A successful write touching `n` documents
    pub fn acknowledged(n: u64) -> Self {
        Self {
            n,
            ..Default::default()
        }
    }

    /// A write the server refused
    pub fn failed(message: impl Into<String>, code: Option<i32>) -> Self {
        Self {
            error: Some(message.into()),
            code,
            ..Default::default()
        }
    }

    pub fn with_updated_existing(mut self, updated_existing: bool) -> Self {
        self.updated_existing = Some(updated_existing);
        self
    }

    pub fn with_upserted(mut self, id: Bson) -> Self {
        self.upserted = Some(id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_document(&self) -> Document {
        let mut status = doc! {
            "n": self.n as i64,
            "err": self.error.clone().map_or(Bson::Null, Bson::String),
        };
        if let Some(code) = self.code {
            status.insert("code", code);
        }
        if let Some(updated_existing) = self.updated_existing {
            status.insert("updatedExisting", updated_existing);
        }
        if let Some(id) = &self.upserted {
            status.insert("upserted", id.clone());
        }
        status.insert("ok", 1.0);
        status
    }
}

/// Builds the reply a server sends for a rejected command
pub fn command_failure(message: impl Into<String>, code: i32, code_name: impl Into<String>) -> Document {
    doc! {
        "ok": 0.0,
        "errmsg": message.into(),
        "code": code,
        "codeName": code_name.into(),
    }
}

/// True if a command reply reports failure (`ok` equal to zero)
pub fn is_command_failure(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(ok)) => *ok == 0.0,
        Some(Bson::Int32(ok)) => *ok == 0,
        Some(Bson::Int64(ok)) => *ok == 0,
        Some(Bson::Boolean(ok)) => !*ok,
        _ => false,
    }
}
