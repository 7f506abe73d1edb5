//! MongoDB driver binding

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb::error::{Error as DriverError, ErrorKind, WriteFailure};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Cursor};
use mongoose_common::{GatewayError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::{
    command_failure, Connection, Connector, InsertOutcome, Namespace, ResultCursor, WriteStatus,
};
use crate::connection::ServerAddress;
use crate::query::{FindQuery, UpdateSpec};

/// Client pool configuration applied to every connection
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool (default: driver default)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: None,
            max_idle_time: None,
            app_name: Some("mongoose".to_string()),
        }
    }
}

/// Connects to MongoDB servers
#[derive(Debug, Clone, Default)]
pub struct MongoConnector {
    config: PoolConfig,
}

impl MongoConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(
        &self,
        address: &ServerAddress,
        timeout: Duration,
    ) -> Result<Arc<dyn Connection>> {
        let uri = format!("mongodb://{}", address);
        let mut client_options = ClientOptions::parse(uri.as_str())
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        // The same short timeout bounds the socket connect and server discovery
        client_options.connect_timeout = Some(timeout);
        client_options.server_selection_timeout = Some(timeout);

        if let Some(max) = self.config.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = self.config.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(app) = &self.config.app_name {
            client_options.app_name = Some(app.clone());
        }

        let client = Client::with_options(client_options)
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        // The client connects lazily; ping so an unreachable server fails here.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatewayError::Connection(format!("Ping failed: {}", e)))?;

        Ok(Arc::new(MongoConnection {
            client,
            address: address.clone(),
        }))
    }
}

/// An established MongoDB client
pub struct MongoConnection {
    client: Client,
    address: ServerAddress,
}

impl MongoConnection {
    fn collection(&self, namespace: &Namespace) -> Collection<Document> {
        self.client
            .database(&namespace.db)
            .collection(&namespace.collection)
    }
}

#[async_trait]
impl Connection for MongoConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn run_command(&self, db: &str, command: Document) -> Result<Document> {
        match self.client.database(db).run_command(command).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if let ErrorKind::Command(failure) = err.kind.as_ref() {
                    return Ok(command_failure(
                        failure.message.clone(),
                        failure.code,
                        failure.code_name.clone(),
                    ));
                }
                Err(err.into())
            }
        }
    }

    async fn find(&self, namespace: &Namespace, query: FindQuery) -> Result<Box<dyn ResultCursor>> {
        let FindQuery {
            filter,
            projection,
            sort,
            skip,
            limit,
        } = query;

        let collection = self.collection(namespace);
        let mut find = collection.find(filter);
        if let Some(projection) = projection {
            find = find.projection(projection);
        }
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        if skip > 0 {
            find = find.skip(skip);
        }
        if limit != 0 {
            find = find.limit(limit);
        }

        let cursor = find.await?;
        debug!(%namespace, "query opened");
        Ok(Box::new(MongoCursor { cursor }))
    }

    async fn insert(&self, namespace: &Namespace, docs: Vec<Document>) -> Result<InsertOutcome> {
        if docs.is_empty() {
            return Ok(InsertOutcome {
                ids: Vec::new(),
                status: WriteStatus::acknowledged(0),
            });
        }

        match self.collection(namespace).insert_many(docs).await {
            Ok(result) => {
                let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
                ids.sort_by_key(|(index, _)| *index);
                let ids: Vec<Bson> = ids.into_iter().map(|(_, id)| id).collect();
                let status = WriteStatus::acknowledged(ids.len() as u64);
                Ok(InsertOutcome { ids, status })
            }
            Err(err) => Ok(InsertOutcome {
                ids: Vec::new(),
                status: write_failure(err)?,
            }),
        }
    }

    async fn update(&self, namespace: &Namespace, spec: UpdateSpec) -> Result<WriteStatus> {
        let replacement = spec.is_replacement();
        let UpdateSpec {
            criteria,
            update,
            upsert,
            multi,
        } = spec;
        let collection = self.collection(namespace);

        let outcome = if replacement {
            collection.replace_one(criteria, update).upsert(upsert).await
        } else if multi {
            collection.update_many(criteria, update).upsert(upsert).await
        } else {
            collection.update_one(criteria, update).upsert(upsert).await
        };

        match outcome {
            Ok(result) => {
                let upserted = result.upserted_id.is_some();
                let n = result.matched_count + u64::from(upserted);
                let mut status =
                    WriteStatus::acknowledged(n).with_updated_existing(result.matched_count > 0);
                if let Some(id) = result.upserted_id {
                    status = status.with_upserted(id);
                }
                Ok(status)
            }
            Err(err) => write_failure(err),
        }
    }

    async fn remove(&self, namespace: &Namespace, criteria: Document) -> Result<WriteStatus> {
        match self.collection(namespace).delete_many(criteria).await {
            Ok(result) => Ok(WriteStatus::acknowledged(result.deleted_count)),
            Err(err) => write_failure(err),
        }
    }
}

/// Fold a server-side write rejection into a status; anything else is an error
fn write_failure(err: DriverError) -> Result<WriteStatus> {
    let status = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => {
            Some(WriteStatus::failed(e.message.clone(), Some(e.code)))
        }
        ErrorKind::Write(WriteFailure::WriteConcernError(e)) => {
            Some(WriteStatus::failed(e.message.clone(), Some(e.code)))
        }
        ErrorKind::InsertMany(_) => Some(WriteStatus::failed(err.to_string(), None)),
        ErrorKind::Command(e) => Some(WriteStatus::failed(e.message.clone(), Some(e.code))),
        _ => None,
    };

    match status {
        Some(status) => Ok(status),
        None => Err(err.into()),
    }
}

/// Driver cursor behind the `ResultCursor` seam
pub struct MongoCursor {
    cursor: Cursor<Document>,
}

#[async_trait]
impl ResultCursor for MongoCursor {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        if self.cursor.advance().await? {
            Ok(Some(self.cursor.deserialize_current()?))
        } else {
            Ok(None)
        }
    }
}
