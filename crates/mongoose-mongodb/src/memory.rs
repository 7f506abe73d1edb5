//! In-process document store
//!
//! Implements the driver seam over plain maps so the gateway can run and be
//! tested without a database server. Matching is top-level equality only;
//! updates understand `$set`, `$unset`, `$inc` and whole-document
//! replacement. Data does not persist.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use mongoose_common::{GatewayError, Result};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    command_failure, Connection, Connector, InsertOutcome, Namespace, ResultCursor, WriteStatus,
};
use crate::connection::ServerAddress;
use crate::query::{FindQuery, UpdateSpec, DESCENDING};

const DUPLICATE_KEY: i32 = 11000;
const FAILED_TO_PARSE: i32 = 9;
const COMMAND_NOT_FOUND: i32 = 59;

/// Hands out connections to in-memory servers, one store per address
#[derive(Default)]
pub struct MemoryConnector {
    stores: Mutex<HashMap<ServerAddress, Arc<MemoryStore>>>,
    refused: HashSet<String>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect to `host` fail, as if nothing listens there
    pub fn refuse_host(mut self, host: impl Into<String>) -> Self {
        self.refused.insert(host.into());
        self
    }

    /// Number of connect attempts so far, refused ones included
    pub fn connect_count(&self) -> usize {
        self.connects.load(AtomicOrdering::SeqCst)
    }

    /// The store behind `address`, created on first use
    pub fn store(&self, address: &ServerAddress) -> Arc<MemoryStore> {
        self.stores
            .lock()
            .entry(address.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        address: &ServerAddress,
        _timeout: Duration,
    ) -> Result<Arc<dyn Connection>> {
        self.connects.fetch_add(1, AtomicOrdering::SeqCst);
        if self.refused.contains(&address.host) {
            return Err(GatewayError::Connection(format!(
                "connection refused: {}",
                address
            )));
        }

        Ok(Arc::new(MemoryConnection {
            address: address.clone(),
            store: self.store(address),
        }))
    }
}

/// Databases of collections of documents, in insertion order
#[derive(Default)]
pub struct MemoryStore {
    databases: RwLock<HashMap<String, HashMap<String, Vec<Document>>>>,
}

impl MemoryStore {
    /// Snapshot of a collection's documents
    pub fn documents(&self, namespace: &Namespace) -> Vec<Document> {
        self.databases
            .read()
            .get(&namespace.db)
            .and_then(|collections| collections.get(&namespace.collection))
            .cloned()
            .unwrap_or_default()
    }

    fn count(&self, namespace: &Namespace) -> usize {
        self.databases
            .read()
            .get(&namespace.db)
            .and_then(|collections| collections.get(&namespace.collection))
            .map_or(0, Vec::len)
    }

    fn drop_collection(&self, namespace: &Namespace) -> bool {
        self.databases
            .write()
            .get_mut(&namespace.db)
            .and_then(|collections| collections.remove(&namespace.collection))
            .is_some()
    }

    fn with_collection<R>(&self, namespace: &Namespace, f: impl FnOnce(&mut Vec<Document>) -> R) -> R {
        let mut databases = self.databases.write();
        let collection = databases
            .entry(namespace.db.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default();
        f(collection)
    }
}

pub struct MemoryConnection {
    address: ServerAddress,
    store: Arc<MemoryStore>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn run_command(&self, db: &str, command: Document) -> Result<Document> {
        let Some((name, argument)) = command.iter().next() else {
            return Ok(command_failure("no command given", FAILED_TO_PARSE, "FailedToParse"));
        };

        let reply = match name.as_str() {
            "ping" => doc! { "ok": 1.0 },
            "count" => match argument.as_str() {
                Some(collection) => {
                    let n = self.store.count(&Namespace::new(db, collection)) as i64;
                    doc! { "n": n, "ok": 1.0 }
                }
                None => command_failure("collection name must be a string", FAILED_TO_PARSE, "FailedToParse"),
            },
            "drop" => match argument.as_str() {
                Some(collection) => {
                    let namespace = Namespace::new(db, collection);
                    if self.store.drop_collection(&namespace) {
                        doc! { "ns": namespace.to_string(), "ok": 1.0 }
                    } else {
                        command_failure("ns not found", 26, "NamespaceNotFound")
                    }
                }
                None => command_failure("collection name must be a string", FAILED_TO_PARSE, "FailedToParse"),
            },
            other => command_failure(
                format!("no such command: '{}'", other),
                COMMAND_NOT_FOUND,
                "CommandNotFound",
            ),
        };

        Ok(reply)
    }

    async fn find(&self, namespace: &Namespace, query: FindQuery) -> Result<Box<dyn ResultCursor>> {
        let mut docs: Vec<Document> = self
            .store
            .documents(namespace)
            .into_iter()
            .filter(|doc| matches(doc, &query.filter))
            .collect();

        if let Some(sort) = &query.sort {
            docs.sort_by(|a, b| compare_by(a, b, sort));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = match usize::try_from(query.limit.unsigned_abs()) {
            Ok(0) | Err(_) => usize::MAX,
            Ok(limit) => limit,
        };

        let docs: VecDeque<Document> = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &query.projection {
                Some(projection) => project(doc, projection),
                None => doc,
            })
            .collect();

        Ok(Box::new(MemoryCursor { docs }))
    }

    async fn insert(&self, namespace: &Namespace, docs: Vec<Document>) -> Result<InsertOutcome> {
        let outcome = self.store.with_collection(namespace, |collection| {
            let mut ids = Vec::with_capacity(docs.len());
            for doc in docs {
                let doc = with_id(doc);
                let id = doc.get("_id").cloned().unwrap_or(Bson::Null);

                if collection.iter().any(|existing| existing.get("_id") == Some(&id)) {
                    return InsertOutcome {
                        ids,
                        status: WriteStatus::failed(
                            format!("E11000 duplicate key error collection: {} dup key: {{ _id: {} }}", namespace, id),
                            Some(DUPLICATE_KEY),
                        ),
                    };
                }

                collection.push(doc);
                ids.push(id);
            }
            let n = ids.len() as u64;
            InsertOutcome {
                ids,
                status: WriteStatus::acknowledged(n),
            }
        });

        Ok(outcome)
    }

    async fn update(&self, namespace: &Namespace, spec: UpdateSpec) -> Result<WriteStatus> {
        let replacement = spec.is_replacement();

        let status = self.store.with_collection(namespace, |collection| {
            let mut matched = 0u64;
            for doc in collection.iter_mut() {
                if !matches(doc, &spec.criteria) {
                    continue;
                }
                let updated = if replacement {
                    replace(doc, &spec.update)
                } else {
                    apply_operators(doc.clone(), &spec.update)
                };
                match updated {
                    Ok(updated) => *doc = updated,
                    Err(message) => return WriteStatus::failed(message, Some(FAILED_TO_PARSE)),
                }
                matched += 1;
                if !spec.multi || replacement {
                    break;
                }
            }

            if matched > 0 || !spec.upsert {
                return WriteStatus::acknowledged(matched).with_updated_existing(matched > 0);
            }

            // Upsert: seed from the equality fields of the criteria.
            let seed: Document = spec
                .criteria
                .iter()
                .filter(|(key, value)| !key.starts_with('$') && !is_operator_doc(value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            let inserted = if replacement {
                replace(&seed, &spec.update)
            } else {
                apply_operators(seed, &spec.update)
            };
            match inserted {
                Ok(doc) => {
                    let doc = with_id(doc);
                    let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
                    collection.push(doc);
                    WriteStatus::acknowledged(1)
                        .with_updated_existing(false)
                        .with_upserted(id)
                }
                Err(message) => WriteStatus::failed(message, Some(FAILED_TO_PARSE)),
            }
        });

        Ok(status)
    }

    async fn remove(&self, namespace: &Namespace, criteria: Document) -> Result<WriteStatus> {
        let removed = self.store.with_collection(namespace, |collection| {
            let before = collection.len();
            collection.retain(|doc| !matches(doc, &criteria));
            before - collection.len()
        });

        Ok(WriteStatus::acknowledged(removed as u64))
    }
}

/// Snapshot of a query result
pub struct MemoryCursor {
    docs: VecDeque<Document>,
}

#[async_trait]
impl ResultCursor for MemoryCursor {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        Ok(self.docs.pop_front())
    }
}

fn matches(doc: &Document, criteria: &Document) -> bool {
    criteria
        .iter()
        .all(|(key, expected)| doc.get(key).is_some_and(|actual| values_equal(actual, expected)))
}

fn is_operator_doc(value: &Bson) -> bool {
    matches!(value, Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')))
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (a, b) {
                (Bson::String(x), Bson::String(y)) => x.cmp(y),
                (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
                (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
                (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
                _ => Ordering::Equal,
            },
        },
    }
}

fn compare_by(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let ordering = compare_values(a.get(field), b.get(field));
        let ordering = if as_number(direction) == Some(f64::from(DESCENDING)) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_number(other).map_or(true, |n| n != 0.0),
    }
}

fn project(doc: Document, projection: &Document) -> Document {
    let inclusive = projection
        .iter()
        .any(|(field, value)| field != "_id" && is_truthy(value));
    let keep_id = projection.get("_id").map_or(true, is_truthy);

    doc.into_iter()
        .filter(|(field, _)| {
            if field == "_id" {
                keep_id
            } else if inclusive {
                projection.get(field).is_some_and(is_truthy)
            } else {
                projection.get(field).map_or(true, |v| is_truthy(v))
            }
        })
        .collect()
}

/// Put an `_id` first, generating one if the document has none
fn with_id(mut doc: Document) -> Document {
    let id = doc
        .remove("_id")
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    let mut out = doc! { "_id": id };
    for (key, value) in doc {
        out.insert(key, value);
    }
    out
}

fn replace(existing: &Document, replacement: &Document) -> std::result::Result<Document, String> {
    let mut doc = Document::new();
    if let Some(id) = existing.get("_id") {
        doc.insert("_id", id.clone());
    }
    for (key, value) in replacement {
        if key == "_id" {
            continue;
        }
        doc.insert(key.clone(), value.clone());
    }
    Ok(doc)
}

fn apply_operators(mut doc: Document, update: &Document) -> std::result::Result<Document, String> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(format!("Modifiers operate on fields but we found type {:?} instead", fields.element_type()));
        };

        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    doc.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for (field, _) in fields {
                    doc.remove(field);
                }
            }
            "$inc" => {
                for (field, delta) in fields {
                    let current = doc.get(field).cloned().unwrap_or(Bson::Int32(0));
                    doc.insert(field.clone(), add(&current, delta)?);
                }
            }
            other => return Err(format!("Unknown modifier: {}", other)),
        }
    }
    Ok(doc)
}

fn add(current: &Bson, delta: &Bson) -> std::result::Result<Bson, String> {
    let sum = match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => {
            return Ok(a
                .checked_add(*b)
                .map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32));
        }
        (Bson::Int64(a), Bson::Int32(b)) => a.checked_add(i64::from(*b)),
        (Bson::Int32(a), Bson::Int64(b)) => i64::from(*a).checked_add(*b),
        (Bson::Int64(a), Bson::Int64(b)) => a.checked_add(*b),
        _ => {
            return match (as_number(current), as_number(delta)) {
                (Some(a), Some(b)) => Ok(Bson::Double(a + b)),
                _ => Err("Cannot apply $inc to a value of non-numeric type".to_string()),
            };
        }
    };

    sum.map(Bson::Int64)
        .ok_or_else(|| format!("Failed to apply $inc operations: overflow adding {} to {}", delta, current))
}
