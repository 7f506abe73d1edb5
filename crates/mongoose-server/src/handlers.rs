//! Gateway operations
//!
//! Each operation validates in the same order and stops at the first
//! failure: request method, connection, db/collection, then parameters.

use mongoose_common::{GatewayError, Result};
use mongoose_mongodb::backend::is_command_failure;
use mongoose_mongodb::{
    decode, decode_many, encode, Connection, CursorId, FindQuery, Namespace, ServerAddress,
    UpdateSpec, WriteStatus, DEFAULT_CONNECTION_NAME,
};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::params::{ParamSource, Params};
use crate::state::AppState;

const GREETING: &str = "Uh, we had a slight weapons malfunction, but uh... everything's \
    perfectly all right now. We're fine. We're all fine here now, thank you. How are you?";

/// Operations addressable by URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Hello,
    Connect,
    Command,
    Find,
    /// Next batch from an open cursor
    More,
    Insert,
    Update,
    Remove,
}

impl Operation {
    /// Name used in the URL
    pub fn wire_name(self) -> &'static str {
        match self {
            Operation::Hello => "_hello",
            Operation::Connect => "_connect",
            Operation::Command => "_cmd",
            Operation::Find => "_find",
            Operation::More => "_more",
            Operation::Insert => "_insert",
            Operation::Update => "_update",
            Operation::Remove => "_remove",
        }
    }

    /// Parameter source the operation insists on, if any
    pub fn required_source(self) -> Option<ParamSource> {
        match self {
            Operation::Connect | Operation::Insert | Operation::Update | Operation::Remove => {
                Some(ParamSource::Form)
            }
            Operation::Find | Operation::More => Some(ParamSource::Query),
            Operation::Hello | Operation::Command => None,
        }
    }
}

impl FromStr for Operation {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "_hello" => Ok(Operation::Hello),
            "_connect" => Ok(Operation::Connect),
            "_cmd" => Ok(Operation::Command),
            "_find" => Ok(Operation::Find),
            "_more" => Ok(Operation::More),
            "_insert" => Ok(Operation::Insert),
            "_update" => Ok(Operation::Update),
            "_remove" => Ok(Operation::Remove),
            other => Err(GatewayError::UnknownOperation(other.to_string())),
        }
    }
}

/// Connection name and database address a request is aimed at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub name: Option<String>,
    pub db: Option<String>,
    pub collection: Option<String>,
}

impl Target {
    pub fn new(name: Option<String>, db: Option<String>, collection: Option<String>) -> Self {
        Self {
            name,
            db,
            collection,
        }
    }

    /// Connection name, `"default"` when none was given
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_CONNECTION_NAME)
    }

    pub fn database(&self) -> Result<&str> {
        self.db.as_deref().ok_or(GatewayError::MissingAddress)
    }

    pub fn namespace(&self) -> Result<Namespace> {
        match (&self.db, &self.collection) {
            (Some(db), Some(collection)) => Ok(Namespace::new(db.as_str(), collection.as_str())),
            _ => Err(GatewayError::MissingAddress),
        }
    }
}

/// Run one operation and render its outcome.
///
/// Never fails: every error becomes an `{ok: 0, errmsg}` envelope.
pub async fn dispatch(state: &AppState, op: Operation, params: &Params, target: &Target) -> Envelope {
    debug!(
        op = op.wire_name(),
        connection = target.name(),
        db = target.db.as_deref(),
        collection = target.collection.as_deref(),
        "dispatching"
    );

    let result = match check_source(op, params) {
        Err(e) => Err(e),
        Ok(()) => match op {
            Operation::Hello => Ok(hello()),
            Operation::Connect => Ok(connect(state, params, target).await),
            Operation::Command => command(state, params, target).await,
            Operation::Find => find(state, params, target).await,
            Operation::More => more(state, params).await,
            Operation::Insert => insert(state, params, target).await,
            Operation::Update => update(state, params, target).await,
            Operation::Remove => remove(state, params, target).await,
        },
    };

    match result {
        Ok(envelope) => envelope,
        Err(GatewayError::ReconnectFailed) => {
            Envelope::from(GatewayError::ReconnectFailed).with("name", target.name())
        }
        Err(e) => {
            if e.is_client_error() {
                debug!(op = op.wire_name(), error = %e, "rejected request");
            } else {
                warn!(op = op.wire_name(), error = %e, "operation failed");
            }
            Envelope::from(e)
        }
    }
}

fn check_source(op: Operation, params: &Params) -> Result<()> {
    match op.required_source() {
        Some(expected) if expected != params.source() => Err(GatewayError::WrongMethod {
            operation: op.wire_name(),
            expected: expected.method(),
        }),
        _ => Ok(()),
    }
}

fn connection(state: &AppState, target: &Target) -> Result<Arc<dyn Connection>> {
    state
        .connections
        .lookup(Some(target.name()))
        .ok_or(GatewayError::NoConnection)
}

fn batch_size(state: &AppState, params: &Params) -> Result<usize> {
    Ok(params
        .number("batch_size")?
        .unwrap_or(state.default_batch_size))
}

fn hello() -> Envelope {
    Envelope::ok().with("msg", GREETING)
}

async fn connect(state: &AppState, params: &Params, target: &Target) -> Envelope {
    let address = params
        .get("server")
        .map(ServerAddress::parse)
        .unwrap_or_default();
    let name = target.name();

    let connected = state
        .connections
        .get(Some(name), Some(address.host.as_str()), Some(address.port))
        .await
        .is_some();

    let envelope = if connected {
        Envelope::ok()
    } else {
        Envelope::failure("could not connect")
    };
    envelope
        .with("host", address.host)
        .with("port", address.port)
        .with("name", name)
}

async fn command(state: &AppState, params: &Params, target: &Target) -> Result<Envelope> {
    let conn = connection(state, target)?;
    let db = target.database()?;
    let raw = params
        .get("cmd")
        .ok_or_else(|| GatewayError::MissingField("cmd".to_string()))?;
    let cmd = decode(raw)?;

    let reply = conn.run_command(db, cmd).await?;
    if is_command_failure(&reply) {
        // Echo the request so the client can see what was rejected
        return Ok(Envelope::from_document(reply).with("cmd", raw));
    }
    Ok(Envelope::from_document(reply))
}

async fn find(state: &AppState, params: &Params, target: &Target) -> Result<Envelope> {
    let conn = connection(state, target)?;
    let namespace = target.namespace()?;

    let mut query = FindQuery::new().filter(params.document("criteria")?.unwrap_or_default());
    if let Some(fields) = params.document("fields")? {
        query = query.projection(fields);
    }
    if let Some(sort) = params.document("sort")? {
        query = query.sort(&sort);
    }
    if let Some(limit) = params.number("limit")? {
        query = query.limit(limit);
    }
    if let Some(skip) = params.number("skip")? {
        query = query.skip(skip);
    }
    let batch_size = batch_size(state, params)?;

    let cursor = conn.find(&namespace, query).await?;
    let id = state.cursors.open(cursor);
    emit_batch(state, id, batch_size).await
}

async fn more(state: &AppState, params: &Params) -> Result<Envelope> {
    let id: CursorId = params.number("id")?.ok_or(GatewayError::MissingCursorId)?;
    let batch_size = batch_size(state, params)?;
    emit_batch(state, id, batch_size).await
}

/// Pull the next batch from cursor `id`; an exhausted cursor yields an empty batch
async fn emit_batch(state: &AppState, id: CursorId, batch_size: usize) -> Result<Envelope> {
    let entry = state.cursors.get(id)?;
    let batch = entry.lock().await.next_batch(batch_size).await?;

    let results: Vec<Value> = batch.into_iter().map(encode).collect();
    Ok(Envelope::ok().with("results", results).with("id", id))
}

async fn insert(state: &AppState, params: &Params, target: &Target) -> Result<Envelope> {
    let conn = connection(state, target)?;
    let namespace = target.namespace()?;
    let raw = params
        .get("docs")
        .ok_or_else(|| GatewayError::MissingField("docs".to_string()))?;
    let docs = decode_many(raw)?;

    let outcome = conn.insert(&namespace, docs).await?;
    let oids: Vec<Value> = outcome
        .ids
        .into_iter()
        .map(|id| id.into_relaxed_extjson())
        .collect();

    let envelope = Envelope::ok().with("oids", oids);
    if params.flag("safe") {
        return Ok(envelope.with("status", encode(outcome.status.to_document())));
    }
    if let Some(err) = &outcome.status.error {
        warn!(%namespace, error = %err, "unacknowledged insert failed");
    }
    Ok(envelope)
}

async fn update(state: &AppState, params: &Params, target: &Target) -> Result<Envelope> {
    let conn = connection(state, target)?;
    let namespace = target.namespace()?;
    let criteria = params.require_document("criteria")?;
    let newobj = params.require_document("newobj")?;

    let spec = UpdateSpec::new(criteria, newobj)
        .upsert(params.flag("upsert"))
        .multi(params.flag("multi"));
    let status = conn.update(&namespace, spec).await;
    safety_check(params, &namespace, status)
}

async fn remove(state: &AppState, params: &Params, target: &Target) -> Result<Envelope> {
    let conn = connection(state, target)?;
    let namespace = target.namespace()?;
    let criteria = params.document("criteria")?.unwrap_or_default();

    let status = conn.remove(&namespace, criteria).await;
    safety_check(params, &namespace, status)
}

/// With `safe`, report the write status as-is; otherwise answer `{ok: 1}`
/// whatever happened.
fn safety_check(params: &Params, namespace: &Namespace, status: Result<WriteStatus>) -> Result<Envelope> {
    if params.flag("safe") {
        return Ok(Envelope::from_document(status?.to_document()));
    }

    match status {
        Ok(status) if status.is_error() => {
            warn!(%namespace, error = ?status.error, "unacknowledged write failed");
        }
        Err(e) => warn!(%namespace, error = %e, "unacknowledged write failed"),
        Ok(_) => {}
    }
    Ok(Envelope::ok())
}
