//! HTTP front end for mongoose
//!
//! Routes `/{op}`, `/{db}/{op}` and `/{db}/{collection}/{op}` to gateway
//! operations. GET requests carry parameters in the query string; POST
//! requests carry them in a urlencoded form body.

pub mod config;
pub mod envelope;
pub mod handlers;
pub mod params;
pub mod state;

pub use config::{BackendKind, ServerConfig};
pub use envelope::Envelope;
pub use handlers::{Operation, Target};
pub use params::{ParamSource, Params};
pub use state::{AppState, SharedState};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Construct the gateway router.
///
/// Every route accepts GET and POST; the operation decides which one it
/// wants.
pub fn router(state: SharedState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/{op}", get(server_op).post(server_op))
        .route("/{db}/{op}", get(database_op).post(database_op))
        .route(
            "/{db}/{collection}/{op}",
            get(collection_op).post(collection_op),
        )
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn server_op(
    State(state): State<SharedState>,
    Path(op): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Envelope {
    handle(&state, &op, &method, query, &body, None, None).await
}

async fn database_op(
    State(state): State<SharedState>,
    Path((db, op)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Envelope {
    handle(&state, &op, &method, query, &body, Some(db), None).await
}

async fn collection_op(
    State(state): State<SharedState>,
    Path((db, collection, op)): Path<(String, String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Envelope {
    handle(&state, &op, &method, query, &body, Some(db), Some(collection)).await
}

async fn handle(
    state: &AppState,
    op: &str,
    method: &Method,
    query: Option<String>,
    body: &[u8],
    db: Option<String>,
    collection: Option<String>,
) -> Envelope {
    let operation = match op.parse::<Operation>() {
        Ok(operation) => operation,
        Err(e) => return e.into(),
    };

    let params = if *method == Method::POST {
        Params::from_form(body, query.as_deref())
    } else {
        Params::from_query(query.as_deref())
    };
    let target = Target::new(params.get("name").map(str::to_string), db, collection);

    handlers::dispatch(state, operation, &params, &target).await
}
