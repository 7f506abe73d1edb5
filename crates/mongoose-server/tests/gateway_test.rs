//! Gateway integration tests against the in-memory backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mongoose_mongodb::MemoryConnector;
use mongoose_server::{router, AppState, ServerConfig};

fn create_test_app() -> Router {
    let config = ServerConfig::default();
    let connector = Arc::new(MemoryConnector::new().refuse_host("unreachable"));
    router(AppState::new(connector, &config).shared(), &config)
}

fn encode(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get(app: &Router, path: &str, pairs: &[(&str, &str)]) -> (StatusCode, Value) {
    let uri = if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, encode(pairs))
    };
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post(app: &Router, path: &str, pairs: &[(&str, &str)]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(encode(pairs)))
        .unwrap();
    send(app, request).await
}

async fn connected_app() -> Router {
    let app = create_test_app();
    let (_, json) = post(&app, "/_connect", &[]).await;
    assert_eq!(json["ok"], 1);
    app
}

async fn seed(app: &Router, count: usize) {
    let docs: Vec<Value> = (0..count).map(|i| json!({"i": i})).collect();
    let docs = Value::Array(docs).to_string();
    let (_, json) = post(app, "/test/items/_insert", &[("docs", docs.as_str())]).await;
    assert_eq!(json["oids"].as_array().map(Vec::len), Some(count));
}

#[tokio::test]
async fn test_hello() {
    let app = create_test_app();

    let (status, json) = get(&app, "/_hello", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], 1);
    assert!(json["msg"].is_string());
}

#[tokio::test]
async fn test_connect() {
    let app = create_test_app();

    let (status, json) = post(&app, "/_connect", &[("server", "db1:27018"), ("name", "main")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": 1, "host": "db1", "port": 27018, "name": "main"}));
}

#[tokio::test]
async fn test_connect_failure_is_still_http_ok() {
    let app = create_test_app();

    let (status, json) = post(&app, "/_connect", &[("server", "unreachable")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], 0);
    assert_eq!(json["errmsg"], "could not connect");
    assert_eq!(json["port"], 27017);
}

#[tokio::test]
async fn test_connect_requires_post() {
    let app = create_test_app();

    let (status, json) = get(&app, "/_connect", &[("server", "db1")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": 0, "errmsg": "_connect must be a POST request"}));
}

#[tokio::test]
async fn test_find_requires_get() {
    let app = connected_app().await;

    let (_, json) = post(&app, "/test/items/_find", &[]).await;
    assert_eq!(json["errmsg"], "_find must be a GET request");
}

#[tokio::test]
async fn test_no_connection() {
    let app = create_test_app();

    let (_, json) = get(&app, "/test/items/_find", &[]).await;
    assert_eq!(json, json!({"ok": 0, "errmsg": "couldn't get connection to mongo"}));
}

#[tokio::test]
async fn test_named_connection_is_separate() {
    let app = connected_app().await;

    let (_, json) = get(&app, "/test/items/_find", &[("name", "other")]).await;
    assert_eq!(json["errmsg"], "couldn't get connection to mongo");
}

#[tokio::test]
async fn test_missing_collection() {
    let app = connected_app().await;

    let (_, json) = post(&app, "/test/_insert", &[("docs", "{}")]).await;
    assert_eq!(json["errmsg"], "db and collection must be defined");
}

#[tokio::test]
async fn test_find_pages_through_results() {
    let app = connected_app().await;
    seed(&app, 5).await;

    let (_, first) = get(&app, "/test/items/_find", &[("batch_size", "2")]).await;
    let id = first["id"].as_u64().unwrap();
    let more = id.to_string();
    let more = more.as_str();

    let (_, second) = get(&app, "/_more", &[("id", more), ("batch_size", "2")]).await;
    let (_, third) = get(&app, "/_more", &[("id", more), ("batch_size", "2")]).await;

    let batches: Vec<Vec<i64>> = [&first, &second, &third]
        .iter()
        .map(|json| {
            assert_eq!(json["ok"], 1);
            assert_eq!(json["id"].as_u64(), Some(id));
            json["results"]
                .as_array()
                .unwrap()
                .iter()
                .map(|doc| doc["i"].as_i64().unwrap())
                .collect()
        })
        .collect();
    assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4]]);

    let (_, drained) = get(&app, "/_more", &[("id", more)]).await;
    assert_eq!(drained, json!({"ok": 1, "results": [], "id": id}));
}

#[tokio::test]
async fn test_cursor_ids_increase() {
    let app = connected_app().await;

    let (_, a) = get(&app, "/test/items/_find", &[]).await;
    let (_, b) = get(&app, "/test/items/_find", &[]).await;
    assert_eq!(a["id"], 0);
    assert_eq!(b["id"], 1);
}

#[tokio::test]
async fn test_more_unknown_cursor() {
    let app = create_test_app();

    let (status, json) = get(&app, "/_more", &[("id", "99")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": 0, "errmsg": "couldn't find the cursor with id 99"}));
}

#[tokio::test]
async fn test_find_with_ordered_sort() {
    let app = connected_app().await;
    let docs = r#"[{"a":1,"b":1},{"a":0,"b":5},{"a":1,"b":2}]"#;
    post(&app, "/test/items/_insert", &[("docs", docs)]).await;

    let sort = r#"{"$pyhint":[{"key":"a","value":1},{"key":"b","value":-1}]}"#;
    let (_, json) = get(
        &app,
        "/test/items/_find",
        &[("sort", sort), ("fields", r#"{"_id":0}"#)],
    )
    .await;
    assert_eq!(
        json["results"],
        json!([{"a": 0, "b": 5}, {"a": 1, "b": 2}, {"a": 1, "b": 1}])
    );
}

#[tokio::test]
async fn test_insert_safe_returns_status() {
    let app = connected_app().await;

    let (_, json) = post(
        &app,
        "/test/items/_insert",
        &[("docs", r#"{"_id": {"$oid": "507f1f77bcf86cd799439011"}}"#), ("safe", "1")],
    )
    .await;
    assert_eq!(json["ok"], 1);
    assert_eq!(json["oids"], json!([{"$oid": "507f1f77bcf86cd799439011"}]));
    assert_eq!(json["status"]["n"], 1);
    assert_eq!(json["status"]["err"], Value::Null);
}

#[tokio::test]
async fn test_unsafe_update_hides_outcome() {
    let app = connected_app().await;
    seed(&app, 1).await;

    let (_, json) = post(
        &app,
        "/test/items/_update",
        &[("criteria", "{}"), ("newobj", r#"{"$nope": {"i": 1}}"#)],
    )
    .await;
    assert_eq!(json, json!({"ok": 1}));

    let (_, json) = post(
        &app,
        "/test/items/_update",
        &[("criteria", "{}"), ("newobj", r#"{"$nope": {"i": 1}}"#), ("safe", "0")],
    )
    .await;
    assert_eq!(json, json!({"ok": 1}));
}

#[tokio::test]
async fn test_safe_update_reports_status() {
    let app = connected_app().await;
    seed(&app, 3).await;

    let (_, json) = post(
        &app,
        "/test/items/_update",
        &[
            ("criteria", "{}"),
            ("newobj", r#"{"$set": {"seen": true}}"#),
            ("multi", "true"),
            ("safe", "true"),
        ],
    )
    .await;
    assert_eq!(json["n"], 3);
    assert_eq!(json["updatedExisting"], true);
    assert_eq!(json["err"], Value::Null);
}

#[tokio::test]
async fn test_inc_overflow_is_reported_not_fatal() {
    let app = connected_app().await;
    let docs = r#"{"_id": 1, "n": 9223372036854775807}"#;
    post(&app, "/test/items/_insert", &[("docs", docs)]).await;

    let (status, json) = post(
        &app,
        "/test/items/_update",
        &[("criteria", r#"{"_id": 1}"#), ("newobj", r#"{"$inc": {"n": 1}}"#), ("safe", "1")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["err"].is_string());

    let (_, json) = get(&app, "/test/items/_find", &[]).await;
    assert_eq!(json["results"][0]["n"], json!(9223372036854775807_i64));
}

#[tokio::test]
async fn test_remove_without_criteria_removes_all() {
    let app = connected_app().await;
    seed(&app, 4).await;

    let (_, json) = post(&app, "/test/items/_remove", &[]).await;
    assert_eq!(json, json!({"ok": 1}));

    let (_, json) = get(&app, "/test/items/_find", &[]).await;
    assert_eq!(json["results"], json!([]));
}

#[tokio::test]
async fn test_command() {
    let app = connected_app().await;
    seed(&app, 2).await;

    let (_, json) = get(&app, "/test/_cmd", &[("cmd", r#"{"count": "items"}"#)]).await;
    assert_eq!(json["ok"], 1.0);
    assert_eq!(json["n"], 2);
}

#[tokio::test]
async fn test_failed_command_echoes_cmd() {
    let app = connected_app().await;
    let cmd = r#"{"frobnicate": 1}"#;

    let (status, json) = post(&app, "/test/_cmd", &[("cmd", cmd)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], 0.0);
    assert_eq!(json["cmd"], cmd);
    assert!(json["errmsg"].is_string());
}

#[tokio::test]
async fn test_bad_json() {
    let app = connected_app().await;

    let (_, json) = get(&app, "/test/items/_find", &[("criteria", "[1, 2]")]).await;
    assert_eq!(json["errmsg"], "type is not iterable: [1, 2]");
}

#[tokio::test]
async fn test_unknown_operation() {
    let app = create_test_app();

    let (status, json) = get(&app, "/test/items/_drop", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"ok": 0, "errmsg": "unknown operation: _drop"}));
}
