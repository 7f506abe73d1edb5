//! JSON response envelope
//!
//! Every reply is a JSON object carrying `ok`. Failures add `errmsg`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bson::Document;
use mongoose_common::GatewayError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    status: StatusCode,
    body: Map<String, Value>,
}

impl Envelope {
    /// `{"ok": 1}`
    pub fn ok() -> Self {
        Self::with_ok(1)
    }

    /// `{"ok": 0, "errmsg": message}`
    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_ok(0).with("errmsg", message.into())
    }

    /// A database reply passed through as-is
    pub fn from_document(doc: Document) -> Self {
        let body = match mongoose_mongodb::encode(doc) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn with_ok(ok: i32) -> Self {
        let mut body = Map::new();
        body.insert("ok".to_string(), Value::from(ok));
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// Add or replace a field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.body
            .get("ok")
            .and_then(Value::as_f64)
            .is_some_and(|ok| ok != 0.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

impl From<GatewayError> for Envelope {
    fn from(err: GatewayError) -> Self {
        let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::OK);
        Self {
            status,
            ..Self::failure(err.to_string())
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}
