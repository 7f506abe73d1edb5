//! JSON parameter decoding into BSON documents
//!
//! Clients send criteria, projections, updates and commands as JSON text.
//! Plain objects are converted with extended-JSON rules, so `{"$oid": ...}`
//! comes out as an ObjectId. JSON objects carry no reliable key order, so a
//! client that needs one (compound sorts, commands whose first key is the
//! command name) sends:
//!
//! ```json
//! {"$pyhint": [{"key": "a", "value": 1}, {"key": "b", "value": -1}]}
//! ```
//!
//! and the pairs are inserted in array order.

use bson::{Bson, Document};
use mongoose_common::{GatewayError, Result};
use serde_json::{Map, Value};

/// Sentinel key for an explicitly ordered field list
pub const ORDERED_HINT_KEY: &str = "$pyhint";

/// Decode a single document.
///
/// Fails with `Parse` if `raw` is not JSON and with `NotIterable` if it is
/// JSON but not an object.
pub fn decode(raw: &str) -> Result<Document> {
    match parse(raw)? {
        Value::Object(map) => object_to_document(map, raw),
        _ => Err(GatewayError::NotIterable(raw.to_string())),
    }
}

/// Decode one document or an array of documents.
///
/// Each array element follows the same rules as [`decode`].
pub fn decode_many(raw: &str) -> Result<Vec<Document>> {
    match parse(raw)? {
        Value::Object(map) => Ok(vec![object_to_document(map, raw)?]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => object_to_document(map, raw),
                _ => Err(GatewayError::NotIterable(raw.to_string())),
            })
            .collect(),
        _ => Err(GatewayError::NotIterable(raw.to_string())),
    }
}

/// Render a document as relaxed extended JSON for a response body
pub fn encode(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

fn parse(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|_| GatewayError::Parse(raw.to_string()))
}

fn object_to_document(mut map: Map<String, Value>, raw: &str) -> Result<Document> {
    if let Some(hint) = map.remove(ORDERED_HINT_KEY) {
        // The hint replaces the whole object; sibling keys are dropped.
        return ordered_document(hint, raw);
    }

    match to_bson(Value::Object(map), raw)? {
        Bson::Document(doc) => Ok(doc),
        // e.g. a bare {"$oid": "..."} at the top level
        _ => Err(GatewayError::NotIterable(raw.to_string())),
    }
}

fn ordered_document(hint: Value, raw: &str) -> Result<Document> {
    let Value::Array(pairs) = hint else {
        return Err(GatewayError::Parse(raw.to_string()));
    };

    let mut doc = Document::new();
    for pair in pairs {
        let Value::Object(mut pair) = pair else {
            return Err(GatewayError::Parse(raw.to_string()));
        };
        let key = match pair.remove("key") {
            Some(Value::String(key)) => key,
            _ => return Err(GatewayError::Parse(raw.to_string())),
        };
        let value = pair
            .remove("value")
            .ok_or_else(|| GatewayError::Parse(raw.to_string()))?;

        // Repeated keys keep their first position and take the last value.
        doc.insert(key, to_bson(value, raw)?);
    }

    Ok(doc)
}

fn to_bson(value: Value, raw: &str) -> Result<Bson> {
    Bson::try_from(value).map_err(|_| GatewayError::Parse(raw.to_string()))
}
