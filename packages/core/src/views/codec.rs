//! Document encode/decode helpers
//!
//! Explicit, per-field translation between in-memory entities and flat
//! documents. Serialization lists exactly the persisted fields; nothing is
//! derived from runtime introspection.

use serde_json::{Map, Value};

use super::error::ViewError;
use crate::db::Document;
use crate::models::{EdgeList, NodeCore};
use crate::time::{format_timestamp, parse_timestamp};

/// Encode the fields shared by every node variant. Timestamps are owned by
/// the view and added at insert/update time.
pub(crate) fn encode_core(core: &NodeCore, label: &'static str) -> Result<Document, ViewError> {
    core.check_contents(label)?;
    let mut document = Document::new();
    document.insert("_id".to_string(), Value::String(core.id.clone()));
    document.insert("name".to_string(), Value::String(core.name.clone()));
    document.insert(
        "tags".to_string(),
        Value::Array(core.tags.iter().cloned().map(Value::String).collect()),
    );
    document.insert("upstream".to_string(), edge_value(&core.upstream, label)?);
    document.insert(
        "downstream".to_string(),
        edge_value(&core.downstream, label)?,
    );
    document.insert("contents".to_string(), Value::Object(core.contents.clone()));
    document.insert(
        "version_history".to_string(),
        Value::Array(core.version_history.clone()),
    );
    Ok(document)
}

/// Decode the shared node fields, removing them from `document` so the
/// caller is left with only type-specific fields.
pub(crate) fn decode_core(
    document: &mut Document,
    label: &'static str,
) -> Result<NodeCore, ViewError> {
    let id = take_string(document, "_id", label)?;
    let name = take_string(document, "name", label)?;
    let tags = match document.remove("tags") {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ViewError::decode(label, format!("tags: {e}")))?,
        None => Vec::new(),
    };
    let upstream = take_edges(document, "upstream", label)?;
    let downstream = take_edges(document, "downstream", label)?;
    let contents = match document.remove("contents") {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ViewError::decode(
                label,
                format!("contents must be an object, got {other}"),
            ))
        }
        None => Map::new(),
    };
    let version_history = match document.remove("version_history") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ViewError::decode(
                label,
                format!("version_history must be an array, got {other}"),
            ))
        }
        None => Vec::new(),
    };
    let created_at = take_timestamp(document, "created_at");
    let updated_at = take_timestamp(document, "updated_at");

    Ok(NodeCore {
        id,
        name,
        tags,
        upstream,
        downstream,
        contents,
        version_history,
        created_at,
        updated_at,
    })
}

fn edge_value(edges: &EdgeList, label: &'static str) -> Result<Value, ViewError> {
    serde_json::to_value(edges).map_err(|e| ViewError::decode(label, format!("edges: {e}")))
}

fn take_edges(
    document: &mut Document,
    key: &str,
    label: &'static str,
) -> Result<EdgeList, ViewError> {
    match document.remove(key) {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ViewError::decode(label, format!("{key}: {e}"))),
        None => Ok(EdgeList::new()),
    }
}

pub(crate) fn take_string(
    document: &mut Document,
    key: &str,
    label: &'static str,
) -> Result<String, ViewError> {
    match document.remove(key) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(ViewError::decode(
            label,
            format!("{key} must be a string, got {other}"),
        )),
        None => Err(ViewError::decode(label, format!("missing field {key}"))),
    }
}

pub(crate) fn take_timestamp(
    document: &mut Document,
    key: &str,
) -> Option<chrono::DateTime<chrono::Utc>> {
    document
        .remove(key)
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

pub(crate) fn timestamp_value(value: chrono::DateTime<chrono::Utc>) -> Value {
    Value::String(format_timestamp(value))
}

/// Accept the `actor_id` field as either a single id or an array of ids.
pub(crate) fn take_id_list(
    document: &mut Document,
    key: &str,
    label: &'static str,
) -> Result<Vec<String>, ViewError> {
    match document.remove(key) {
        Some(Value::String(id)) => Ok(vec![id]),
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(id) => Ok(id),
                other => Err(ViewError::decode(
                    label,
                    format!("{key} entries must be strings, got {other}"),
                )),
            })
            .collect(),
        Some(other) => Err(ViewError::decode(
            label,
            format!("{key} must be an id or an array of ids, got {other}"),
        )),
        None => Ok(Vec::new()),
    }
}

/// The comparison view of a document: everything except the fields that
/// change on every write.
pub(crate) fn strip_volatile(document: &Document) -> Document {
    let mut stripped = document.clone();
    stripped.remove("version_history");
    stripped.remove("created_at");
    stripped.remove("updated_at");
    stripped
}
