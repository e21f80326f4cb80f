//! Canonical JSON: the deterministic byte form documents are stored as.
//!
//! Keys are sorted recursively (ASCII order), indentation is two spaces, lines
//! end with `\n`, and the file ends with a trailing newline. Blob OIDs depend
//! on byte-exact serialization, so any change here changes every blob OID in
//! every database that uses it.

use crate::error::{GitDdbError, Result};
use serde_json::Value;

/// Serialize a document to its canonical byte form.
///
/// `_id` is stripped from the value before serialization: the id is derived
/// from the file path, not stored redundantly in the body.
pub fn serialize(doc: &Value) -> Result<Vec<u8>> {
    if !doc.is_object() {
        return Err(GitDdbError::InvalidJsonObject);
    }
    let mut without_id = doc.clone();
    if let Some(obj) = without_id.as_object_mut() {
        obj.remove("_id");
    }
    let sorted = sort_keys(&without_id);
    let mut out = String::new();
    write_value(&sorted, 0, &mut out);
    out.push('\n');
    Ok(out.into_bytes())
}

/// Parse canonical bytes back into a document, reattaching `_id` from the
/// caller-supplied short name (the file-path-derived id always wins over any
/// in-file `_id`, per the round-trip law).
pub fn parse(bytes: &[u8], id: &str) -> Result<Value> {
    let text = std::str::from_utf8(bytes).map_err(|_| GitDdbError::InvalidJsonObject)?;
    let mut value: Value = serde_json::from_str(text)?;
    let obj = value.as_object_mut().ok_or(GitDdbError::InvalidJsonObject)?;
    obj.insert("_id".to_string(), Value::String(id.to_string()));
    Ok(value)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn write_value(value: &Value, indent: usize, out: &mut String) {
    match value {
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{\n");
            let pad = "  ".repeat(indent + 1);
            let last = map.len() - 1;
            for (i, (k, v)) in map.iter().enumerate() {
                out.push_str(&pad);
                out.push_str(&serde_json::to_string(k).expect("string key serializes"));
                out.push_str(": ");
                write_value(v, indent + 1, out);
                if i != last {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
        Value::Array(items) if items.is_empty() => out.push_str("[]"),
        Value::Array(items) => {
            out.push_str("[\n");
            let pad = "  ".repeat(indent + 1);
            let last = items.len() - 1;
            for (i, v) in items.iter().enumerate() {
                out.push_str(&pad);
                write_value(v, indent + 1, out);
                if i != last {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&"  ".repeat(indent));
            out.push(']');
        }
        other => out.push_str(&serde_json::to_string(other).expect("scalar serializes")),
    }
}
