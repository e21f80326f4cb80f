//! Front-matter (YAML-framed Markdown) serialization format, the second of
//! the two built-in C1 formats. Grounded on the `gray_matter` usage pattern in
//! the sync crate's cross-workspace projection cache (`parse_document`), which
//! parses the same `---`-fenced YAML block out of Markdown documents via
//! `Matter::<YAML>::parse` and a `Pod::Hash` map.

use crate::error::{GitDdbError, Result};
use gray_matter::engine::YAML;
use gray_matter::{Matter, Pod};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const BODY_FIELD: &str = "_body";

/// Serialize a document to `---`-fenced YAML front matter followed by the
/// designated body field as Markdown content.
pub fn serialize(doc: &Value) -> Result<Vec<u8>> {
    let obj = doc.as_object().ok_or(GitDdbError::InvalidJsonObject)?;
    let mut front = Map::new();
    let mut body = String::new();
    for (k, v) in obj {
        if k == "_id" {
            continue;
        }
        if k == BODY_FIELD {
            if let Some(s) = v.as_str() {
                body = s.to_string();
            }
            continue;
        }
        front.insert(k.clone(), v.clone());
    }
    let yaml =
        serde_yaml::to_string(&Value::Object(front)).map_err(|e| GitDdbError::Yaml(e.to_string()))?;
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(yaml.trim_end());
    out.push_str("\n---\n");
    out.push_str(&body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out.into_bytes())
}

/// Parse front-matter bytes back into a document. The returned document's
/// `_id` is always the caller-supplied short name, never an in-file value.
pub fn parse(bytes: &[u8], id: &str) -> Result<Value> {
    let text = std::str::from_utf8(bytes).map_err(|_| GitDdbError::InvalidJsonObject)?;
    let matter = Matter::<YAML>::new();
    let parsed = matter.parse(text);

    let mut obj = Map::new();
    if let Some(Pod::Hash(map)) = parsed.data {
        for (k, v) in map.iter() {
            obj.insert(k.clone(), pod_to_json(v));
        }
    }
    obj.remove("_id");
    obj.insert(
        BODY_FIELD.to_string(),
        Value::String(parsed.content.trim_end_matches('\n').to_string()),
    );
    obj.insert("_id".to_string(), Value::String(id.to_string()));
    Ok(Value::Object(obj))
}

fn pod_to_json(pod: &Pod) -> Value {
    match pod {
        Pod::Null => Value::Null,
        Pod::String(s) => Value::String(s.clone()),
        Pod::Integer(i) => Value::Number((*i).into()),
        Pod::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Pod::Boolean(b) => Value::Bool(*b),
        Pod::Array(items) => Value::Array(items.iter().map(pod_to_json).collect()),
        Pod::Hash(map) => {
            let converted: HashMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), pod_to_json(v))).collect();
            serde_json::to_value(converted).unwrap_or(Value::Null)
        }
    }
}
