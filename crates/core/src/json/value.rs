//! Scalar, array and dictionary projection.
//!
//! Names are `"/Name"`, strings are `"u:<text>"` or `"b:<hex>"`, references
//! are `{"ref": [num, gen]}`, and dictionary keys carry their leading `/`.

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, ObjectId, PdfValue};
use serde_json::{Map, Number, Value as Json};

pub(crate) const REF_KEY: &str = "ref";
const TEXT_PREFIX: &str = "u:";
const BINARY_PREFIX: &str = "b:";

/// Append `key` to a JSON-pointer-style path.
pub(crate) fn child(path: &str, key: &str) -> String {
    format!("{path}/{}", key.replace('~', "~0").replace('/', "~1"))
}

pub(crate) fn value_to_json(value: &PdfValue) -> Json {
    match value {
        PdfValue::Null => Json::Null,
        PdfValue::Bool(b) => Json::Bool(*b),
        PdfValue::Int(n) => Json::Number((*n).into()),
        PdfValue::Real(r) => match Number::from_f64(*r) {
            Some(n) => Json::Number(n),
            None => {
                tracing::warn!(value = %r, "non-finite real projected as null");
                Json::Null
            }
        },
        PdfValue::Name(name) => Json::String(format!("/{name}")),
        PdfValue::String(bytes) => Json::String(string_to_json(bytes)),
        PdfValue::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        PdfValue::Dict(dict) => Json::Object(dict_to_json(dict)),
        // streams are only projected at the top level; a nested one keeps its
        // dictionary
        PdfValue::Stream(stream) => Json::Object(dict_to_json(&stream.dict)),
        PdfValue::Ref(id) => reference_to_json(*id),
    }
}

pub(crate) fn reference_to_json(id: ObjectId) -> Json {
    let mut map = Map::new();
    map.insert(
        REF_KEY.into(),
        Json::Array(vec![id.number.into(), id.generation.into()]),
    );
    Json::Object(map)
}

pub(crate) fn dict_to_json(dict: &Dictionary) -> Map<String, Json> {
    dict.iter()
        .map(|(k, v)| (format!("/{k}"), value_to_json(v)))
        .collect()
}

/// `u:` when the bytes are UTF-8 text without control characters other
/// than whitespace, `b:` hex otherwise.
pub(crate) fn string_to_json(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')) => {
            format!("{TEXT_PREFIX}{text}")
        }
        _ => format!("{BINARY_PREFIX}{}", hex::encode(bytes)),
    }
}

pub(crate) fn value_from_json(json: &Json, path: &str) -> Result<PdfValue> {
    match json {
        Json::Null => Ok(PdfValue::Null),
        Json::Bool(b) => Ok(PdfValue::Bool(*b)),
        Json::Number(n) => number_from_json(n, path),
        Json::String(s) => string_from_json(s, path),
        Json::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| value_from_json(item, &child(path, &i.to_string())))
            .collect::<Result<Vec<_>>>()
            .map(PdfValue::Array),
        Json::Object(map) => {
            if let Some(id) = reference_from_json(map, path)? {
                return Ok(PdfValue::Ref(id));
            }
            if map.contains_key("stream") {
                return Err(PdfError::schema(
                    path,
                    "streams are only allowed as top-level objects",
                ));
            }
            dict_from_json(map, path).map(PdfValue::Dict)
        }
    }
}

fn number_from_json(n: &Number, path: &str) -> Result<PdfValue> {
    if let Some(i) = n.as_i64() {
        Ok(PdfValue::Int(i))
    } else if n.is_f64() {
        n.as_f64()
            .map(PdfValue::Real)
            .ok_or_else(|| PdfError::schema(path, "invalid real"))
    } else {
        Err(PdfError::schema(path, format!("integer {n} out of range")))
    }
}

fn string_from_json(s: &str, path: &str) -> Result<PdfValue> {
    if let Some(name) = s.strip_prefix('/') {
        Ok(PdfValue::Name(name.to_string()))
    } else if let Some(text) = s.strip_prefix(TEXT_PREFIX) {
        Ok(PdfValue::String(text.as_bytes().to_vec()))
    } else if let Some(digits) = s.strip_prefix(BINARY_PREFIX) {
        hex::decode(digits)
            .map(PdfValue::String)
            .map_err(|err| PdfError::schema(path, format!("bad hex string: {err}")))
    } else {
        Err(PdfError::schema(
            path,
            format!("string {s:?} is neither a /name nor a u: or b: string"),
        ))
    }
}

/// `Some` when `map` is a `{"ref": [num, gen]}` marker.
pub(crate) fn reference_from_json(map: &Map<String, Json>, path: &str) -> Result<Option<ObjectId>> {
    let Some(target) = map.get(REF_KEY) else {
        return Ok(None);
    };
    let path = child(path, REF_KEY);
    if map.len() != 1 {
        return Err(PdfError::schema(path, "reference marker has extra keys"));
    }
    let pair = target
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| PdfError::schema(&path, "expected [number, generation]"))?;
    let number = pair[0]
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| PdfError::schema(child(&path, "0"), "invalid object number"))?;
    let generation = pair[1]
        .as_u64()
        .and_then(|g| u16::try_from(g).ok())
        .ok_or_else(|| PdfError::schema(child(&path, "1"), "invalid generation"))?;
    Ok(Some(ObjectId::new(number, generation)))
}

pub(crate) fn dict_from_json(map: &Map<String, Json>, path: &str) -> Result<Dictionary> {
    map.iter()
        .map(|(key, value)| {
            let key_path = child(path, key);
            let name = key.strip_prefix('/').ok_or_else(|| {
                PdfError::schema(&key_path, "dictionary keys must start with '/'")
            })?;
            Ok((name.to_string(), value_from_json(value, &key_path)?))
        })
        .collect()
}
