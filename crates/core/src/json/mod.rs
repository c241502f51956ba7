//! JSON projection of a [`Document`].
//!
//! ```text
//! {
//!   "version": 2,
//!   "pdfVersion": "1.7",
//!   "trailer": { "/Root": {"ref": [1, 0]} },
//!   "objects": {
//!     "1 0 obj": { "/Type": "/Catalog", "/Pages": {"ref": [2, 0]} },
//!     "4 0 obj": { "stream": {
//!       "dict": { "/Subtype": "/Form" },
//!       "filters": [ {"name": "/FlateDecode", "params": null} ],
//!       "data": "<base64>",
//!       "decoded": true
//!     } }
//!   }
//! }
//! ```
//!
//! Stream data is stored decoded whenever every filter in the chain can be
//! applied; otherwise the raw bytes are kept and `unsupportedFilter` names
//! the filter that stopped decoding.

mod value;

use crate::codec::{Filter, FilterChain, FilterSpec};
use crate::config::{ConvertOptions, JsonSchemaVersion};
use crate::document::{DEFAULT_PDF_VERSION, Document};
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, ObjectId, PdfStream, PdfValue};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value as Json};
use value::{child, dict_from_json, dict_to_json};

/// Stream dictionary keys carried by `filters` or recomputed on write.
const DERIVED_STREAM_KEYS: [&str; 4] = ["Length", "Filter", "DecodeParms", "DP"];

/// Project `doc` to JSON using `opts.json_schema_version`.
pub fn to_json(doc: &Document, opts: &ConvertOptions) -> Result<Json> {
    let version = opts.json_schema_version;
    let mut objects = Map::new();
    for (id, value) in doc.objects() {
        opts.check_deadline()?;
        let projected = match value {
            PdfValue::Stream(stream) => stream_to_json(id, stream, version),
            other => value::value_to_json(other),
        };
        objects.insert(object_key(id), projected);
    }

    let mut root = Map::new();
    root.insert("version".into(), version.number().into());
    root.insert("pdfVersion".into(), doc.version().into());
    root.insert("trailer".into(), Json::Object(dict_to_json(doc.trailer())));
    root.insert("objects".into(), Json::Object(objects));
    Ok(Json::Object(root))
}

/// Rebuild a [`Document`] from its projection.
///
/// The schema version is taken from the `"version"` field, falling back to
/// `opts.json_schema_version`. Any deviation from the schema is a
/// `SchemaViolation` carrying the offending path.
pub fn from_json(json: &Json, opts: &ConvertOptions) -> Result<Document> {
    let root = json
        .as_object()
        .ok_or_else(|| PdfError::schema("", "expected an object"))?;

    let version = match root.get("version") {
        None => opts.json_schema_version,
        Some(v) => v
            .as_u64()
            .and_then(JsonSchemaVersion::from_number)
            .ok_or_else(|| PdfError::schema("/version", format!("unsupported version {v}")))?,
    };
    let pdf_version = match root.get("pdfVersion") {
        None => DEFAULT_PDF_VERSION,
        Some(v) => v
            .as_str()
            .ok_or_else(|| PdfError::schema("/pdfVersion", "expected a string"))?,
    };
    // the version is written verbatim into the header comment line
    if !is_pdf_version(pdf_version) {
        return Err(PdfError::schema(
            "/pdfVersion",
            format!("invalid version {pdf_version:?}"),
        ));
    }

    let mut doc = Document::new(pdf_version);
    let trailer = root
        .get("trailer")
        .and_then(Json::as_object)
        .ok_or_else(|| PdfError::schema("/trailer", "expected an object"))?;
    doc.set_trailer(dict_from_json(trailer, "/trailer")?);

    let objects = root
        .get("objects")
        .and_then(Json::as_object)
        .ok_or_else(|| PdfError::schema("/objects", "expected an object"))?;
    for (key, value) in objects {
        opts.check_deadline()?;
        let path = child("/objects", key);
        let id = parse_object_key(key)
            .ok_or_else(|| PdfError::schema(&path, "keys must look like \"<num> <gen> obj\""))?;
        let stream = value.as_object().and_then(|m| m.get("stream").map(|s| (m.len(), s)));
        let parsed = match stream {
            Some((1, stream)) => stream_from_json(stream, &child(&path, "stream"), version)?.into(),
            Some(_) => return Err(PdfError::schema(path, "stream wrapper has extra keys")),
            None => value::value_from_json(value, &path)?,
        };
        if doc.insert(id, parsed).is_some() {
            return Err(PdfError::schema(path, format!("object {id} defined twice")));
        }
    }
    Ok(doc)
}

/// Digits and dots, as the reader accepts them from a `%PDF-` header.
fn is_pdf_version(version: &str) -> bool {
    version.starts_with(|c: char| c.is_ascii_digit())
        && version.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

fn object_key(id: ObjectId) -> String {
    format!("{} {} obj", id.number, id.generation)
}

fn parse_object_key(key: &str) -> Option<ObjectId> {
    let mut parts = key.split(' ');
    let number = parts.next()?.parse().ok()?;
    let generation = parts.next()?.parse().ok()?;
    (parts.next() == Some("obj") && parts.next().is_none())
        .then(|| ObjectId::new(number, generation))
}

fn encode_data(bytes: &[u8], version: JsonSchemaVersion) -> String {
    match version {
        JsonSchemaVersion::V1 => hex::encode(bytes),
        JsonSchemaVersion::V2 => BASE64.encode(bytes),
    }
}

fn decode_data(text: &str, version: JsonSchemaVersion, path: &str) -> Result<Vec<u8>> {
    match version {
        JsonSchemaVersion::V1 => hex::decode(text).map_err(|e| PdfError::schema(path, e.to_string())),
        JsonSchemaVersion::V2 => BASE64
            .decode(text)
            .map_err(|e| PdfError::schema(path, e.to_string())),
    }
}

fn stream_to_json(id: ObjectId, stream: &PdfStream, version: JsonSchemaVersion) -> Json {
    let chain = stream.filter_chain();
    let mut dict = stream.dict.clone();
    for key in DERIVED_STREAM_KEYS {
        dict.shift_remove(key);
    }

    let filters: Vec<Json> = chain
        .iter()
        .map(|spec| {
            let mut entry = Map::new();
            entry.insert("name".into(), format!("/{}", spec.filter.name()).into());
            entry.insert(
                "params".into(),
                spec.params
                    .as_ref()
                    .map_or(Json::Null, |p| Json::Object(dict_to_json(p))),
            );
            Json::Object(entry)
        })
        .collect();

    let mut out = Map::new();
    out.insert("dict".into(), Json::Object(dict_to_json(&dict)));
    out.insert("filters".into(), Json::Array(filters));
    match chain.decode(stream.raw()) {
        Ok(decoded) => {
            out.insert("data".into(), encode_data(&decoded, version).into());
            out.insert("decoded".into(), true.into());
        }
        Err(err) => {
            let blocking = match &err {
                PdfError::UnsupportedFilter(name) => name.clone(),
                PdfError::Decode { filter, .. } => filter.clone(),
                other => other.to_string(),
            };
            tracing::warn!(object = %id, filter = %blocking, error = %err, "stream kept encoded");
            out.insert("data".into(), encode_data(stream.raw(), version).into());
            out.insert("decoded".into(), false.into());
            out.insert("unsupportedFilter".into(), format!("/{blocking}").into());
        }
    }

    let mut wrapper = Map::new();
    wrapper.insert("stream".into(), Json::Object(out));
    Json::Object(wrapper)
}

fn stream_from_json(json: &Json, path: &str, version: JsonSchemaVersion) -> Result<PdfStream> {
    let map = json
        .as_object()
        .ok_or_else(|| PdfError::schema(path, "expected an object"))?;
    if let Some(unknown) = map.keys().find(|k| {
        !matches!(
            k.as_str(),
            "dict" | "filters" | "data" | "decoded" | "unsupportedFilter"
        )
    }) {
        return Err(PdfError::schema(child(path, unknown), "unknown stream field"));
    }

    let dict_path = child(path, "dict");
    let mut dict = match map.get("dict") {
        Some(Json::Object(d)) => dict_from_json(d, &dict_path)?,
        None => Dictionary::new(),
        Some(_) => return Err(PdfError::schema(dict_path, "expected an object")),
    };

    let chain = match map.get("filters") {
        None | Some(Json::Null) => FilterChain::default(),
        Some(Json::Array(entries)) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| filter_from_json(entry, &child(&child(path, "filters"), &i.to_string())))
            .collect::<Result<Vec<_>>>()
            .map(FilterChain::new)?,
        Some(_) => return Err(PdfError::schema(child(path, "filters"), "expected an array")),
    };

    let data_path = child(path, "data");
    let data = map
        .get("data")
        .and_then(Json::as_str)
        .ok_or_else(|| PdfError::schema(&data_path, "expected a string"))?;
    let bytes = decode_data(data, version, &data_path)?;

    let decoded = match map.get("decoded") {
        None => true,
        Some(Json::Bool(b)) => *b,
        Some(_) => return Err(PdfError::schema(child(path, "decoded"), "expected a boolean")),
    };

    let raw = if decoded {
        chain.encode(&bytes).map_err(|err| {
            PdfError::schema(&data_path, format!("cannot re-encode decoded data: {err}"))
        })?
    } else {
        bytes
    };

    chain.apply_to_dict(&mut dict);
    dict.insert("Length".into(), PdfValue::Int(raw.len() as i64));
    Ok(PdfStream::new(dict, raw))
}

fn filter_from_json(entry: &Json, path: &str) -> Result<FilterSpec> {
    let map = entry
        .as_object()
        .ok_or_else(|| PdfError::schema(path, "expected a filter object"))?;
    let name = map
        .get("name")
        .and_then(Json::as_str)
        .and_then(|n| n.strip_prefix('/'))
        .ok_or_else(|| PdfError::schema(child(path, "name"), "expected a /name"))?;
    let params = match map.get("params") {
        None | Some(Json::Null) => None,
        Some(Json::Object(p)) => Some(dict_from_json(p, &child(path, "params"))?),
        Some(_) => return Err(PdfError::schema(child(path, "params"), "expected an object or null")),
    };
    Ok(FilterSpec::new(Filter::from_name(name), params))
}
