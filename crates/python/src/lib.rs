//! Python bindings for the pdfjson codec.
//!
//! Exposes the two byte-in/byte-out conversions. Core error kinds map to
//! exception classes deriving from `PdfJsonError` (itself a `ValueError`).

use pdfjson_core::{ConvertOptions, ErrorKind, JsonSchemaVersion, PdfError, XrefForm};
use pyo3::create_exception;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;

create_exception!(_pdfjson, PdfJsonError, PyValueError, "Base class for codec failures.");
create_exception!(_pdfjson, MalformedSyntaxError, PdfJsonError, "The PDF could not be parsed.");
create_exception!(
    _pdfjson,
    UnresolvedReferenceError,
    PdfJsonError,
    "A reference or xref entry points nowhere."
);
create_exception!(
    _pdfjson,
    SchemaViolationError,
    PdfJsonError,
    "The JSON does not follow the projection schema."
);
create_exception!(
    _pdfjson,
    UnsupportedError,
    PdfJsonError,
    "The input uses a feature the codec does not handle."
);

fn to_py_err(err: PdfError) -> PyErr {
    let msg = err.to_string();
    match err.kind() {
        ErrorKind::MalformedSyntax => MalformedSyntaxError::new_err(msg),
        ErrorKind::UnresolvedReference => UnresolvedReferenceError::new_err(msg),
        ErrorKind::SchemaViolation => SchemaViolationError::new_err(msg),
        ErrorKind::UnsupportedFilter | ErrorKind::Unsupported => UnsupportedError::new_err(msg),
        ErrorKind::Deadline | ErrorKind::Io => PdfJsonError::new_err(msg),
    }
}

fn parse_schema_version(version: u64) -> PyResult<JsonSchemaVersion> {
    JsonSchemaVersion::from_number(version)
        .ok_or_else(|| PyValueError::new_err(format!("unsupported json_schema_version {version}")))
}

fn parse_xref_form(form: &str) -> PyResult<XrefForm> {
    match form {
        "table" => Ok(XrefForm::Table),
        "stream" => Ok(XrefForm::Stream),
        other => Err(PyValueError::new_err(format!(
            "xref_output_form must be 'table' or 'stream', got {other:?}"
        ))),
    }
}

/// Convert PDF bytes to JSON bytes.
#[pyfunction]
#[pyo3(signature = (data, *, allow_linear_scan_fallback = true, json_schema_version = 2, strict = false, pretty = true))]
fn convert_pdf_to_json<'py>(
    py: Python<'py>,
    data: &[u8],
    allow_linear_scan_fallback: bool,
    json_schema_version: u64,
    strict: bool,
    pretty: bool,
) -> PyResult<Bound<'py, PyBytes>> {
    let opts = ConvertOptions::default()
        .with_linear_scan_fallback(allow_linear_scan_fallback)
        .with_json_schema_version(parse_schema_version(json_schema_version)?)
        .with_strict(strict)
        .with_pretty_json(pretty);
    let out = py
        .detach(|| pdfjson_core::pdf_to_json(data, &opts))
        .map_err(to_py_err)?;
    Ok(PyBytes::new(py, &out))
}

/// Convert JSON bytes back to PDF bytes.
#[pyfunction]
#[pyo3(signature = (data, *, prune_unreachable_objects = false, xref_output_form = "table", compress_streams = false))]
fn convert_json_to_pdf<'py>(
    py: Python<'py>,
    data: &[u8],
    prune_unreachable_objects: bool,
    xref_output_form: &str,
    compress_streams: bool,
) -> PyResult<Bound<'py, PyBytes>> {
    let opts = ConvertOptions::default()
        .with_prune_unreachable_objects(prune_unreachable_objects)
        .with_xref_output_form(parse_xref_form(xref_output_form)?)
        .with_compress_streams(compress_streams);
    let out = py
        .detach(|| pdfjson_core::json_to_pdf(data, &opts))
        .map_err(to_py_err)?;
    Ok(PyBytes::new(py, &out))
}

#[pymodule]
fn _pdfjson(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("PdfJsonError", py.get_type::<PdfJsonError>())?;
    m.add("MalformedSyntaxError", py.get_type::<MalformedSyntaxError>())?;
    m.add("UnresolvedReferenceError", py.get_type::<UnresolvedReferenceError>())?;
    m.add("SchemaViolationError", py.get_type::<SchemaViolationError>())?;
    m.add("UnsupportedError", py.get_type::<UnsupportedError>())?;
    m.add_function(wrap_pyfunction!(convert_pdf_to_json, m)?)?;
    m.add_function(wrap_pyfunction!(convert_json_to_pdf, m)?)?;
    Ok(())
}
