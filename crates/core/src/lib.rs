//! pdfjson - bidirectional PDF/JSON codec.
//!
//! PDF bytes are parsed into a [`Document`] (trailer plus object table),
//! projected to JSON, and written back to PDF from that projection.

pub mod api;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod json;
pub mod model;
pub mod parser;

pub use api::{document_to_json, json_to_pdf, pdf_to_json, pdf_to_json_batch};
pub use config::{ConvertOptions, JsonSchemaVersion, XrefForm};
pub use document::{Document, read_document, write_document};
pub use error::{ErrorKind, PdfError, Result};
pub use json::{from_json, to_json};
pub use model::{Dictionary, ObjectId, PdfStream, PdfValue};
