//! High-level conversion API.
//!
//! # Example
//!
//! ```ignore
//! use pdfjson_core::api::{json_to_pdf, pdf_to_json};
//! use pdfjson_core::ConvertOptions;
//!
//! let opts = ConvertOptions::default();
//! let json = pdf_to_json(&std::fs::read("in.pdf")?, &opts)?;
//! let pdf = json_to_pdf(&json, &opts)?;
//! ```

pub mod convert;

pub use convert::{document_to_json, json_to_pdf, pdf_to_json, pdf_to_json_batch};
