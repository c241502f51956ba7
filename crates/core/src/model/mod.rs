//! PDF data model: values, indirect object ids and streams.

pub mod objects;

pub use objects::{Dictionary, ObjectId, PdfStream, PdfValue};
