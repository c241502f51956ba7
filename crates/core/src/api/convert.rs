//! Byte-in/byte-out conversions.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::config::ConvertOptions;
use crate::document::{Document, read_document, write_document};
use crate::error::{PdfError, Result};
use crate::json::{from_json, to_json};

pub(crate) fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Convert PDF bytes to JSON bytes.
///
/// # Example
/// ```ignore
/// use pdfjson_core::{ConvertOptions, pdf_to_json};
///
/// let pdf = std::fs::read("document.pdf")?;
/// let json = pdf_to_json(&pdf, &ConvertOptions::default())?;
/// ```
pub fn pdf_to_json(pdf: &[u8], opts: &ConvertOptions) -> Result<Vec<u8>> {
    let doc = read_document(pdf.to_vec(), opts)?;
    document_to_json(&doc, opts)
}

/// Serialize an already loaded document as JSON bytes.
pub fn document_to_json(doc: &Document, opts: &ConvertOptions) -> Result<Vec<u8>> {
    let json = to_json(doc, opts)?;
    let bytes = if opts.pretty_json {
        serde_json::to_vec_pretty(&json)?
    } else {
        serde_json::to_vec(&json)?
    };
    Ok(bytes)
}

/// Convert JSON bytes (as produced by [`pdf_to_json`]) back to PDF bytes.
///
/// Input that is not JSON at all is a `SchemaViolation` at the root path.
pub fn json_to_pdf(json: &[u8], opts: &ConvertOptions) -> Result<Vec<u8>> {
    let value: serde_json::Value = serde_json::from_slice(json)
        .map_err(|err| PdfError::schema("", format!("invalid JSON: {err}")))?;
    let doc = from_json(&value, opts)?;
    write_document(&doc, opts)
}

/// Convert many independent PDFs in parallel.
///
/// Each conversion owns its document; results come back in input order.
/// `threads` of `None` uses the available parallelism.
pub fn pdf_to_json_batch<I>(
    inputs: &[I],
    opts: &ConvertOptions,
    threads: Option<usize>,
) -> Result<Vec<Result<Vec<u8>>>>
where
    I: AsRef<[u8]> + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or_else(default_thread_count))
        .build()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    tracing::debug!(documents = inputs.len(), threads = pool.current_num_threads(), "batch conversion");

    Ok(pool.install(|| {
        inputs
            .par_iter()
            .map(|pdf| pdf_to_json(pdf.as_ref(), opts))
            .collect()
    }))
}
