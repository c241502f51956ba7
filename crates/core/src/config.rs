//! Per-conversion configuration.
//!
//! Every conversion receives its options explicitly; nothing is global.

use crate::error::{PdfError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// JSON projection schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JsonSchemaVersion {
    /// Stream bytes are hex encoded.
    V1,
    /// Stream bytes are base64 encoded.
    #[default]
    V2,
}

impl JsonSchemaVersion {
    /// Numeric value stored in the `"version"` field.
    pub const fn number(self) -> u64 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    pub const fn from_number(n: u64) -> Option<Self> {
        match n {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }
}

/// Form of the cross-reference section emitted by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum XrefForm {
    /// Classic `xref` table followed by a `trailer` dictionary.
    #[default]
    Table,
    /// A `/Type /XRef` cross-reference stream (PDF 1.5+).
    Stream,
}

/// Options recognized by every conversion entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Rebuild the object index by scanning for `obj` markers when the
    /// xref section is broken or missing.
    pub allow_linear_scan_fallback: bool,
    /// Schema version used when producing JSON.
    pub json_schema_version: JsonSchemaVersion,
    /// Drop objects not reachable from the trailer when writing.
    pub prune_unreachable_objects: bool,
    /// Cross-reference form emitted by the writer.
    pub xref_output_form: XrefForm,
    /// Turn length mismatches and dangling references into hard errors.
    pub strict: bool,
    /// Give unfiltered streams a `/FlateDecode` chain when writing.
    pub compress_streams: bool,
    /// Pretty-print JSON produced by the byte-level API.
    pub pretty_json: bool,
    /// Checked between top-level objects.
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            allow_linear_scan_fallback: true,
            json_schema_version: JsonSchemaVersion::V2,
            prune_unreachable_objects: false,
            xref_output_form: XrefForm::Table,
            strict: false,
            compress_streams: false,
            pretty_json: true,
            deadline: None,
        }
    }
}

impl ConvertOptions {
    pub fn with_linear_scan_fallback(mut self, allow: bool) -> Self {
        self.allow_linear_scan_fallback = allow;
        self
    }

    pub fn with_json_schema_version(mut self, version: JsonSchemaVersion) -> Self {
        self.json_schema_version = version;
        self
    }

    pub fn with_prune_unreachable_objects(mut self, prune: bool) -> Self {
        self.prune_unreachable_objects = prune;
        self
    }

    pub fn with_xref_output_form(mut self, form: XrefForm) -> Self {
        self.xref_output_form = form;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail with `DeadlineExceeded` once the configured deadline has passed.
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(PdfError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
