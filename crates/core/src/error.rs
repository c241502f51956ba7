//! Error types for the pdfjson codec.

use crate::model::ObjectId;
use thiserror::Error;

/// Coarse classification of a [`PdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lexer/parser grammar violation.
    MalformedSyntax,
    /// A reference or xref entry points nowhere.
    UnresolvedReference,
    /// A stream filter that cannot be applied.
    UnsupportedFilter,
    /// JSON input does not match the projection schema.
    SchemaViolation,
    /// A document feature the codec refuses to handle (e.g. encryption).
    Unsupported,
    /// The caller-supplied deadline passed.
    Deadline,
    /// Underlying I/O failure.
    Io,
}

/// Primary error type for codec operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("malformed syntax at position {pos}: {msg}")]
    MalformedSyntax { pos: usize, msg: String },

    #[error("unexpected token at position {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        pos: usize,
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unresolved reference: {0}")]
    UnresolvedReference(ObjectId),

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("{filter} decode error: {msg}")]
    Decode { filter: String, msg: String },

    #[error("schema violation at {path}: {msg}")]
    SchemaViolation { path: String, msg: String },

    #[error("encrypted documents are not supported")]
    Encrypted,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PdfError {
    pub(crate) fn syntax(pos: usize, msg: impl Into<String>) -> Self {
        Self::MalformedSyntax {
            pos,
            msg: msg.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SchemaViolation {
            path: path.into(),
            msg: msg.into(),
        }
    }

    /// Classify this error into the codec's error taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedSyntax { .. } | Self::UnexpectedToken { .. } | Self::UnexpectedEof => {
                ErrorKind::MalformedSyntax
            }
            Self::UnresolvedReference(_) | Self::NoValidXRef => ErrorKind::UnresolvedReference,
            Self::UnsupportedFilter(_) | Self::Decode { .. } => ErrorKind::UnsupportedFilter,
            Self::SchemaViolation { .. } | Self::TypeError { .. } | Self::Json(_) => {
                ErrorKind::SchemaViolation
            }
            Self::Encrypted => ErrorKind::Unsupported,
            Self::DeadlineExceeded => ErrorKind::Deadline,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error aborts a whole conversion.
    ///
    /// Filter failures are local to one stream and are recovered by passing
    /// the raw bytes through.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::UnsupportedFilter)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
