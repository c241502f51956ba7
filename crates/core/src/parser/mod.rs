//! PDF tokenizer and object parser.
//!
//! - `lexer`: byte stream to tokens
//! - `pdf_parser`: tokens to [`PdfValue`](crate::model::PdfValue)s and indirect objects

pub mod lexer;
pub mod pdf_parser;

pub use lexer::{Keyword, Lexer, Token, is_delimiter, is_whitespace};
pub use pdf_parser::{PdfParser, StreamOptions};
