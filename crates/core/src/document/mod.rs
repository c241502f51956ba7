//! Document layer: cross-reference index, object graph, reading and writing.
//!
//! - `xref` - classic tables, xref streams and the linear-scan fallback
//! - `reader` - PDF bytes to [`Document`]
//! - `graph` - the object table, `walk` and the page tree
//! - `writer` - [`Document`] back to PDF bytes

pub mod graph;
pub mod reader;
pub mod writer;
pub mod xref;

pub use graph::{DEFAULT_PDF_VERSION, Document, Page, Pages, Walk};
pub use reader::read_document;
pub use writer::write_document;
pub use xref::{Location, XrefEntry, XrefTable};
