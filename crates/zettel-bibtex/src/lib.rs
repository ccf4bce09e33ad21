//! BibTeX support for the zettel citation provider
//!
//! Features:
//! - Nom-based parser for `.bib` libraries (`@string`, `@preamble`,
//!   `@comment`, braced/quoted values, `#` concatenation)
//! - LaTeX special character decoding
//! - Conversion of entries to CSL-JSON items
//! - Attachment extraction from `file` and `Bdsk-File-N` fields

mod attachments;
mod csl;
mod entry;
mod latex;
pub mod parser;

pub use attachments::{extract_attachments, AttachmentIndex};
pub use csl::{entries_to_csl, entry_to_csl, parse_names};
pub use entry::{BibTeXEntry, BibTeXEntryType, BibTeXField};
pub use latex::decode_latex;
pub use parser::{parse, BibTeXParseError, BibTeXParseResult, ParseError};
