//! # zettel-citeproc
//!
//! A compact, stateful citation processor for CSL-JSON items.
//!
//! The processor renders author-date inline citations and bibliographies
//! from a CSL style's layout options and a CSL locale's terms. Item and
//! locale data are pulled through the [`EngineSystem`] callbacks.
//!
//! ```ignore
//! let mut processor = Processor::new(system, Style::preview_xml(), "en-US")?;
//! processor.enable_link_wrapping();
//! let html = processor.make_citation_cluster(&[CitationItem::new("smith2020")])?;
//! ```

mod citation;
mod error;
mod item;
mod locale;
mod output;
mod processor;
mod render;
mod style;

pub use citation::{Citation, CitationItem, CitationProperties};
pub use error::{EngineError, Result};
pub use item::{CslItem, DateValue, Name};
pub use locale::{Locale, Term, TermForm, DEFAULT_LANG};
pub use output::{escape_html, wrap_links};
pub use processor::{Bibliography, BibliographyParams, EngineSystem, Processor};
pub use style::{BibliographySection, CitationSection, EtAl, Layout, Style, StyleClass};
