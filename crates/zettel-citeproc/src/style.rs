//! CSL style header parsing
//!
//! Only the parts of a style that drive the built-in author-date renderer
//! are read: the style class, the citation/bibliography layouts and the
//! name and disambiguation options on those elements.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{EngineError, Result};

const PREVIEW_STYLE: &str = include_str!("../styles/preview.csl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleClass {
    InText,
    Note,
}

/// Affixes and delimiter of a `<layout>` element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub prefix: String,
    pub suffix: String,
    pub delimiter: String,
}

/// Options for abbreviating long author lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtAl {
    pub min: usize,
    pub use_first: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationSection {
    pub layout: Layout,
    pub et_al: Option<EtAl>,
    pub add_year_suffix: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibliographySection {
    pub layout: Layout,
    pub et_al: Option<EtAl>,
    pub hanging_indent: bool,
    pub entry_spacing: u32,
    pub line_spacing: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    pub class: StyleClass,
    pub id: Option<String>,
    pub title: Option<String>,
    pub default_locale: Option<String>,
    pub citation: CitationSection,
    pub bibliography: Option<BibliographySection>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Info,
    Citation,
    Bibliography,
}

impl Style {
    /// The embedded author-date style used for previews
    pub fn default_preview() -> Result<Self> {
        Self::parse(PREVIEW_STYLE)
    }

    pub fn preview_xml() -> &'static str {
        PREVIEW_STYLE
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut section = Section::None;
        let mut current_element = String::new();

        let mut class = None;
        let mut id = None;
        let mut title = None;
        let mut default_locale = None;
        let mut citation: Option<CitationSection> = None;
        let mut bibliography: Option<BibliographySection> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| EngineError::Style(format!("malformed XML: {}", e)))?;

            let (element, is_empty) = match &event {
                Event::Start(e) => (Some(e), false),
                Event::Empty(e) => (Some(e), true),
                _ => (None, false),
            };

            if let Some(e) = element {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if depth == 0 && name != "style" {
                    return Err(EngineError::Style(format!(
                        "root element is <{}>, expected <style>",
                        name
                    )));
                }

                match name.as_str() {
                    "style" => {
                        class = Some(match attr(e, "class").as_deref() {
                            Some("in-text") => StyleClass::InText,
                            Some("note") => StyleClass::Note,
                            other => {
                                return Err(EngineError::Style(format!(
                                    "unknown style class {:?}",
                                    other
                                )))
                            }
                        });
                        default_locale = attr(e, "default-locale");
                    }
                    "info" => section = Section::Info,
                    "citation" => {
                        section = Section::Citation;
                        citation = Some(CitationSection {
                            layout: Layout::default(),
                            et_al: et_al(e),
                            add_year_suffix: attr(e, "disambiguate-add-year-suffix").as_deref()
                                == Some("true"),
                        });
                    }
                    "bibliography" => {
                        section = Section::Bibliography;
                        bibliography = Some(BibliographySection {
                            layout: Layout::default(),
                            et_al: et_al(e),
                            hanging_indent: attr(e, "hanging-indent").as_deref() == Some("true"),
                            entry_spacing: number_attr(e, "entry-spacing").unwrap_or(1),
                            line_spacing: number_attr(e, "line-spacing").unwrap_or(1),
                        });
                    }
                    "layout" => {
                        let layout = Layout {
                            prefix: attr(e, "prefix").unwrap_or_default(),
                            suffix: attr(e, "suffix").unwrap_or_default(),
                            delimiter: attr(e, "delimiter").unwrap_or_default(),
                        };
                        match section {
                            Section::Citation => {
                                if let Some(c) = citation.as_mut() {
                                    c.layout = layout;
                                }
                            }
                            Section::Bibliography => {
                                if let Some(b) = bibliography.as_mut() {
                                    b.layout = layout;
                                }
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }

                current_element = name;
                if !is_empty {
                    depth += 1;
                } else if depth == 0 {
                    break;
                }
            }

            match event {
                Event::Text(e) if section == Section::Info => {
                    let text = e
                        .unescape()
                        .map_err(|e| EngineError::Style(e.to_string()))?
                        .to_string();
                    match current_element.as_str() {
                        "title" => title = Some(text),
                        "id" => id = Some(text),
                        _ => {}
                    }
                }
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    match e.local_name().as_ref() {
                        b"info" | b"citation" | b"bibliography" => section = Section::None,
                        _ => {}
                    }
                    current_element.clear();
                    if depth == 0 {
                        break;
                    }
                }
                Event::Eof => {
                    return Err(EngineError::Style(if depth == 0 {
                        "document has no <style> element".to_string()
                    } else {
                        "unexpected end of document".to_string()
                    }))
                }
                _ => {}
            }
            buf.clear();
        }

        let class = class.ok_or_else(|| EngineError::Style("style has no class".to_string()))?;
        let citation = citation
            .ok_or_else(|| EngineError::Style("style has no <citation> element".to_string()))?;

        Ok(Self {
            class,
            id,
            title,
            default_locale,
            citation,
            bibliography,
        })
    }
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn number_attr(e: &BytesStart<'_>, key: &str) -> Option<u32> {
    attr(e, key).and_then(|v| v.trim().parse().ok())
}

fn et_al(e: &BytesStart<'_>) -> Option<EtAl> {
    let min = number_attr(e, "et-al-min")? as usize;
    let use_first = number_attr(e, "et-al-use-first").unwrap_or(1) as usize;
    Some(EtAl {
        min,
        use_first: use_first.max(1),
    })
}
