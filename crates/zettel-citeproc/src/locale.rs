//! CSL locale terms
//!
//! Locale files are `<locale xml:lang="..">` documents; only `<terms>` is
//! read. Terms missing from a loaded locale fall back to the built-in
//! `en-US` table.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{EngineError, Result};

pub const DEFAULT_LANG: &str = "en-US";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermForm {
    Long,
    Short,
    Symbol,
}

impl TermForm {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("short") => Self::Short,
            Some("symbol") => Self::Symbol,
            _ => Self::Long,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub single: String,
    pub multiple: String,
}

impl Term {
    fn same(text: &str) -> Self {
        Self {
            single: text.to_string(),
            multiple: text.to_string(),
        }
    }

    fn plural(single: &str, multiple: &str) -> Self {
        Self {
            single: single.to_string(),
            multiple: multiple.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    pub lang: String,
    terms: HashMap<(String, TermForm), Term>,
}

impl Locale {
    /// Built-in American English terms
    pub fn en_us() -> Self {
        use TermForm::*;
        let entries: [(&str, TermForm, Term); 22] = [
            ("and", Long, Term::same("and")),
            ("et-al", Long, Term::same("et al.")),
            ("no date", Long, Term::same("no date")),
            ("no date", Short, Term::same("n.d.")),
            ("in", Long, Term::same("in")),
            ("accessed", Long, Term::same("accessed")),
            ("page", Long, Term::plural("page", "pages")),
            ("page", Short, Term::plural("p.", "pp.")),
            ("chapter", Short, Term::plural("chap.", "chaps.")),
            ("section", Short, Term::plural("sec.", "secs.")),
            ("section", Symbol, Term::plural("§", "§§")),
            ("volume", Short, Term::plural("vol.", "vols.")),
            ("figure", Short, Term::plural("fig.", "figs.")),
            ("issue", Short, Term::plural("no.", "nos.")),
            ("paragraph", Short, Term::plural("para.", "paras.")),
            ("line", Short, Term::plural("l.", "ll.")),
            ("note", Short, Term::plural("n.", "nn.")),
            ("book", Short, Term::plural("bk.", "bks.")),
            ("verse", Short, Term::plural("v.", "vv.")),
            ("editor", Short, Term::plural("ed.", "eds.")),
            ("translator", Short, Term::plural("trans.", "trans.")),
            ("folio", Short, Term::plural("fol.", "fols.")),
        ];

        let terms = entries
            .into_iter()
            .map(|(name, form, term)| ((name.to_string(), form), term))
            .collect();
        Self {
            lang: DEFAULT_LANG.to_string(),
            terms,
        }
    }

    /// Parse a CSL locale document
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut lang = None;
        let mut terms = HashMap::new();
        let mut saw_root = false;

        // (name, form) of the open <term>, plus its collected text
        let mut open_term: Option<(String, TermForm)> = None;
        let mut plain = String::new();
        let mut single: Option<String> = None;
        let mut multiple: Option<String> = None;
        let mut in_plural: Option<bool> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let name = e.local_name();
                    match name.as_ref() {
                        b"locale" => {
                            saw_root = true;
                            for a in e.attributes().flatten() {
                                if a.key.local_name().as_ref() == b"lang" {
                                    lang = Some(String::from_utf8_lossy(&a.value).to_string());
                                }
                            }
                        }
                        b"term" => {
                            let mut term_name = None;
                            let mut form = None;
                            for a in e.attributes().flatten() {
                                match a.key.as_ref() {
                                    b"name" => {
                                        term_name =
                                            Some(String::from_utf8_lossy(&a.value).to_string())
                                    }
                                    b"form" => {
                                        form = Some(String::from_utf8_lossy(&a.value).to_string())
                                    }
                                    _ => {}
                                }
                            }
                            plain.clear();
                            single = None;
                            multiple = None;
                            open_term = term_name.map(|n| (n, TermForm::parse(form.as_deref())));
                        }
                        b"single" => in_plural = Some(false),
                        b"multiple" => in_plural = Some(true),
                        _ => {}
                    }
                }
                Ok(Event::Text(e)) if open_term.is_some() => {
                    let text = e
                        .unescape()
                        .map_err(|e| EngineError::Locale(e.to_string()))?
                        .to_string();
                    match in_plural {
                        Some(false) => single = Some(text),
                        Some(true) => multiple = Some(text),
                        None => plain.push_str(&text),
                    }
                }
                Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                    b"single" | b"multiple" => in_plural = None,
                    b"term" => {
                        if let Some(key) = open_term.take() {
                            let term = match (single.take(), multiple.take()) {
                                (None, None) => Term::same(&plain),
                                (s, m) => {
                                    let s = s.unwrap_or_else(|| plain.clone());
                                    let m = m.unwrap_or_else(|| s.clone());
                                    Term { single: s, multiple: m }
                                }
                            };
                            terms.insert(key, term);
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(EngineError::Locale(format!("malformed XML: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(EngineError::Locale("document has no <locale> element".to_string()));
        }

        Ok(Self {
            lang: lang.unwrap_or_else(|| DEFAULT_LANG.to_string()),
            terms,
        })
    }

    /// Look up a term, falling back to the long form and then to `en-US`
    pub fn term(&self, name: &str, form: TermForm, plural: bool) -> String {
        let pick = |t: &Term| if plural { t.multiple.clone() } else { t.single.clone() };

        for f in [form, TermForm::Long] {
            if let Some(term) = self.terms.get(&(name.to_string(), f)) {
                return pick(term);
            }
        }
        if self.lang != DEFAULT_LANG {
            let fallback = Self::en_us();
            for f in [form, TermForm::Long] {
                if let Some(term) = fallback.terms.get(&(name.to_string(), f)) {
                    return pick(term);
                }
            }
        }
        name.to_string()
    }

    /// Label for a locator, `None` for page numbers which print bare
    pub fn locator_label(&self, label: &str, locator: &str) -> Option<String> {
        if label == "page" {
            return None;
        }
        let plural = locator.contains(['-', '–', ',', '&']);
        let form = if label == "section" {
            TermForm::Symbol
        } else {
            TermForm::Short
        };
        Some(self.term(label, form, plural))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GERMAN: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<locale xmlns="http://purl.org/net/xbiblio/csl" version="1.0" xml:lang="de-DE">
  <terms>
    <term name="and">und</term>
    <term name="no date" form="short">o.&#160;J.</term>
    <term name="page" form="short">
      <single>S.</single>
      <multiple>S.</multiple>
    </term>
  </terms>
</locale>"#;

    #[test]
    fn test_builtin_terms() {
        let locale = Locale::en_us();
        assert_eq!(locale.term("and", TermForm::Long, false), "and");
        assert_eq!(locale.term("no date", TermForm::Short, false), "n.d.");
        assert_eq!(locale.term("page", TermForm::Short, true), "pp.");
        // symbol form missing, long form used
        assert_eq!(locale.term("and", TermForm::Symbol, false), "and");
    }

    #[test]
    fn test_parse_locale_file() {
        let locale = Locale::parse(GERMAN).unwrap();
        assert_eq!(locale.lang, "de-DE");
        assert_eq!(locale.term("and", TermForm::Long, false), "und");
        assert_eq!(locale.term("no date", TermForm::Short, false), "o.\u{a0}J.");
        assert_eq!(locale.term("page", TermForm::Short, true), "S.");
        // falls back to en-US
        assert_eq!(locale.term("et-al", TermForm::Long, false), "et al.");
    }

    #[test]
    fn test_locator_labels() {
        let locale = Locale::en_us();
        assert_eq!(locale.locator_label("page", "12"), None);
        assert_eq!(locale.locator_label("chapter", "3"), Some("chap.".to_string()));
        assert_eq!(locale.locator_label("section", "2-4"), Some("§§".to_string()));
    }

    #[test]
    fn test_invalid_locale() {
        assert!(matches!(Locale::parse("<style/>"), Err(EngineError::Locale(_))));
        assert!(Locale::parse("<locale><terms></locale>").is_err());
    }
}
