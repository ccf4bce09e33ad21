//! The stateful citation processor
//!
//! A [`Processor`] owns one parsed style and locale plus the citation
//! registry: the ordered set of items currently cited in a document. The
//! registry drives year-suffix disambiguation and the bibliography.
//! Items are never cached; every operation retrieves them through the
//! [`EngineSystem`] so the processor always sees the caller's table.

use std::collections::HashMap;

use serde::Serialize;

use crate::citation::CitationItem;
use crate::error::{EngineError, Result};
use crate::item::CslItem;
use crate::locale::{Locale, DEFAULT_LANG};
use crate::output::wrap_links;
use crate::render;
use crate::style::Style;

/// Callbacks through which the processor reaches its data
pub trait EngineSystem: Send {
    /// Look up an item by id
    fn retrieve_item(&self, id: &str) -> Option<CslItem>;

    /// Load the locale XML for a BCP-47 tag; `None` lets the processor fall back
    fn retrieve_locale(&self, lang: &str) -> Option<String>;
}

/// Layout parameters of a generated bibliography
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BibliographyParams {
    pub maxoffset: u32,
    pub entryspacing: u32,
    pub linespacing: u32,
    pub hangingindent: u32,
    #[serde(rename = "second-field-align")]
    pub second_field_align: bool,
    pub bibstart: String,
    pub bibend: String,
    pub bibliography_errors: Vec<String>,
}

/// `[params, entries]`, the shape editors expect from citeproc
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bibliography(pub BibliographyParams, pub Vec<String>);

impl Bibliography {
    pub fn params(&self) -> &BibliographyParams {
        &self.0
    }

    pub fn entries(&self) -> &[String] {
        &self.1
    }

    /// The complete HTML block
    pub fn to_html(&self) -> String {
        format!("{}{}{}", self.0.bibstart, self.1.concat(), self.0.bibend)
    }
}

pub struct Processor {
    sys: Box<dyn EngineSystem>,
    style: Style,
    locale: Locale,
    link_wrapping: bool,
    registry: Vec<String>,
    year_suffixes: HashMap<String, String>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("style", &self.style.title)
            .field("lang", &self.locale.lang)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Processor {
    /// Build a processor for `style_xml` in language `lang`.
    ///
    /// An unparseable style is an error. A missing or broken locale is not:
    /// the style's default locale is tried next, then built-in `en-US`.
    pub fn new(sys: impl EngineSystem + 'static, style_xml: &str, lang: &str) -> Result<Self> {
        let style = Style::parse(style_xml)?;

        let mut candidates = vec![lang.to_string()];
        if let Some(default) = style.default_locale.as_ref() {
            candidates.push(default.clone());
        }

        let mut locale = None;
        for candidate in &candidates {
            if candidate == DEFAULT_LANG {
                locale = Some(Locale::en_us());
                break;
            }
            match sys.retrieve_locale(candidate).map(|xml| Locale::parse(&xml)) {
                Some(Ok(parsed)) => {
                    locale = Some(parsed);
                    break;
                }
                Some(Err(e)) => tracing::warn!(lang = %candidate, "Ignoring locale: {}", e),
                None => tracing::warn!(lang = %candidate, "Locale not available, falling back"),
            }
        }

        Ok(Self {
            sys: Box::new(sys),
            style,
            locale: locale.unwrap_or_else(Locale::en_us),
            link_wrapping: false,
            registry: Vec::new(),
            year_suffixes: HashMap::new(),
        })
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn registry(&self) -> &[String] {
        &self.registry
    }

    /// Turn URLs and DOIs in rendered output into anchors
    pub fn enable_link_wrapping(&mut self) {
        self.link_wrapping = true;
    }

    fn item(&self, id: &str) -> Result<CslItem> {
        self.sys
            .retrieve_item(id)
            .ok_or_else(|| EngineError::ItemNotFound(id.to_string()))
    }

    fn finish(&self, html: String) -> String {
        if self.link_wrapping {
            wrap_links(&html)
        } else {
            html
        }
    }

    /// Render one inline citation cluster
    pub fn make_citation_cluster(&self, items: &[CitationItem]) -> Result<String> {
        if items.is_empty() {
            return Err(EngineError::EmptyCluster);
        }

        let citation = &self.style.citation;
        let cites = items
            .iter()
            .map(|cite_item| {
                let item = self.item(&cite_item.id)?;
                render::cite(
                    &item,
                    cite_item,
                    &self.locale,
                    citation.et_al,
                    self.year_suffixes.get(&item.id).map(String::as_str),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let body = cites.join(&citation.layout.delimiter);
        let html = if items.iter().all(|i| i.author_only) {
            body
        } else {
            let suffix = render::trim_repeated_period(&body, &citation.layout.suffix);
            format!("{}{}{}", citation.layout.prefix, body, suffix)
        };
        Ok(self.finish(html))
    }

    /// Replace the registry with `ids` (duplicates dropped, order kept).
    ///
    /// Every id must resolve. On error the previous registry stays intact.
    pub fn update_items(&mut self, ids: &[String]) -> Result<()> {
        let mut registry: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !registry.contains(id) {
                registry.push(id.clone());
            }
        }

        let items = registry
            .iter()
            .map(|id| self.item(id))
            .collect::<Result<Vec<_>>>()?;
        let year_suffixes = self.disambiguate(&items)?;

        self.registry = registry;
        self.year_suffixes = year_suffixes;
        Ok(())
    }

    /// Items sharing author and year get `a`, `b`, ... ordered by title
    fn disambiguate(&self, items: &[CslItem]) -> Result<HashMap<String, String>> {
        let mut suffixes = HashMap::new();
        if !self.style.citation.add_year_suffix {
            return Ok(suffixes);
        }

        let mut groups: HashMap<(String, String), Vec<&CslItem>> = HashMap::new();
        for item in items {
            let author = render::short_author(item, &self.locale, self.style.citation.et_al)?;
            let year = render::year_label(item, &self.locale)?;
            groups.entry((author, year)).or_default().push(item);
        }

        for mut group in groups.into_values().filter(|g| g.len() > 1) {
            group.sort_by(|a, b| {
                let a_title = a.title().unwrap_or_default().to_lowercase();
                let b_title = b.title().unwrap_or_default().to_lowercase();
                a_title.cmp(&b_title).then_with(|| a.id.cmp(&b.id))
            });
            for (i, item) in group.into_iter().enumerate() {
                suffixes.insert(item.id.clone(), year_suffix(i));
            }
        }
        Ok(suffixes)
    }

    /// The bibliography for the current registry.
    ///
    /// `None` when the style has no bibliography or nothing is registered.
    pub fn make_bibliography(&self) -> Result<Option<Bibliography>> {
        let Some(section) = self.style.bibliography.as_ref() else {
            return Ok(None);
        };
        if self.registry.is_empty() {
            return Ok(None);
        }

        let mut keyed = Vec::with_capacity(self.registry.len());
        for id in &self.registry {
            let item = self.item(id)?;
            let key = render::sort_key(&item)?;
            let body = render::bibliography_entry(
                &item,
                &self.locale,
                section.et_al,
                self.year_suffixes.get(id).map(String::as_str),
            )?;
            keyed.push((key, body));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let layout = &section.layout;
        let entries = keyed
            .into_iter()
            .map(|(_, body)| {
                let suffix = render::trim_repeated_period(&body, &layout.suffix);
                let html = format!("{}{}{}", layout.prefix, body, suffix);
                format!("  <div class=\"csl-entry\">{}</div>\n", self.finish(html))
            })
            .collect();

        let params = BibliographyParams {
            maxoffset: 0,
            entryspacing: section.entry_spacing,
            linespacing: section.line_spacing,
            hangingindent: if section.hanging_indent { 2 } else { 0 },
            second_field_align: false,
            bibstart: "<div class=\"csl-bib-body\">\n".to_string(),
            bibend: "</div>".to_string(),
            bibliography_errors: Vec::new(),
        };
        Ok(Some(Bibliography(params, entries)))
    }
}

/// `a` .. `z`, then `aa`, `ab`, ...
fn year_suffix(index: usize) -> String {
    let mut n = index;
    let mut letters = Vec::new();
    loop {
        letters.push((b'a' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Table {
        items: HashMap<String, CslItem>,
        locales: HashMap<String, String>,
    }

    impl Table {
        fn with(items: Vec<serde_json::Value>) -> Self {
            let items = items
                .into_iter()
                .map(|v| {
                    let item = CslItem::from_value(v).unwrap();
                    (item.id.clone(), item)
                })
                .collect();
            Self {
                items,
                locales: HashMap::new(),
            }
        }
    }

    impl EngineSystem for Table {
        fn retrieve_item(&self, id: &str) -> Option<CslItem> {
            self.items.get(id).cloned()
        }

        fn retrieve_locale(&self, lang: &str) -> Option<String> {
            self.locales.get(lang).cloned()
        }
    }

    fn smiths() -> Table {
        Table::with(vec![
            json!({
                "id": "smith2020b", "title": "Zebras",
                "author": [{ "family": "Smith", "given": "John" }],
                "issued": { "date-parts": [[2020]] }
            }),
            json!({
                "id": "smith2020a", "title": "Antelopes",
                "author": [{ "family": "Smith", "given": "John" }],
                "issued": { "date-parts": [[2020]] }
            }),
            json!({
                "id": "doe2019", "title": "Deer", "type": "book",
                "author": [{ "family": "Doe", "given": "Jane" }],
                "issued": { "date-parts": [[2019]] },
                "URL": "https://example.org/deer"
            }),
        ])
    }

    fn processor(table: Table) -> Processor {
        Processor::new(table, Style::preview_xml(), "en-US").unwrap()
    }

    #[test]
    fn test_cluster() {
        let p = processor(smiths());
        let html = p
            .make_citation_cluster(&[
                CitationItem::new("doe2019").with_locator("page", "4"),
                CitationItem::new("smith2020a"),
            ])
            .unwrap();
        assert_eq!(html, "(Doe 2019, 4; Smith 2020)");
    }

    #[test]
    fn test_cluster_errors() {
        let p = processor(smiths());
        assert_eq!(p.make_citation_cluster(&[]), Err(EngineError::EmptyCluster));
        assert_eq!(
            p.make_citation_cluster(&[CitationItem::new("nobody")]),
            Err(EngineError::ItemNotFound("nobody".to_string()))
        );
    }

    #[test]
    fn test_year_suffixes_follow_registry() {
        let mut p = processor(smiths());
        p.update_items(&["smith2020b".into(), "smith2020a".into(), "doe2019".into()])
            .unwrap();
        assert_eq!(
            p.make_citation_cluster(&[CitationItem::new("smith2020b")]).unwrap(),
            "(Smith 2020b)"
        );
        assert_eq!(
            p.make_citation_cluster(&[CitationItem::new("smith2020a")]).unwrap(),
            "(Smith 2020a)"
        );

        p.update_items(&["smith2020b".into()]).unwrap();
        assert_eq!(
            p.make_citation_cluster(&[CitationItem::new("smith2020b")]).unwrap(),
            "(Smith 2020)"
        );
    }

    #[test]
    fn test_failed_update_keeps_registry() {
        let mut p = processor(smiths());
        p.update_items(&["doe2019".into()]).unwrap();
        assert!(p.update_items(&["doe2019".into(), "ghost".into()]).is_err());
        assert_eq!(p.registry(), &["doe2019".to_string()]);
    }

    #[test]
    fn test_bibliography() {
        let mut p = processor(smiths());
        assert_eq!(p.make_bibliography().unwrap(), None);

        p.enable_link_wrapping();
        p.update_items(&["smith2020a".into(), "doe2019".into(), "doe2019".into()])
            .unwrap();
        let bib = p.make_bibliography().unwrap().unwrap();
        assert_eq!(bib.entries().len(), 2);
        assert_eq!(
            bib.entries()[0],
            "  <div class=\"csl-entry\">Doe, Jane. 2019. <i>Deer</i>. \
             <a href=\"https://example.org/deer\">https://example.org/deer</a>.</div>\n"
        );
        assert!(bib.entries()[1].contains("Smith, John. 2020. \u{201C}Antelopes\u{201D}."));
        assert_eq!(bib.params().hangingindent, 2);
        assert!(bib.to_html().starts_with("<div class=\"csl-bib-body\">"));

        let json = serde_json::to_value(&bib).unwrap();
        assert!(json[0]["second-field-align"].is_boolean());
        assert_eq!(json[1].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_locale_fallback() {
        let mut table = smiths();
        table.locales.insert("fr-FR".into(), "<not-a-locale/>".into());
        let p = Processor::new(table, Style::preview_xml(), "fr-FR").unwrap();
        assert_eq!(p.locale().lang, "en-US");

        let mut table = smiths();
        table.locales.insert(
            "de-DE".into(),
            r#"<locale xml:lang="de-DE"><terms><term name="and">und</term></terms></locale>"#
                .into(),
        );
        let p = Processor::new(table, Style::preview_xml(), "de-DE").unwrap();
        assert_eq!(p.locale().lang, "de-DE");
    }

    #[test]
    fn test_bad_style_is_an_error() {
        assert!(matches!(
            Processor::new(smiths(), "<style>", "en-US"),
            Err(EngineError::Style(_))
        ));
    }

    #[test]
    fn test_year_suffix_letters() {
        assert_eq!(year_suffix(0), "a");
        assert_eq!(year_suffix(25), "z");
        assert_eq!(year_suffix(26), "aa");
        assert_eq!(year_suffix(27), "ab");
    }
}
