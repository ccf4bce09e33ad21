//! Processor tests against a CSL-JSON fixture and a German locale file

use std::collections::HashMap;
use std::path::PathBuf;

use zettel_citeproc::{CitationItem, CslItem, EngineError, EngineSystem, Processor, Style};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", name))
}

/// Items from the fixture library, locales read from `test_fixtures/`
struct FixtureSystem {
    items: HashMap<String, CslItem>,
}

impl FixtureSystem {
    fn load() -> Self {
        let records: Vec<serde_json::Value> =
            serde_json::from_str(&load_fixture("library.json")).unwrap();
        let items = records
            .into_iter()
            .map(|r| {
                let item = CslItem::from_value(r).unwrap();
                (item.id.clone(), item)
            })
            .collect();
        Self { items }
    }
}

impl EngineSystem for FixtureSystem {
    fn retrieve_item(&self, id: &str) -> Option<CslItem> {
        self.items.get(id).cloned()
    }

    fn retrieve_locale(&self, lang: &str) -> Option<String> {
        std::fs::read_to_string(fixture_path(&format!("locale-{}.xml", lang))).ok()
    }
}

#[test]
fn test_english_clusters() {
    let processor = Processor::new(FixtureSystem::load(), Style::preview_xml(), "en-US").unwrap();

    assert_eq!(
        processor
            .make_citation_cluster(&[CitationItem::new("smith2020")])
            .unwrap(),
        "(Smith and Müller 2020)"
    );
    assert_eq!(
        processor
            .make_citation_cluster(&[CitationItem::new("lee2021").with_locator("chapter", "2")])
            .unwrap(),
        "(Lee et al. n.d., chap. 2)"
    );
}

#[test]
fn test_german_locale_terms() {
    let processor = Processor::new(FixtureSystem::load(), Style::preview_xml(), "de-DE").unwrap();
    assert_eq!(processor.locale().lang, "de-DE");

    assert_eq!(
        processor
            .make_citation_cluster(&[
                CitationItem::new("smith2020"),
                CitationItem::new("lee2021").with_locator("chapter", "2"),
            ])
            .unwrap(),
        "(Smith und Müller 2020; Lee u.\u{a0}a. o.\u{a0}J., Kap. 2)"
    );
}

#[test]
fn test_malformed_item_fails_alone() {
    let mut processor =
        Processor::new(FixtureSystem::load(), Style::preview_xml(), "en-US").unwrap();

    let err = processor
        .make_citation_cluster(&[CitationItem::new("broken")])
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidField { ref field, .. } if field == "issued"));

    processor
        .update_items(&["smith2020".to_string(), "lee2021".to_string()])
        .unwrap();
    let bibliography = processor.make_bibliography().unwrap().unwrap();
    assert_eq!(bibliography.entries().len(), 2);
    assert!(bibliography.entries()[0].contains("Lee, Min, Ji Park, So Kim, and Ha Cho"));
}

#[test]
fn test_link_wrapping_in_bibliography() {
    let mut processor =
        Processor::new(FixtureSystem::load(), Style::preview_xml(), "en-US").unwrap();
    processor.update_items(&["smith2020".to_string()]).unwrap();

    let plain = processor.make_bibliography().unwrap().unwrap();
    assert!(plain.entries()[0].contains("https://doi.org/10.1000/rust.2020."));
    assert!(!plain.entries()[0].contains("<a href"));

    processor.enable_link_wrapping();
    let linked = processor.make_bibliography().unwrap().unwrap();
    assert!(linked.entries()[0]
        .contains("<a href=\"https://doi.org/10.1000/rust.2020\">https://doi.org/10.1000/rust.2020</a>."));
}
