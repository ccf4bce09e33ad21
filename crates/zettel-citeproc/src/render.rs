//! Author-date formatting of single items
//!
//! Everything here is pure: the processor supplies the style, locale and
//! year suffix, and gets HTML fragments back. Malformed name and date
//! variables surface as errors.

use crate::citation::CitationItem;
use crate::error::Result;
use crate::item::{CslItem, Name};
use crate::locale::{Locale, TermForm};
use crate::output::escape_html;
use crate::style::EtAl;

const CONTRIBUTOR_VARIABLES: [&str; 3] = ["author", "editor", "translator"];

/// Types whose title is set in italics rather than quoted
const STANDALONE_TYPES: &[&str] = &[
    "book",
    "thesis",
    "report",
    "motion_picture",
    "software",
    "dataset",
    "map",
    "musical_score",
    "graphic",
];

/// The first non-empty contributor list
pub(crate) fn contributors(item: &CslItem) -> Result<Option<Vec<Name>>> {
    for variable in CONTRIBUTOR_VARIABLES {
        if let Some(names) = item.names(variable)? {
            return Ok(Some(names));
        }
    }
    Ok(None)
}

/// The year as cited, without suffix; "n.d." when undated
pub(crate) fn year_label(item: &CslItem, locale: &Locale) -> Result<String> {
    Ok(item
        .date("issued")?
        .and_then(|d| d.short_form())
        .unwrap_or_else(|| locale.term("no date", TermForm::Short, false)))
}

/// Plain-text author string used for citations and year-suffix grouping
pub(crate) fn short_author(item: &CslItem, locale: &Locale, et_al: Option<EtAl>) -> Result<String> {
    let Some(names) = contributors(item)? else {
        return Ok(item.title().unwrap_or_default().to_string());
    };
    let shorts: Vec<String> = names.iter().map(Name::short).collect();

    if let Some(e) = et_al.filter(|e| shorts.len() >= e.min) {
        let kept = shorts[..e.use_first.min(shorts.len())].join(", ");
        return Ok(format!("{} {}", kept, locale.term("et-al", TermForm::Long, false)));
    }
    Ok(join_names(&shorts, &locale.term("and", TermForm::Long, false), false))
}

/// `A`, `A and B`, `A, B, and C`; `inverted_first` forces the serial
/// comma for two names ("Smith, John, and Jane Doe")
fn join_names(names: &[String], and: &str, inverted_first: bool) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] if !inverted_first => format!("{} {} {}", first, and, second),
        [init @ .., last] => format!("{}, {} {}", init.join(", "), and, last),
    }
}

/// One cite inside a cluster
pub(crate) fn cite(
    item: &CslItem,
    cite_item: &CitationItem,
    locale: &Locale,
    et_al: Option<EtAl>,
    year_suffix: Option<&str>,
) -> Result<String> {
    let author = short_author(item, locale, et_al)?;
    let year = format!(
        "{}{}",
        year_label(item, locale)?,
        year_suffix.unwrap_or_default()
    );

    let mut out = String::new();
    if let Some(prefix) = cite_item.prefix.as_deref().filter(|p| !p.is_empty()) {
        out.push_str(&escape_html(prefix));
        if !prefix.ends_with(' ') {
            out.push(' ');
        }
    }

    if cite_item.author_only {
        out.push_str(&escape_html(&author));
    } else {
        if !cite_item.suppress_author && !author.is_empty() {
            out.push_str(&escape_html(&author));
            out.push(' ');
        }
        out.push_str(&escape_html(&year));

        if let Some(locator) = cite_item.locator.as_deref().filter(|l| !l.is_empty()) {
            out.push_str(", ");
            let label = cite_item.label.as_deref().unwrap_or("page");
            if let Some(term) = locale.locator_label(label, locator) {
                out.push_str(&escape_html(&term));
                out.push(' ');
            }
            out.push_str(&escape_html(locator));
        }
    }

    if let Some(suffix) = cite_item.suffix.as_deref().filter(|s| !s.is_empty()) {
        if !suffix.starts_with([',', ';', '.', ' ']) {
            out.push(' ');
        }
        out.push_str(&escape_html(suffix));
    }
    Ok(out)
}

/// The body of one bibliography entry, without layout affixes
pub(crate) fn bibliography_entry(
    item: &CslItem,
    locale: &Locale,
    et_al: Option<EtAl>,
    year_suffix: Option<&str>,
) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();
    let title = item.title().map(|t| {
        if STANDALONE_TYPES.contains(&item.item_type()) {
            format!("<i>{}</i>", escape_html(t))
        } else {
            format!("\u{201C}{}\u{201D}", escape_html(t))
        }
    });

    let names = contributors(item)?;
    let title_leads = names.is_none();
    match names {
        Some(names) => parts.push(escape_html(&long_names(&names, locale, et_al))),
        None => parts.extend(title.clone()),
    }

    parts.push(escape_html(&format!(
        "{}{}",
        year_label(item, locale)?,
        year_suffix.unwrap_or_default()
    )));

    if !title_leads {
        parts.extend(title);
    }

    if let Some(container) = item.text("container-title") {
        let mut detail = format!("<i>{}</i>", escape_html(&container));
        if let Some(volume) = item.text("volume") {
            detail.push(' ');
            detail.push_str(&escape_html(&volume));
        }
        if let Some(issue) = item.text("issue") {
            detail.push_str(&format!(" ({})", escape_html(&issue)));
        }
        if let Some(page) = item.text("page") {
            detail.push_str(": ");
            detail.push_str(&escape_html(&page));
        }
        parts.push(detail);
    }

    match (item.text("publisher-place"), item.text("publisher")) {
        (Some(place), Some(publisher)) => {
            parts.push(escape_html(&format!("{}: {}", place, publisher)))
        }
        (None, Some(publisher)) => parts.push(escape_html(&publisher)),
        (Some(place), None) => parts.push(escape_html(&place)),
        (None, None) => {}
    }

    if let Some(doi) = item.text("DOI") {
        let doi = doi.trim_start_matches("https://doi.org/");
        parts.push(escape_html(&format!("https://doi.org/{}", doi)));
    } else if let Some(url) = item.text("URL") {
        parts.push(escape_html(&url));
    }

    Ok(join_sentences(&parts, ". "))
}

fn long_names(names: &[Name], locale: &Locale, et_al: Option<EtAl>) -> String {
    let mut formatted: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, n)| if i == 0 { n.inverted() } else { n.display() })
        .collect();

    if let Some(e) = et_al.filter(|e| formatted.len() >= e.min) {
        formatted.truncate(e.use_first);
        return format!(
            "{}, {}",
            formatted.join(", "),
            locale.term("et-al", TermForm::Long, false)
        );
    }
    let inverted_first = names.first().is_some_and(|n| n.given.is_some());
    join_names(&formatted, &locale.term("and", TermForm::Long, false), inverted_first)
}

/// Join with `delimiter`, dropping its leading period after a part that
/// already ends in one
pub(crate) fn join_sentences(parts: &[String], delimiter: &str) -> String {
    let mut out = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if !out.is_empty() {
            out.push_str(trim_repeated_period(&out, delimiter));
        }
        out.push_str(part);
    }
    out
}

/// `affix` with its leading period removed when `text` already ends in one
pub(crate) fn trim_repeated_period<'a>(text: &str, affix: &'a str) -> &'a str {
    if text.ends_with('.') && affix.starts_with('.') {
        &affix[1..]
    } else {
        affix
    }
}

/// Sort key for a bibliography entry: first contributor (or title), year, title
pub(crate) fn sort_key(item: &CslItem) -> Result<(String, i64, String)> {
    let title = item.title().unwrap_or_default().to_lowercase();
    let lead = match contributors(item)? {
        Some(names) => names[0].sort_key(),
        None => title.clone(),
    };
    let year = item
        .date("issued")?
        .and_then(|d| d.year())
        .unwrap_or(i64::MAX);
    Ok((lead, year, title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: serde_json::Value) -> CslItem {
        CslItem::from_value(value).unwrap()
    }

    #[test]
    fn test_short_author_lists() {
        let locale = Locale::en_us();
        let et_al = Some(EtAl { min: 4, use_first: 1 });
        let names = |n: usize| {
            let authors: Vec<_> = (0..n)
                .map(|i| json!({ "family": format!("N{}", i), "given": "X" }))
                .collect();
            item(json!({ "id": "x", "author": authors }))
        };

        assert_eq!(short_author(&names(1), &locale, et_al).unwrap(), "N0");
        assert_eq!(short_author(&names(2), &locale, et_al).unwrap(), "N0 and N1");
        assert_eq!(short_author(&names(3), &locale, et_al).unwrap(), "N0, N1, and N2");
        assert_eq!(short_author(&names(4), &locale, et_al).unwrap(), "N0 et al.");
    }

    #[test]
    fn test_cite_with_locator_and_affixes() {
        let locale = Locale::en_us();
        let smith = item(json!({
            "id": "smith2020",
            "author": [{ "family": "Smith", "given": "John" }],
            "issued": { "date-parts": [[2020]] }
        }));

        let plain = CitationItem::new("smith2020");
        assert_eq!(cite(&smith, &plain, &locale, None, None).unwrap(), "Smith 2020");

        let page = CitationItem::new("smith2020").with_locator("page", "12");
        assert_eq!(cite(&smith, &page, &locale, None, Some("b")).unwrap(), "Smith 2020b, 12");

        let chapter = CitationItem {
            prefix: Some("see".into()),
            suffix: Some("for details".into()),
            suppress_author: true,
            ..CitationItem::new("smith2020").with_locator("chapter", "3")
        };
        assert_eq!(
            cite(&smith, &chapter, &locale, None, None).unwrap(),
            "see 2020, chap. 3 for details"
        );

        let author_only = CitationItem {
            author_only: true,
            ..CitationItem::new("smith2020")
        };
        assert_eq!(cite(&smith, &author_only, &locale, None, None).unwrap(), "Smith");
    }

    #[test]
    fn test_undated_item_without_author() {
        let locale = Locale::en_us();
        let anon = item(json!({ "id": "anon", "title": "Anonymous Pamphlet" }));
        assert_eq!(
            cite(&anon, &CitationItem::new("anon"), &locale, None, None).unwrap(),
            "Anonymous Pamphlet n.d."
        );
    }

    #[test]
    fn test_bibliography_entry() {
        let locale = Locale::en_us();
        let article = item(json!({
            "id": "smith2020",
            "type": "article-journal",
            "title": "A Title",
            "container-title": "Journal of Tests",
            "volume": "3",
            "issue": "2",
            "page": "10–20",
            "DOI": "10.1000/xyz",
            "author": [
                { "family": "Smith", "given": "John" },
                { "family": "Doe", "given": "Jane" }
            ],
            "issued": { "date-parts": [[2020]] }
        }));
        assert_eq!(
            bibliography_entry(&article, &locale, None, None).unwrap(),
            "Smith, John, and Jane Doe. 2020. \u{201C}A Title\u{201D}. \
             <i>Journal of Tests</i> 3 (2): 10–20. https://doi.org/10.1000/xyz"
        );

        let book = item(json!({
            "id": "b",
            "type": "book",
            "title": "Books & Things",
            "publisher": "Press",
            "publisher-place": "Berlin"
        }));
        assert_eq!(
            bibliography_entry(&book, &locale, None, None).unwrap(),
            "<i>Books &amp; Things</i>. n.d. Berlin: Press"
        );
    }

    #[test]
    fn test_malformed_names_fail_rendering() {
        let locale = Locale::en_us();
        let broken = item(json!({ "id": "broken", "author": "Smith" }));
        assert!(cite(&broken, &CitationItem::new("broken"), &locale, None, None).is_err());
        assert!(bibliography_entry(&broken, &locale, None, None).is_err());
    }

    #[test]
    fn test_join_sentences_avoids_double_periods() {
        let parts = vec!["Smith, J.".to_string(), "2020".to_string()];
        assert_eq!(join_sentences(&parts, ". "), "Smith, J. 2020");
    }
}
