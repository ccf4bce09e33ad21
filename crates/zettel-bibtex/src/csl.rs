//! Conversion of BibTeX entries to CSL-JSON items

use serde_json::{json, Map, Value};

use crate::entry::BibTeXEntry;
use crate::latex::decode_latex;

/// Fields copied verbatim (after LaTeX decoding) as `(bibtex, csl)` pairs.
/// The first BibTeX field present wins for a given CSL variable.
const FIELD_MAP: &[(&str, &str)] = &[
    ("title", "title"),
    ("shorttitle", "title-short"),
    ("journal", "container-title"),
    ("journaltitle", "container-title"),
    ("booktitle", "container-title"),
    ("series", "collection-title"),
    ("publisher", "publisher"),
    ("institution", "publisher"),
    ("school", "publisher"),
    ("organization", "publisher"),
    ("address", "publisher-place"),
    ("location", "publisher-place"),
    ("volume", "volume"),
    ("number", "issue"),
    ("issue", "issue"),
    ("edition", "edition"),
    ("chapter", "chapter-number"),
    ("note", "note"),
    ("abstract", "abstract"),
    ("keywords", "keyword"),
    ("language", "language"),
    ("langid", "language"),
];

/// Identifiers that must not go through the LaTeX decoder
const VERBATIM_MAP: &[(&str, &str)] = &[
    ("doi", "DOI"),
    ("url", "URL"),
    ("isbn", "ISBN"),
    ("issn", "ISSN"),
    ("eprint", "number"),
];

/// Convert every entry, preserving file order
pub fn entries_to_csl(entries: &[BibTeXEntry]) -> Vec<Value> {
    entries.iter().map(entry_to_csl).collect()
}

/// Convert one entry to a CSL-JSON object
pub fn entry_to_csl(entry: &BibTeXEntry) -> Value {
    let mut item = Map::new();
    item.insert("id".into(), Value::String(entry.cite_key.clone()));
    item.insert("type".into(), Value::String(entry.entry_type.csl_type().into()));

    for (bib, csl) in FIELD_MAP {
        if item.contains_key(*csl) {
            continue;
        }
        if let Some(value) = non_empty(entry.get_field(bib)) {
            item.insert((*csl).into(), Value::String(decode_latex(value)));
        }
    }

    for (bib, csl) in VERBATIM_MAP {
        if item.contains_key(*csl) {
            continue;
        }
        if let Some(value) = non_empty(entry.get_field(bib)) {
            item.insert((*csl).into(), Value::String(value.trim().to_string()));
        }
    }

    if let Some(pages) = non_empty(entry.get_field("pages")) {
        item.insert("page".into(), Value::String(decode_latex(pages)));
    }

    for role in ["author", "editor", "translator"] {
        if let Some(names) = non_empty(entry.get_field(role)) {
            item.insert(role.into(), Value::Array(parse_names(names)));
        }
    }

    if let Some(issued) = issued_date(entry) {
        item.insert("issued".into(), issued);
    }

    if let Some(urldate) = non_empty(entry.get_field("urldate")).and_then(parse_iso_date) {
        item.insert("accessed".into(), urldate);
    }

    Value::Object(item)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Split a BibTeX name list (`A and B and {C Corp}`) into CSL name objects
pub fn parse_names(field: &str) -> Vec<Value> {
    split_top_level(field, " and ")
        .into_iter()
        .filter(|name| !name.trim().is_empty())
        .map(|name| parse_name(name.trim()))
        .collect()
}

fn parse_name(raw: &str) -> Value {
    if raw.starts_with('{') && raw.ends_with('}') && split_top_level(raw, " ").len() == 1 {
        return json!({ "literal": decode_latex(&raw[1..raw.len() - 1]) });
    }

    let parts: Vec<String> = split_top_level(raw, ",")
        .into_iter()
        .map(|p| p.trim().to_string())
        .collect();

    let (family_part, given, suffix) = match parts.len() {
        1 => {
            let words = split_top_level(&parts[0], " ");
            if words.len() == 1 {
                (words[0].clone(), String::new(), None)
            } else {
                // "First von Last": the particle starts at the first lowercase word
                let last = words.len() - 1;
                let particle_start = words[..last]
                    .iter()
                    .position(|w| starts_lowercase(w))
                    .unwrap_or(last);
                (
                    words[particle_start..].join(" "),
                    words[..particle_start].join(" "),
                    None,
                )
            }
        }
        2 => (parts[0].clone(), parts[1].clone(), None),
        _ => (parts[0].clone(), parts[2..].join(", "), Some(parts[1].clone())),
    };

    let mut name = Map::new();
    let family_words = split_top_level(&family_part, " ");
    let particle_len = family_words
        .iter()
        .take(family_words.len().saturating_sub(1))
        .take_while(|w| starts_lowercase(w))
        .count();
    if particle_len > 0 {
        name.insert(
            "non-dropping-particle".into(),
            Value::String(decode_latex(&family_words[..particle_len].join(" "))),
        );
    }
    name.insert(
        "family".into(),
        Value::String(decode_latex(&family_words[particle_len..].join(" "))),
    );
    if !given.is_empty() {
        name.insert("given".into(), Value::String(decode_latex(&given)));
    }
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        name.insert("suffix".into(), Value::String(decode_latex(&suffix)));
    }
    Value::Object(name)
}

fn starts_lowercase(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_lowercase)
}

/// Split on `sep` outside of braces; `sep` is matched case-insensitively
fn split_top_level(input: &str, sep: &str) -> Vec<String> {
    let lower = input.to_lowercase();
    let sep_lower = sep.to_lowercase();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    // `to_lowercase` can change byte lengths for some scripts; fall back to
    // a case-sensitive scan then.
    let haystack = if lower.len() == input.len() { lower.as_str() } else { input };

    while i < input.len() {
        let c = input.as_bytes()[i];
        match c {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0
            && haystack.is_char_boundary(i)
            && haystack[i..].starts_with(sep_lower.as_str())
        {
            parts.push(input[start..i].to_string());
            i += sep.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(input[start..].to_string());
    parts.into_iter().filter(|p| !p.is_empty() || sep != " ").collect()
}

fn issued_date(entry: &BibTeXEntry) -> Option<Value> {
    if let Some(date) = non_empty(entry.get_field("date")).and_then(parse_iso_date) {
        return Some(date);
    }

    let year = non_empty(entry.get_field("year"))?;
    let year = decode_latex(year);
    let Ok(year_num) = year.trim().parse::<i64>() else {
        return Some(json!({ "literal": year }));
    };

    let mut parts = vec![year_num];
    if let Some(month) = non_empty(entry.get_field("month")).and_then(parse_month) {
        parts.push(month);
        if let Some(day) = non_empty(entry.get_field("day")).and_then(|d| d.parse().ok()) {
            parts.push(day);
        }
    }
    Some(json!({ "date-parts": [parts] }))
}

/// `2020`, `2020-05`, `2020-05-17`, or a `/`-separated range of those
fn parse_iso_date(value: &str) -> Option<Value> {
    let mut ranges = Vec::new();
    for part in value.split('/') {
        let numbers: Option<Vec<i64>> = part
            .trim()
            .split('-')
            .take(3)
            .map(|n| n.trim().parse().ok())
            .collect();
        ranges.push(numbers.filter(|n| !n.is_empty())?);
    }
    Some(json!({ "date-parts": ranges }))
}

fn parse_month(value: &str) -> Option<i64> {
    if let Ok(n) = value.parse::<i64>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = value.to_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as i64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn convert(input: &str) -> Value {
        let result = parse(input).unwrap();
        entry_to_csl(&result.entries[0])
    }

    #[test]
    fn test_article_conversion() {
        let item = convert(
            r#"@article{smith2020,
                author = {Smith, John and Jane Doe},
                title = {A {T}itle with M\"uller},
                journal = {Journal of Tests},
                year = 2020, month = may,
                pages = {10--20},
                doi = {10.1000/xyz_123}
            }"#,
        );

        assert_eq!(item["id"], "smith2020");
        assert_eq!(item["type"], "article-journal");
        assert_eq!(item["title"], "A Title with Müller");
        assert_eq!(item["container-title"], "Journal of Tests");
        assert_eq!(item["page"], "10–20");
        assert_eq!(item["DOI"], "10.1000/xyz_123");
        assert_eq!(item["issued"], json!({ "date-parts": [[2020, 5]] }));
        assert_eq!(
            item["author"],
            json!([
                { "family": "Smith", "given": "John" },
                { "family": "Doe", "given": "Jane" }
            ])
        );
    }

    #[test]
    fn test_name_forms() {
        assert_eq!(
            parse_names("{World Health Organization}"),
            vec![json!({ "literal": "World Health Organization" })]
        );
        assert_eq!(
            parse_names("Ludwig van Beethoven"),
            vec![json!({ "non-dropping-particle": "van", "family": "Beethoven", "given": "Ludwig" })]
        );
        assert_eq!(
            parse_names("van Gogh, Vincent"),
            vec![json!({ "non-dropping-particle": "van", "family": "Gogh", "given": "Vincent" })]
        );
        assert_eq!(
            parse_names("King, Jr, Martin Luther"),
            vec![json!({ "family": "King", "given": "Martin Luther", "suffix": "Jr" })]
        );
        assert_eq!(
            parse_names("Barnes {and} Noble AND Plato"),
            vec![
                json!({ "family": "Noble", "given": "Barnes and" }),
                json!({ "family": "Plato" })
            ]
        );
    }

    #[test]
    fn test_biblatex_date_and_literal_year() {
        let item = convert("@online{web, date = {2019-03-04}, urldate = {2021-01-02}}");
        assert_eq!(item["type"], "webpage");
        assert_eq!(item["issued"], json!({ "date-parts": [[2019, 3, 4]] }));
        assert_eq!(item["accessed"], json!({ "date-parts": [[2021, 1, 2]] }));

        let item = convert("@book{old, year = {forthcoming}}");
        assert_eq!(item["issued"], json!({ "literal": "forthcoming" }));
    }

    #[test]
    fn test_first_mapped_field_wins() {
        let item = convert("@inproceedings{c, booktitle = {Proc. A}, journal = {J. B}}");
        assert_eq!(item["container-title"], "J. B");
        assert_eq!(item["type"], "paper-conference");
    }
}
