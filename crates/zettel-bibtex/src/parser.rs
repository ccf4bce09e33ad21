//! BibTeX parser implementation using nom
//!
//! Handles `@string` definitions, `@preamble` and `@comment` blocks, braced
//! and quoted field values, `#` concatenation and nested braces. Broken
//! entries are recorded as errors and skipped so one bad record does not
//! take the whole library down.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
    IResult,
};
use std::collections::HashMap;

use crate::entry::{BibTeXEntry, BibTeXEntryType};

/// A recoverable problem found while scanning the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXParseError {
    pub line: u32,
    pub message: String,
}

/// Result of parsing a BibTeX library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXParseResult {
    pub entries: Vec<BibTeXEntry>,
    pub preambles: Vec<String>,
    pub strings: HashMap<String, String>,
    pub errors: Vec<BibTeXParseError>,
}

/// Error type for inputs that are not a BibTeX library at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Input is empty")]
    Empty,
    #[error("No BibTeX entries found ({skipped} malformed entries skipped)")]
    NoEntries { skipped: usize },
}

/// Parse a BibTeX library.
///
/// Fails only when the input yields no entries at all; malformed entries in
/// an otherwise valid file end up in [`BibTeXParseResult::errors`].
pub fn parse(input: &str) -> Result<BibTeXParseResult, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let result = parse_bibtex(input);
    if result.entries.is_empty() {
        return Err(ParseError::NoEntries {
            skipped: result.errors.len(),
        });
    }
    Ok(result)
}

fn parse_bibtex(input: &str) -> BibTeXParseResult {
    let mut result = BibTeXParseResult {
        entries: Vec::new(),
        preambles: Vec::new(),
        strings: HashMap::new(),
        errors: Vec::new(),
    };

    let mut remaining = input;
    let mut lines = LineCounter::default();

    while !remaining.is_empty() {
        remaining = skip_whitespace_and_comments(remaining);
        if remaining.is_empty() {
            break;
        }

        let line = lines.line_at(input, remaining);

        if !remaining.starts_with('@') {
            // Free text between entries is a comment in BibTeX
            match remaining.find('@') {
                Some(pos) => {
                    remaining = &remaining[pos..];
                    continue;
                }
                None => break,
            }
        }

        match parse_at_entry(remaining, &result.strings) {
            Ok((rest, AtEntry::Entry(mut entry))) => {
                entry.line = line;
                result.entries.push(entry);
                remaining = rest;
            }
            Ok((rest, AtEntry::String(key, value))) => {
                result.strings.insert(key.to_lowercase(), value);
                remaining = rest;
            }
            Ok((rest, AtEntry::Preamble(text))) => {
                result.preambles.push(text);
                remaining = rest;
            }
            Ok((rest, AtEntry::Comment)) => remaining = rest,
            Err(_) => {
                result.errors.push(BibTeXParseError {
                    line,
                    message: "Failed to parse entry".to_string(),
                });
                match remaining[1..].find('@') {
                    Some(pos) => remaining = &remaining[pos + 1..],
                    None => break,
                }
            }
        }
    }

    result
}

/// Line numbers for positions that only move forward through the input
#[derive(Default)]
struct LineCounter {
    offset: usize,
    newlines: u32,
}

impl LineCounter {
    /// 1-based line number of `rest` within `input`; counts only the text
    /// since the previous call
    fn line_at(&mut self, input: &str, rest: &str) -> u32 {
        let offset = input.len() - rest.len();
        if offset > self.offset {
            self.newlines += input.as_bytes()[self.offset..offset]
                .iter()
                .filter(|&&b| b == b'\n')
                .count() as u32;
            self.offset = offset;
        }
        self.newlines + 1
    }
}

enum AtEntry {
    Entry(BibTeXEntry),
    String(String, String),
    Preamble(String),
    Comment,
}

fn skip_whitespace_and_comments(input: &str) -> &str {
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
        } else if bytes[pos] == b'%' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
        } else {
            break;
        }
    }

    &input[pos..]
}

fn parse_at_entry<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, AtEntry> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, entry_type) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;

    match entry_type.to_lowercase().as_str() {
        "string" => {
            let (rest, (key, value)) = parse_string_definition(rest, strings)?;
            Ok((rest, AtEntry::String(key, value)))
        }
        "preamble" => {
            let (rest, text) = parse_preamble(rest, strings)?;
            Ok((rest, AtEntry::Preamble(text)))
        }
        "comment" => {
            let (rest, _) = parse_comment_body(rest)?;
            Ok((rest, AtEntry::Comment))
        }
        _ => {
            let (rest, entry) = parse_entry_body(rest, entry_type, strings)?;
            Ok((rest, AtEntry::Entry(entry)))
        }
    }
}

/// `@string{key = value}` or `@string(key = value)`
fn parse_string_definition<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, open) = alt((char('{'), char('(')))(rest)?;
    let (rest, (key, value)) = parse_single_field(rest, strings)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(closing_delimiter(open))(rest)?;

    Ok((rest, (key, value)))
}

fn parse_preamble<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, String> {
    let (rest, _) = multispace0(input)?;
    let (rest, open) = alt((char('{'), char('(')))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = parse_field_value(rest, strings)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(closing_delimiter(open))(rest)?;

    Ok((rest, value))
}

fn parse_comment_body(input: &str) -> IResult<&str, ()> {
    let (rest, _) = multispace0(input)?;
    if rest.starts_with('{') {
        let (rest, _) = parse_braced_content(rest)?;
        Ok((rest, ()))
    } else {
        let pos = rest.find('\n').unwrap_or(rest.len());
        Ok((&rest[pos..], ()))
    }
}

fn closing_delimiter(open: char) -> char {
    if open == '(' {
        ')'
    } else {
        '}'
    }
}

fn parse_entry_body<'a>(
    input: &'a str,
    entry_type: &str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, BibTeXEntry> {
    let (rest, _) = multispace0(input)?;
    let (rest, open) = alt((char('{'), char('(')))(rest)?;
    let (rest, _) = multispace0(rest)?;

    // Keys are validated against the citation grammar later; accept anything
    // up to the separating comma here.
    let (rest, cite_key) = take_while1(|c: char| c != ',' && c != '}' && !c.is_whitespace())(rest)?;
    let (rest, _) = multispace0(rest)?;

    let (rest, fields) = match char::<&str, nom::error::Error<&str>>(',')(rest) {
        Ok((rest, _)) => parse_fields(rest, strings)?,
        // An entry with only a key: `@misc{key}`
        Err(_) => (rest, Vec::new()),
    };

    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(closing_delimiter(open))(rest)?;

    let mut entry = BibTeXEntry::new(cite_key.to_string(), BibTeXEntryType::from_str(entry_type));
    for (key, value) in fields {
        entry.add_field(key, value);
    }

    Ok((rest, entry))
}

fn parse_fields<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        if rest.starts_with('}') || rest.starts_with(')') {
            return Ok((rest, fields));
        }

        match parse_single_field(rest, strings) {
            Ok((rest, field)) => {
                fields.push(field);
                let (rest, _) = multispace0(rest)?;
                remaining = rest.strip_prefix(',').unwrap_or(rest);
            }
            Err(_) => return Ok((remaining, fields)),
        }
    }
}

fn parse_single_field<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, _) = multispace0(input)?;
    let (rest, key) = take_while1(|c: char| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':'
    })(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = parse_field_value(rest, strings)?;

    Ok((rest, (key.to_string(), value)))
}

/// Braced, quoted, numeric or macro values joined with `#`
fn parse_field_value<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, String> {
    let mut result = String::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;

        let (rest, part) = alt((
            parse_braced_value,
            parse_quoted_value,
            map(take_while1(|c: char| c.is_ascii_digit()), |s: &str| {
                s.to_string()
            }),
            map(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
                |s: &str| {
                    strings
                        .get(&s.to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| s.to_string())
                },
            ),
        ))(rest)?;

        result.push_str(&part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(stripped) => remaining = stripped,
            None => return Ok((rest, result)),
        }
    }
}

fn parse_braced_value(input: &str) -> IResult<&str, String> {
    let (rest, content) = parse_braced_content(input)?;
    Ok((rest, content[1..content.len() - 1].to_string()))
}

/// Braced content including nested braces, returned with the outer braces
fn parse_braced_content(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(nom_error(input));
    }

    let bytes = input.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[..pos + 1]));
                }
            }
            b'\\' => pos += 1,
            _ => {}
        }
        pos += 1;
    }

    Err(nom_error(input))
}

fn parse_quoted_value(input: &str) -> IResult<&str, String> {
    if !input.starts_with('"') {
        return Err(nom_error(input));
    }

    let mut depth = 0usize;
    let mut escaped = false;

    for (pos, c) in input.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Ok((&input[pos + 1..], input[1..pos].to_string())),
            _ => {}
        }
    }

    Err(nom_error(input))
}

fn nom_error(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_counter_is_incremental() {
        let input = "a\nb\n\nc";
        let mut lines = LineCounter::default();
        assert_eq!(lines.line_at(input, input), 1);
        assert_eq!(lines.line_at(input, &input[2..]), 2);
        assert_eq!(lines.line_at(input, &input[5..]), 4);
        assert_eq!(lines.line_at(input, &input[5..]), 4);
    }

    #[test]
    fn test_large_library_parses_in_linear_time() {
        let count = 10_000;
        let input: String = (0..count)
            .map(|i| format!("@article{{key{i},\n  title = {{Title {i}}},\n  year = {{2020}}\n}}\n\n"))
            .collect();

        let started = std::time::Instant::now();
        let result = parse(&input).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.entries.len(), count);
        assert_eq!(result.entries[count - 1].line, (count as u32 - 1) * 5 + 1);
        assert!(
            elapsed < std::time::Duration::from_secs(15),
            "parsing {} entries took {:?}",
            count,
            elapsed
        );
    }

    #[test]
    fn test_parse_simple_entry() {
        let input = r#"
@article{Smith2024,
    author = {John Smith},
    title = {A Great Paper},
    year = {2024},
    journal = {Nature},
}
"#;
        let result = parse(input).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert!(result.errors.is_empty());

        let entry = &result.entries[0];
        assert_eq!(entry.cite_key, "Smith2024");
        assert_eq!(entry.entry_type, BibTeXEntryType::Article);
        assert_eq!(entry.line, 2);
        assert_eq!(entry.author(), Some("John Smith"));
        assert_eq!(entry.year(), Some("2024"));
    }

    #[test]
    fn test_parse_empty_input_fails() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("  \n\t"), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_text_without_entries_fails() {
        assert_eq!(
            parse("just some notes"),
            Err(ParseError::NoEntries { skipped: 0 })
        );
        assert_eq!(
            parse("@article{broken, title = {never closed"),
            Err(ParseError::NoEntries { skipped: 1 })
        );
    }

    #[test]
    fn test_parse_quoted_values_with_escaped_quotes() {
        let input = r#"@article{Test2024, title = "Testing \"Quotes\"", author = "Jane Doe"}"#;
        let result = parse(input).unwrap();
        assert_eq!(result.entries[0].title(), Some(r#"Testing \"Quotes\""#));
        assert_eq!(result.entries[0].author(), Some("Jane Doe"));
    }

    #[test]
    fn test_parse_nested_braces() {
        let result = parse("@book{Test2024, title = {A {B}ook about {LaTeX}}}").unwrap();
        assert_eq!(result.entries[0].title(), Some("A {B}ook about {LaTeX}"));
    }

    #[test]
    fn test_string_macros_and_concatenation() {
        let input = r#"
@string{NAT = "Nature"}
@article{Test2024, journal = nat # { Physics}}
"#;
        let result = parse(input).unwrap();
        assert_eq!(result.strings.get("nat"), Some(&"Nature".to_string()));
        assert_eq!(
            result.entries[0].get_field("journal"),
            Some("Nature Physics")
        );
    }

    #[test]
    fn test_parenthesised_entry_and_comment() {
        let input = r#"
@comment{ignored @article{not, an = {entry}}}
@misc(Paren2020, title = {Round})
"#;
        let result = parse(input).unwrap();
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].cite_key, "Paren2020");
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let input = r#"
@article{Good1, title = {One}}
@article{Bad, title = {unterminated
@book{Good2, title = {Two}}
"#;
        let result = parse(input).unwrap();
        let keys: Vec<_> = result.entries.iter().map(|e| e.cite_key.as_str()).collect();
        assert_eq!(keys, vec!["Good1", "Good2"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 3);
    }
}
