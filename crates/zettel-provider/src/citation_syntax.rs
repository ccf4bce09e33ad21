//! Parser for the editor's citation micro-syntax
//!
//! Supported forms:
//! - bracketed clusters: `[see @smith2020, p. 12; -@doe2019]`
//! - in-text citations: `@smith2020`, optionally with a locator in
//!   brackets, `@smith2020 [p. 12]`
//!
//! A `-` directly before `@` suppresses the author. A locator follows the
//! key after a comma and may start with a label (`p.`, `chap.`, `§`, ...);
//! a bare number is a page. Anything after the locator is the suffix.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag_no_case, take_until, take_while, take_while1},
    character::complete::{alphanumeric0, char, digit1, one_of, satisfy, space0},
    combinator::{not, opt, peek, recognize},
    error::{Error, ErrorKind},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use zettel_citeproc::CitationItem;

use crate::cite_key::{is_key_char, is_key_start};
use crate::error::CitationSyntaxError;

/// Locator labels as typed, mapped to CSL locator types; longer spellings
/// come first so prefixes do not shadow them
const LOCATOR_TERMS: &[(&str, &str)] = &[
    ("pages", "page"),
    ("page", "page"),
    ("pp.", "page"),
    ("pp", "page"),
    ("p.", "page"),
    ("p", "page"),
    ("chapters", "chapter"),
    ("chapter", "chapter"),
    ("chaps.", "chapter"),
    ("chap.", "chapter"),
    ("ch.", "chapter"),
    ("sections", "section"),
    ("section", "section"),
    ("secs.", "section"),
    ("sec.", "section"),
    ("§§", "section"),
    ("§", "section"),
    ("volumes", "volume"),
    ("volume", "volume"),
    ("vols.", "volume"),
    ("vol.", "volume"),
    ("figures", "figure"),
    ("figure", "figure"),
    ("figs.", "figure"),
    ("fig.", "figure"),
    ("numbers", "issue"),
    ("number", "issue"),
    ("nos.", "issue"),
    ("no.", "issue"),
    ("paragraphs", "paragraph"),
    ("paragraph", "paragraph"),
    ("paras.", "paragraph"),
    ("para.", "paragraph"),
    ("¶", "paragraph"),
    ("lines", "line"),
    ("line", "line"),
    ("ll.", "line"),
    ("l.", "line"),
    ("notes", "note"),
    ("note", "note"),
    ("nn.", "note"),
    ("n.", "note"),
];

const ROMAN: &str = "ivxlcdmIVXLCDM";

/// A parsed citation: the items of one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCitation {
    pub items: Vec<CitationItem>,
    /// Written as `@key` in running text rather than in brackets
    pub in_text: bool,
}

pub fn parse_citation(input: &str) -> Result<ParsedCitation, CitationSyntaxError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(CitationSyntaxError::Empty);
    }

    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let items = inner
            .split(';')
            .filter(|segment| !segment.trim().is_empty())
            .map(bracketed_item)
            .collect::<Result<Vec<_>, _>>()?;
        if items.is_empty() {
            return Err(CitationSyntaxError::Empty);
        }
        return Ok(ParsedCitation {
            items,
            in_text: false,
        });
    }

    if text.starts_with('@') {
        return in_text_item(text).map(|item| ParsedCitation {
            items: vec![item],
            in_text: true,
        });
    }

    Err(CitationSyntaxError::NotACitation(text.to_string()))
}

/// `prefix -@key, locator suffix`
fn bracketed_item(segment: &str) -> Result<CitationItem, CitationSyntaxError> {
    let missing_key = || CitationSyntaxError::MissingKey(segment.trim().to_string());

    let (rest, prefix) =
        take_until::<_, _, Error<&str>>("@")(segment).map_err(|_| missing_key())?;
    let (rest, id) = cite_key(rest).map_err(|_| missing_key())?;

    let prefix = prefix.trim();
    let (prefix, suppress_author) = match prefix.strip_suffix('-') {
        Some(p) => (p.trim_end(), true),
        None => (prefix, false),
    };

    let mut item = CitationItem::new(id);
    item.prefix = non_empty(prefix);
    item.suppress_author = suppress_author;

    match rest.trim_start().strip_prefix(',') {
        Some(after_comma) => apply_locator_and_suffix(&mut item, after_comma, true),
        None => item.suffix = non_empty(rest),
    }
    Ok(item)
}

/// `@key` or `@key [locator suffix]`
fn in_text_item(text: &str) -> Result<CitationItem, CitationSyntaxError> {
    let (rest, id) =
        cite_key(text).map_err(|_| CitationSyntaxError::MissingKey(text.to_string()))?;
    let mut item = CitationItem::new(id);

    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(item);
    }
    let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
        return Err(CitationSyntaxError::TrailingText(rest.to_string()));
    };
    let inner = inner.trim_start();
    match inner.strip_prefix(',') {
        Some(after_comma) => apply_locator_and_suffix(&mut item, after_comma, true),
        None => apply_locator_and_suffix(&mut item, inner, false),
    }
    Ok(item)
}

fn apply_locator_and_suffix(item: &mut CitationItem, text: &str, after_comma: bool) {
    let text = text.trim_start();
    match locator(text) {
        Ok((rest, (label, value))) => {
            item.label = Some(label.to_string());
            item.locator = Some(value.trim().to_string());
            item.suffix = non_empty(rest);
        }
        // Not a locator: the comma stays with the suffix
        Err(_) if after_comma => item.suffix = non_empty(text).map(|s| format!(", {}", s)),
        Err(_) => item.suffix = non_empty(text),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// `@key` or `@{key with anything}`, dropping trailing punctuation from
/// bare keys (`@smith2020.` cites `smith2020`)
fn cite_key(input: &str) -> IResult<&str, String> {
    let (input, _) = char('@')(input)?;
    let braced: IResult<&str, &str> = delimited(char('{'), is_not("}"), char('}'))(input);
    if let Ok((rest, key)) = braced {
        return Ok((rest, key.trim().to_string()));
    }

    let (_, raw) = recognize(pair(satisfy(is_key_start), take_while(is_key_char)))(input)?;
    let key = raw.trim_end_matches(|c: char| !is_key_start(c));
    Ok((&input[key.len()..], key.to_string()))
}

/// Optional label, then one or more locator values
fn locator(input: &str) -> IResult<&str, (&'static str, &str)> {
    let (input, label) = opt(terminated(locator_label, space0))(input)?;
    if label.is_none() {
        // Without a label only numbers count as locators
        peek(satisfy(|c| c.is_ascii_digit()))(input)?;
    }
    let (input, value) =
        recognize(separated_list1(pair(one_of(",&"), space0), locator_token))(input)?;
    Ok((input, (label.unwrap_or("page"), value)))
}

fn locator_label(input: &str) -> IResult<&str, &'static str> {
    for (term, label) in LOCATOR_TERMS {
        let attempt: IResult<&str, &str> = terminated(
            tag_no_case(*term),
            peek(satisfy(|c| c.is_whitespace() || c.is_ascii_digit() || ROMAN.contains(c))),
        )(input);
        if let Ok((rest, _)) = attempt {
            return Ok((rest, *label));
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)))
}

/// `12`, `12a`, `iv`, `12-14`, `xii–xv`
fn locator_token(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        locator_atom,
        opt(preceded(one_of("-–—"), locator_atom)),
    ))(input)
}

fn locator_atom(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(digit1, alphanumeric0)),
        recognize(terminated(
            take_while1(|c: char| ROMAN.contains(c)),
            not(satisfy(char::is_alphanumeric)),
        )),
    ))(input)
}
