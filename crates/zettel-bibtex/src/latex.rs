//! LaTeX character decoding
//!
//! Turns the LaTeX escapes commonly found in `.bib` files into Unicode so the
//! converted CSL items render cleanly.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// `{\"u}`, `\"{u}`, `\"u`, `\'{\i}` ...
    static ref SYMBOL_ACCENT: Regex = Regex::new(concat!(
        r#"\{\\([\x22'`^~=.])(\\i|\\j|[A-Za-z])\}"#,
        r#"|\\([\x22'`^~=.])\{(\\i|\\j|[A-Za-z])\}"#,
        r#"|\\([\x22'`^~=.])(\\i|\\j|[A-Za-z])"#,
    ))
    .unwrap();

    /// `{\c c}`, `\v{s}`, `\c c`; the bare form needs a space so `\caption`
    /// is left alone
    static ref LETTER_ACCENT: Regex = Regex::new(concat!(
        r"\{\\([cvuHkr])\s+(\\i|\\j|[A-Za-z])\}",
        r"|\\([cvuHkr])\{(\\i|\\j|[A-Za-z])\}",
        r"|\\([cvuHkr])\s+(\\i|\\j|[A-Za-z])",
    ))
    .unwrap();

    /// Formatting commands whose argument is kept
    static ref COMMAND_WITH_ARG: Regex =
        Regex::new(r"\\(?:text[a-z]*|emph|mbox|underline|mathrm|mathit|mathbf|url)\{([^{}]*)\}")
            .unwrap();

    static ref SINGLE_CHAR_BRACES: Regex = Regex::new(r"\{([^{}\\])\}").unwrap();
}

/// Symbols and ligatures, longest patterns first
const SYMBOLS: &[(&str, &str)] = &[
    ("\\textendash", "–"),
    ("\\textemdash", "—"),
    ("\\textellipsis", "…"),
    ("\\ldots", "…"),
    ("\\dots", "…"),
    ("{\\ss}", "ß"),
    ("\\ss", "ß"),
    ("{\\ae}", "æ"),
    ("{\\AE}", "Æ"),
    ("{\\oe}", "œ"),
    ("{\\OE}", "Œ"),
    ("{\\aa}", "å"),
    ("{\\AA}", "Å"),
    ("{\\o}", "ø"),
    ("{\\O}", "Ø"),
    ("{\\l}", "ł"),
    ("{\\L}", "Ł"),
    ("\\ae", "æ"),
    ("\\AE", "Æ"),
    ("\\oe", "œ"),
    ("\\OE", "Œ"),
    ("---", "—"),
    ("--", "–"),
    ("``", "\u{201C}"),
    ("''", "\u{201D}"),
    ("\\&", "&"),
    ("\\%", "%"),
    ("\\$", "$"),
    ("\\#", "#"),
    ("\\_", "_"),
    ("\\S", "§"),
    ("~", "\u{00A0}"),
];

fn combining_mark(accent: &str) -> Option<char> {
    let mark = match accent.trim() {
        "\"" => '\u{0308}',
        "'" => '\u{0301}',
        "`" => '\u{0300}',
        "^" => '\u{0302}',
        "~" => '\u{0303}',
        "=" => '\u{0304}',
        "." => '\u{0307}',
        "c" => '\u{0327}',
        "v" => '\u{030C}',
        "u" => '\u{0306}',
        "H" => '\u{030B}',
        "k" => '\u{0328}',
        "r" => '\u{030A}',
        _ => return None,
    };
    Some(mark)
}

/// Decode LaTeX escapes to Unicode and drop case-protecting braces.
pub fn decode_latex(input: &str) -> String {
    let mut result = replace_accents(&SYMBOL_ACCENT, input);
    result = replace_accents(&LETTER_ACCENT, &result);

    for (pattern, replacement) in SYMBOLS {
        if result.contains(pattern) {
            result = result.replace(pattern, replacement);
        }
    }

    // Innermost commands first so nested formatting unwraps fully
    while COMMAND_WITH_ARG.is_match(&result) {
        result = COMMAND_WITH_ARG.replace_all(&result, "$1").into_owned();
    }
    result = SINGLE_CHAR_BRACES.replace_all(&result, "$1").into_owned();

    strip_braces(&result)
}

/// Each accent regex has three alternatives with an (accent, letter) group
/// pair apiece; exactly one pair participates in a match.
fn replace_accents(pattern: &Regex, input: &str) -> String {
    pattern
        .replace_all(input, |caps: &Captures<'_>| {
            let pair = (1..=5)
                .step_by(2)
                .find_map(|i| Some((caps.get(i)?.as_str(), caps.get(i + 1)?.as_str())));
            let Some((accent, letter)) = pair else {
                return caps[0].to_string();
            };
            let base = match letter {
                "\\i" => "i",
                "\\j" => "j",
                other => other,
            };
            match combining_mark(accent) {
                Some(mark) => format!("{}{}", base, mark).nfc().collect::<String>(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Remove the remaining grouping braces (`{DNA}` → `DNA`)
fn strip_braces(input: &str) -> String {
    input.chars().filter(|c| *c != '{' && *c != '}').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_umlaut_decoding() {
        assert_eq!(decode_latex(r#"M\"uller"#), "Müller");
        assert_eq!(decode_latex(r#"M\"{u}ller"#), "Müller");
        assert_eq!(decode_latex(r#"M{\"u}ller"#), "Müller");
    }

    #[test]
    fn test_other_accents() {
        assert_eq!(decode_latex(r#"caf\'e"#), "café");
        assert_eq!(decode_latex(r#"\`a la carte"#), "à la carte");
        assert_eq!(decode_latex(r#"gar\c con"#), "garçon");
        assert_eq!(decode_latex(r#"\v{S}koda"#), "Škoda");
        assert_eq!(decode_latex(r#"Garc\'{\i}a"#), "García");
    }

    #[test]
    fn test_symbols_and_dashes() {
        assert_eq!(decode_latex(r#"Smith \& Jones"#), "Smith & Jones");
        assert_eq!(decode_latex("pages 1--10"), "pages 1–10");
        assert_eq!(decode_latex(r#"Stra{\ss}e"#), "Straße");
    }

    #[test]
    fn test_commands_and_braces() {
        assert_eq!(decode_latex(r#"\emph{\textbf{bold}} move"#), "bold move");
        assert_eq!(decode_latex("The {DNA} of {B}ooks"), "The DNA of Books");
    }
}
