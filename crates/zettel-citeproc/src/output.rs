//! HTML output helpers

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref LINKABLE: Regex =
        Regex::new(r#"(https?://[^\s<>"]+)|\b(10\.\d{4,9}/[^\s<>"]+)"#).unwrap();
}

/// Escape text for inclusion in HTML
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap bare URLs and DOIs in already-escaped HTML in anchors
pub fn wrap_links(html: &str) -> String {
    LINKABLE
        .replace_all(html, |caps: &Captures<'_>| {
            let matched = &caps[0];
            // Sentence punctuation directly after a link is not part of it
            let link = matched.trim_end_matches(['.', ',', ';', ':', ')']);
            let rest = &matched[link.len()..];
            let href = if caps.get(1).is_some() {
                link.to_string()
            } else {
                format!("https://doi.org/{}", link)
            };
            format!("<a href=\"{}\">{}</a>{}", href, link, rest)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape_html("Tom & \"Jerry\" <3"), "Tom &amp; &quot;Jerry&quot; &lt;3");
    }

    #[test]
    fn test_wrap_urls_and_dois() {
        assert_eq!(
            wrap_links("See https://example.org/a?b=1&amp;c=2."),
            "See <a href=\"https://example.org/a?b=1&amp;c=2\">https://example.org/a?b=1&amp;c=2</a>."
        );
        assert_eq!(
            wrap_links("doi 10.1000/xyz_123, p. 4"),
            "doi <a href=\"https://doi.org/10.1000/xyz_123\">10.1000/xyz_123</a>, p. 4"
        );
        assert_eq!(
            wrap_links("https://doi.org/10.1000/abc"),
            "<a href=\"https://doi.org/10.1000/abc\">https://doi.org/10.1000/abc</a>"
        );
        assert_eq!(wrap_links("no links here"), "no links here");
    }
}
