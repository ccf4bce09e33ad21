//! Cite key grammar
//!
//! The key alphabet of the citation micro-syntax: a letter, ASCII digit or
//! underscore, followed by those and `_:.#$%&-+?<>~/`. A key never ends in
//! punctuation, since the citation parser strips trailing punctuation from
//! bare keys (`@smith2020.` cites `smith2020`).

/// Whether `key` can be cited as a bare `@key`
pub fn is_valid_cite_key(key: &str) -> bool {
    let mut chars = key.chars();
    let (Some(first), Some(last)) = (chars.next(), key.chars().next_back()) else {
        return false;
    };
    is_key_start(first) && is_key_start(last) && chars.all(is_key_char)
}

/// Characters allowed after the first one
pub(crate) fn is_key_char(c: char) -> bool {
    is_key_start(c) || ":.#$%&-+?<>~/".contains(c)
}

/// Characters a key may start and end with
pub(crate) fn is_key_start(c: char) -> bool {
    c.is_alphabetic() || c.is_ascii_digit() || c == '_'
}
