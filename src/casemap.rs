//! IRC case-mapping functions.
//!
//! Channel and nick identity on IRC is case-insensitive under the
//! `rfc1459` mapping, where some punctuation pairs are equivalent
//! (e.g. `[` and `{`). The channel collection uses these functions for
//! lookup so `#Foo` and `#foo` name the same channel.

/// Map one character to its RFC 1459 lowercase form.
///
/// In addition to ASCII lowercase conversion, this maps:
/// - `[` → `{`
/// - `]` → `}`
/// - `\` → `|`
/// - `~` → `^`
#[inline]
fn lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => c.to_ascii_lowercase(),
        _ => c,
    }
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(lower_char).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.chars()
        .zip(b.chars())
        .all(|(ca, cb)| lower_char(ca) == lower_char(cb))
}
