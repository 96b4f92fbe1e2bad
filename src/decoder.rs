//! Field decoding for URL-derived place names.
//!
//! Result links carry the display name of a place as a path segment, with `+`
//! between words and percent-encoded UTF-8 for accented characters:
//! `/maps/place/Padaria+%26+Confeitaria/@-23.5,...`. [`decode`] turns such a
//! segment into a clean display string and never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

/// Marker preceding the place-name segment in a result link.
pub const DEFAULT_LINK_MARKER: &str = "/maps/place/";

/// Percent sequences that are occasionally left intact upstream. Only reached
/// on the fallback path; a successful decode leaves no `%` behind.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("%C3%A3", "ã"),
    ("%C3%A9", "é"),
    ("%C3%A7", "ç"),
    ("%C3%83", "Ã"),
    ("%C3%81", "Á"),
    ("%C3%94", "Ô"),
    ("%26", "&"),
];

static DEFAULT_LINK_PATTERN: Lazy<LinkPattern> = Lazy::new(|| {
    LinkPattern::new(DEFAULT_LINK_MARKER).expect("default link marker is a valid pattern")
});

/// Decode a raw path segment into a display string.
///
/// Total and idempotent: malformed escapes keep the original text, and the
/// result of one call is a fixpoint of the next. Non-empty input never
/// produces an empty output.
pub fn decode(raw: &str) -> String {
    let decoded = percent_decode_fixpoint(raw);
    let spaced = decoded.replace('+', " ");

    let mut substituted = spaced;
    for (pattern, replacement) in SUBSTITUTIONS {
        if substituted.contains(pattern) {
            substituted = substituted.replace(pattern, replacement);
        }
    }

    let cleaned = substituted.trim();
    if cleaned.is_empty() && !raw.is_empty() {
        return raw.to_string();
    }
    cleaned.to_string()
}

/// Percent-decode until the text stops changing. Falls back to the input
/// when the first pass hits a malformed escape or invalid UTF-8.
fn percent_decode_fixpoint(raw: &str) -> Cow<'_, str> {
    let mut current = match strict_percent_decode(raw) {
        Some(decoded) => decoded,
        None => {
            debug!("Malformed percent-encoding, keeping raw segment: {}", raw);
            return Cow::Borrowed(raw);
        }
    };

    while let Some(next) = strict_percent_decode(&current) {
        if next == current {
            break;
        }
        current = next;
    }

    Cow::Owned(current)
}

/// URI-component decoding: every `%` must introduce two hex digits and the
/// decoded bytes must be valid UTF-8.
fn strict_percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !well_formed {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(input).ok().map(Cow::into_owned)
}

/// Recognizes result links: the marker segment followed by a place-name
/// segment terminated by `/` or `?`.
#[derive(Debug, Clone)]
pub struct LinkPattern {
    marker: String,
    regex: Regex,
}

impl LinkPattern {
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("{}([^/?]+)[/?]", regex::escape(marker)))?;
        Ok(Self {
            marker: marker.to_string(),
            regex,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether the link contains a recognizable place segment.
    pub fn matches(&self, link: &str) -> bool {
        self.regex.is_match(link)
    }

    /// Raw, still-encoded place segment of the link.
    pub fn raw_segment<'a>(&self, link: &'a str) -> Option<&'a str> {
        self.regex
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Decoded display name carried by the link.
    pub fn place_name(&self, link: &str) -> Option<String> {
        let segment = self.raw_segment(link)?;
        let name = decode(segment);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl Default for LinkPattern {
    fn default() -> Self {
        DEFAULT_LINK_PATTERN.clone()
    }
}

/// Decoded place name from a link using the default marker.
pub fn decode_place_segment(link: &str) -> Option<String> {
    DEFAULT_LINK_PATTERN.place_name(link)
}
