//! URL-encoded parameter decoding.
//!
//! Shared by query strings and `application/x-www-form-urlencoded`
//! bodies: `&`-separated `key=value` pairs, `+` decoding to space and
//! `%HH` percent-decoding. Multiple occurrences of a key accumulate in
//! order; empty keys are warned about and skipped; empty values are
//! kept.

use hearth_core::logging::LogContext;
use hearth_core::log_warn;
use hearth_core::request::ParamMap;

/// Percent-decode a string, also turning `+` into a space.
///
/// Invalid percent sequences are passed through literally.
#[must_use]
pub fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        decoded.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                decoded.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Parse a query string or form body into `params`.
///
/// Pairs are `&`-separated; a pair without `=` is a key with an empty
/// value. Keys that decode to the empty string are skipped with a
/// warning.
pub fn parse_params(input: &str, params: &mut ParamMap, ctx: LogContext) {
    if input.is_empty() {
        return;
    }
    for pair in input.split('&') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (url_decode(key.trim()), url_decode(value.trim())),
            None => (url_decode(pair), String::new()),
        };
        if key.is_empty() {
            log_warn!(ctx, "empty parameter key skipped", pair => pair);
            continue;
        }
        params.entry(key).or_default().push(value);
    }
}
