//! XML Entity Decoding and Escaping
//!
//! Handles decoding of XML entities:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - Numeric character references: &#123; &#x7B;
//!
//! - Entities declared in the document's internal subset
//!
//! Any other `&name;` is an entity reference the stream surfaces as its
//! own token, so text is split around it rather than decoded.
//!
//! Uses Cow for zero-copy when no entities are present.

use super::dtd::EntityTable;
use memchr::{memchr, memchr3};
use std::borrow::Cow;

/// A run of character data, or a reference to a non-predefined entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSegment<'a> {
    Text(Cow<'a, [u8]>),
    EntityRef(&'a [u8]),
}

/// Decode text content, handling predefined entities and character references
///
/// Returns Borrowed if no entities present (zero-copy),
/// returns Owned if entities were decoded. Unknown entities are kept as-is.
#[inline]
pub fn decode_text(input: &[u8]) -> Cow<'_, [u8]> {
    decode_text_with(input, None)
}

/// Decode text, also expanding entities declared in `entities`
pub fn decode_text_with<'a>(input: &'a [u8], entities: Option<&EntityTable>) -> Cow<'a, [u8]> {
    // Fast path: check if there are any entities using SIMD
    if memchr(b'&', input).is_none() {
        return Cow::Borrowed(input);
    }
    let mut result = Vec::with_capacity(input.len());
    let mut pos = 0;
    while pos < input.len() {
        match next_entity(input, pos) {
            Some((amp, end, decoded)) => {
                result.extend_from_slice(&input[pos..amp]);
                match decoded {
                    Some(c) => push_char(&mut result, c),
                    None => match declared(input, amp, end, entities) {
                        Some(text) => result.extend_from_slice(text),
                        None => result.extend_from_slice(&input[amp..end]),
                    },
                }
                pos = end;
            }
            None => {
                result.extend_from_slice(&input[pos..]);
                break;
            }
        }
    }
    Cow::Owned(result)
}

/// Split text into decoded runs and entity references. Entities declared
/// in `entities` are expanded into the surrounding run.
pub fn split_text<'a>(input: &'a [u8], entities: Option<&EntityTable>) -> Vec<TextSegment<'a>> {
    let mut segments = Vec::new();
    if memchr(b'&', input).is_none() {
        if !input.is_empty() {
            segments.push(TextSegment::Text(Cow::Borrowed(input)));
        }
        return segments;
    }

    let mut run: Vec<u8> = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        match next_entity(input, pos) {
            Some((amp, end, decoded)) => {
                run.extend_from_slice(&input[pos..amp]);
                if let (None, Some(text)) = (decoded, declared(input, amp, end, entities)) {
                    run.extend_from_slice(text);
                    pos = end;
                    continue;
                }
                match decoded {
                    Some(c) => push_char(&mut run, c),
                    None if end > amp + 2 && input[end - 1] == b';' && input[amp + 1] != b'#' => {
                        if !run.is_empty() {
                            segments.push(TextSegment::Text(Cow::Owned(std::mem::take(&mut run))));
                        }
                        segments.push(TextSegment::EntityRef(&input[amp + 1..end - 1]));
                    }
                    // Bare '&' with no reference after it is kept as text
                    None => run.extend_from_slice(&input[amp..end]),
                }
                pos = end;
            }
            None => {
                run.extend_from_slice(&input[pos..]);
                break;
            }
        }
    }
    if !run.is_empty() {
        segments.push(TextSegment::Text(Cow::Owned(run)));
    }
    segments
}

/// Locate the next '&' at or after `from`.
/// Returns (amp position, end of the reference, decoded char if predefined).
fn next_entity(input: &[u8], from: usize) -> Option<(usize, usize, Option<char>)> {
    let amp = from + memchr(b'&', &input[from..])?;
    let Some(semi) = memchr(b';', &input[amp..]).map(|i| amp + i) else {
        return Some((amp, amp + 1, None));
    };
    let entity = &input[amp + 1..semi];
    if entity.is_empty() || !entity.iter().all(|&b| is_entity_name_byte(b)) {
        return Some((amp, amp + 1, None));
    }
    Some((amp, semi + 1, decode_entity(entity)))
}

/// Replacement text for the reference at `input[amp..end]`, if declared
fn declared<'e>(input: &[u8], amp: usize, end: usize, entities: Option<&'e EntityTable>) -> Option<&'e [u8]> {
    if end < amp + 3 || input[end - 1] != b';' {
        return None;
    }
    entities?.replacement(&input[amp + 1..end - 1])
}

#[inline]
fn is_entity_name_byte(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b'#' | b':') || b >= 0x80
}

#[inline]
fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Decode a single entity (without & and ;)
fn decode_entity(entity: &[u8]) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix(b"#") {
        return decode_numeric_entity(numeric);
    }
    match entity {
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"amp" => Some('&'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        _ => None,
    }
}

/// Decode a numeric character reference
fn decode_numeric_entity(entity: &[u8]) -> Option<char> {
    let codepoint = match entity.split_first()? {
        (b'x' | b'X', hex) => u32::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?,
        _ => std::str::from_utf8(entity).ok()?.parse::<u32>().ok()?,
    };
    if !is_valid_xml_char(codepoint) {
        return None;
    }
    char::from_u32(codepoint)
}

/// Check if a code point is a valid XML 1.0 Char
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint,
        0x9 | 0xA | 0xD |
        0x20..=0xD7FF |
        0xE000..=0xFFFD |
        0x10000..=0x10FFFF
    )
}

/// Escape character data for XML output
pub fn escape_text(input: &str) -> Cow<'_, str> {
    if memchr3(b'<', b'>', b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Escape a value for use inside a double-quoted attribute
pub fn escape_attribute(input: &str) -> Cow<'_, str> {
    if !input
        .bytes()
        .any(|b| matches!(b, b'<' | b'>' | b'&' | b'"' | b'\n' | b'\r' | b'\t'))
    {
        return Cow::Borrowed(input);
    }
    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\n' => result.push_str("&#10;"),
            '\r' => result.push_str("&#13;"),
            '\t' => result.push_str("&#9;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}
