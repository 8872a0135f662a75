//! XML Attribute Parsing
//!
//! Parses XML attributes from tag content. Names are left raw; the
//! stream resolves prefixes against its namespace context.

use super::dtd::EntityTable;
use super::entities::decode_text_with;
use super::scanner::{is_name_char, is_name_start_char, is_whitespace};
use std::borrow::Cow;

/// An attribute as written in a start tag
#[derive(Debug, Clone)]
pub struct RawAttribute<'a> {
    /// Attribute name (may include namespace prefix)
    pub name: &'a [u8],
    /// Attribute value (entities decoded)
    pub value: Cow<'a, [u8]>,
}

impl<'a> RawAttribute<'a> {
    /// Get the name as a string
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(self.name).ok()
    }

    /// Get the value as a string
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(self.value.as_ref()).ok()
    }

    /// True for `xmlns` and `xmlns:prefix`
    pub fn is_namespace_decl(&self) -> bool {
        self.name == b"xmlns" || self.name.starts_with(b"xmlns:")
    }
}

/// Parse attributes from raw tag content (after the element name)
///
/// Input should be the content between element name and '>' or '/>'.
/// Values must be quoted and every name must be followed by '='.
pub fn parse_attributes(input: &[u8]) -> Result<Vec<RawAttribute<'_>>, &'static str> {
    parse_attributes_with(input, None)
}

/// Parse attributes, expanding entities declared in `entities` in values
pub fn parse_attributes_with<'a>(
    input: &'a [u8],
    entities: Option<&EntityTable>,
) -> Result<Vec<RawAttribute<'a>>, &'static str> {
    let mut attrs: Vec<RawAttribute<'_>> = Vec::new();
    let mut pos = 0;

    loop {
        let before_ws = pos;
        while pos < input.len() && is_whitespace(input[pos]) {
            pos += 1;
        }
        if pos >= input.len() {
            break;
        }
        if pos == before_ws && !attrs.is_empty() {
            return Err("Whitespace required between attributes");
        }

        if !is_name_start_char(input[pos]) {
            return Err("Attribute name must start with letter, underscore, or colon");
        }
        let name_start = pos;
        while pos < input.len() && is_name_char(input[pos]) {
            pos += 1;
        }
        let name = &input[name_start..pos];

        while pos < input.len() && is_whitespace(input[pos]) {
            pos += 1;
        }
        if pos >= input.len() || input[pos] != b'=' {
            return Err("Attribute value required");
        }
        pos += 1;
        while pos < input.len() && is_whitespace(input[pos]) {
            pos += 1;
        }

        let quote = match input.get(pos) {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err("Attribute value must be quoted"),
        };
        pos += 1;
        let value_start = pos;
        while pos < input.len() && input[pos] != quote {
            if input[pos] == b'<' {
                return Err("Attribute value cannot contain '<'");
            }
            pos += 1;
        }
        if pos >= input.len() {
            return Err("Attribute value has mismatched quotes");
        }
        let value = decode_text_with(&input[value_start..pos], entities);
        pos += 1;

        if attrs.iter().any(|a| a.name == name) {
            return Err("Duplicate attribute");
        }
        attrs.push(RawAttribute { name, value });
    }

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_attributes() {
        let attrs = parse_attributes(b" id=\"test\" class=\"foo\"").unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name_str(), Some("id"));
        assert_eq!(attrs[0].value_str(), Some("test"));
        assert_eq!(attrs[1].name_str(), Some("class"));
        assert_eq!(attrs[1].value_str(), Some("foo"));
    }

    #[test]
    fn test_single_quoted() {
        let attrs = parse_attributes(b" id='test'").unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].value_str(), Some("test"));
    }

    #[test]
    fn test_namespace_declaration() {
        let attrs = parse_attributes(b" xmlns:xlink=\"http://www.w3.org/1999/xlink\" xmlns='urn:a'").unwrap();
        assert!(attrs[0].is_namespace_decl());
        assert!(attrs[1].is_namespace_decl());
    }

    #[test]
    fn test_entity_in_value() {
        let attrs = parse_attributes(b" title=\"&lt;hello&gt;\"").unwrap();
        assert_eq!(attrs[0].value_str(), Some("<hello>"));
    }

    #[test]
    fn test_whitespace_handling() {
        let attrs = parse_attributes(b"  id  =  \"test\"  ").unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name_str(), Some("id"));
        assert_eq!(attrs[0].value_str(), Some("test"));
    }

    #[test]
    fn test_malformed() {
        assert!(parse_attributes(b" id=test").is_err());
        assert!(parse_attributes(b" id").is_err());
        assert!(parse_attributes(b" id=\"a\" id=\"b\"").is_err());
        assert!(parse_attributes(b" id=\"open").is_err());
    }

    #[test]
    fn test_declared_entity_in_value() {
        let table = EntityTable::from_doctype(b"<!DOCTYPE r [<!ENTITY co \"Acme\">]>").unwrap();
        let attrs = parse_attributes_with(b" a=\"&co;\" b='&co; &amp; &x;'", Some(&table)).unwrap();
        assert_eq!(attrs[0].value_str(), Some("Acme"));
        assert_eq!(attrs[1].value_str(), Some("Acme & &x;"));
    }
}
