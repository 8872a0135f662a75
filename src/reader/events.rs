//! XML Token Types
//!
//! Owned token types produced by `EventStream` and consumed by the
//! dispatch writer. Tokens are immutable once produced.

use std::fmt;

/// Namespace-qualified name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QName {
    /// Namespace prefix, empty when unprefixed
    pub prefix: String,
    /// Local part of the name
    pub local_name: String,
    /// Resolved namespace URI, empty when not in a namespace
    pub namespace_uri: String,
}

impl QName {
    /// Name with no prefix and no namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        QName {
            prefix: String::new(),
            local_name: local_name.into(),
            namespace_uri: String::new(),
        }
    }

    pub fn new(
        prefix: impl Into<String>,
        local_name: impl Into<String>,
        namespace_uri: impl Into<String>,
    ) -> Self {
        QName {
            prefix: prefix.into(),
            local_name: local_name.into(),
            namespace_uri: namespace_uri.into(),
        }
    }

    /// Split a raw `prefix:local` name. The namespace is left unresolved.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => QName::new(prefix, local, ""),
            None => QName::local(raw),
        }
    }

    /// Name as it appears in markup
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_name)
        }
    }
}

/// An attribute on a start element, or a standalone attribute token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    /// Value with entities decoded
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Attribute {
            name,
            value: value.into(),
        }
    }
}

/// A namespace binding (`xmlns` or `xmlns:prefix`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Bound prefix, empty for the default namespace
    pub prefix: String,
    pub uri: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Namespace {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// Start element token data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartElement {
    pub name: QName,
    /// Attributes in document order, `xmlns` declarations excluded
    pub attributes: Vec<Attribute>,
    /// Namespace declarations made on this element, in document order
    pub namespaces: Vec<Namespace>,
}

impl StartElement {
    pub fn new(name: QName) -> Self {
        StartElement {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Get an attribute value by local name
    pub fn attribute_value(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }
}

/// End element token data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndElement {
    pub name: QName,
}

impl EndElement {
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }
}

/// Character data between tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characters {
    pub text: String,
    pub is_whitespace_only: bool,
}

impl Characters {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let is_whitespace_only = text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'));
        Characters {
            text,
            is_whitespace_only,
        }
    }
}

/// XML token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlToken {
    /// `<?xml version="1.0" encoding="..."?>`, synthesised when absent
    StartDocument {
        version: String,
        encoding: Option<String>,
        standalone: Option<bool>,
    },
    EndDocument,
    StartElement(StartElement),
    EndElement(EndElement),
    Characters(Characters),
    /// CDATA section content
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    /// Reference to an entity other than the predefined five
    EntityReference { name: String },
    Namespace(Namespace),
    Attribute(Attribute),
    /// Raw DOCTYPE declaration
    Dtd(String),
    /// Whitespace with no content significance
    Space(String),
    EntityDeclaration { name: String, value: String },
    NotationDeclaration {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
}

/// Discriminant of an `XmlToken`, used to index the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    StartDocument = 0,
    EndDocument,
    StartElement,
    EndElement,
    Characters,
    CData,
    Comment,
    ProcessingInstruction,
    EntityReference,
    Namespace,
    Attribute,
    Dtd,
    Space,
    EntityDeclaration,
    NotationDeclaration,
}

impl TokenKind {
    /// Number of token kinds
    pub const COUNT: usize = 15;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl XmlToken {
    pub fn kind(&self) -> TokenKind {
        match self {
            XmlToken::StartDocument { .. } => TokenKind::StartDocument,
            XmlToken::EndDocument => TokenKind::EndDocument,
            XmlToken::StartElement(_) => TokenKind::StartElement,
            XmlToken::EndElement(_) => TokenKind::EndElement,
            XmlToken::Characters(_) => TokenKind::Characters,
            XmlToken::CData(_) => TokenKind::CData,
            XmlToken::Comment(_) => TokenKind::Comment,
            XmlToken::ProcessingInstruction { .. } => TokenKind::ProcessingInstruction,
            XmlToken::EntityReference { .. } => TokenKind::EntityReference,
            XmlToken::Namespace(_) => TokenKind::Namespace,
            XmlToken::Attribute(_) => TokenKind::Attribute,
            XmlToken::Dtd(_) => TokenKind::Dtd,
            XmlToken::Space(_) => TokenKind::Space,
            XmlToken::EntityDeclaration { .. } => TokenKind::EntityDeclaration,
            XmlToken::NotationDeclaration { .. } => TokenKind::NotationDeclaration,
        }
    }

    /// Convenience constructor for character data
    pub fn characters(text: impl Into<String>) -> Self {
        XmlToken::Characters(Characters::new(text))
    }

    /// Check if this is a start element token
    pub fn is_start_element(&self) -> bool {
        matches!(self, XmlToken::StartElement(_))
    }

    /// Check if this is an end element token
    pub fn is_end_element(&self) -> bool {
        matches!(self, XmlToken::EndElement(_))
    }

    /// Get as start element if applicable
    pub fn as_start_element(&self) -> Option<&StartElement> {
        match self {
            XmlToken::StartElement(e) => Some(e),
            _ => None,
        }
    }

    /// True for an end element with the given local name
    pub fn is_end_named(&self, local_name: &str) -> bool {
        matches!(self, XmlToken::EndElement(e) if e.name.local_name == local_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_parse() {
        let name = QName::parse("soap:Envelope");
        assert_eq!(name.prefix, "soap");
        assert_eq!(name.local_name, "Envelope");
        assert_eq!(name.qualified(), "soap:Envelope");

        let name = QName::parse("plain");
        assert!(name.prefix.is_empty());
        assert_eq!(name.qualified(), "plain");
    }

    #[test]
    fn test_whitespace_flag() {
        assert!(Characters::new(" \n\t").is_whitespace_only);
        assert!(!Characters::new(" x ").is_whitespace_only);
    }

    #[test]
    fn test_kind_index_is_dense() {
        assert_eq!(TokenKind::StartDocument.index(), 0);
        assert_eq!(TokenKind::NotationDeclaration.index(), TokenKind::COUNT - 1);
    }

    #[test]
    fn test_end_named() {
        let end = XmlToken::EndElement(EndElement {
            name: QName::local("document"),
        });
        assert!(end.is_end_named("document"));
        assert!(!end.is_end_named("envelope"));
        assert_eq!(end.kind(), TokenKind::EndElement);
    }
}
