//! Streaming XML Event Source
//!
//! `EventStream` is a forward-only pull source of `XmlToken`s over any
//! `Read`. Input is decoded to UTF-8 on the fly, tokenized one buffered
//! window at a time, checked for element balance and namespace-resolved.

use super::buffered::{BufferedReader, DEFAULT_BUFFER_SIZE};
use super::events::{Attribute, EndElement, Namespace, QName, StartElement, XmlToken};
use crate::core::attributes::{parse_attributes, parse_attributes_with};
use crate::core::dtd::EntityTable;
use crate::core::encoding::{DecodingReader, InputEncoding};
use crate::core::entities::{split_text, TextSegment};
use crate::core::tokenizer::{Token, TokenKind, Step, Tokenizer};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, Chain, Cursor, Read};

/// Bytes examined for a BOM and XML declaration before decoding starts
const SNIFF_LEN: usize = 512;

/// Namespace bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Configuration for an `EventStream`
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Initial size of the tokenizer window
    pub buffer_size: usize,
    /// Prefix bindings in scope before the document starts
    pub namespaces: Vec<(String, String)>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            namespaces: Vec::new(),
        }
    }
}

impl StreamOptions {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }
}

type Source<R> = BufferedReader<DecodingReader<Chain<Cursor<Vec<u8>>, R>>>;

/// Result of one tokenizer step, detached from the window borrow
enum Advance {
    Consumed(usize),
    NeedMore,
    Eof,
}

/// Forward-only token source
pub struct EventStream<R: Read> {
    /// None once closed
    source: Option<Source<R>>,
    document: DocumentState,
}

/// Everything the stream tracks about the document read so far
struct DocumentState {
    pending: VecDeque<XmlToken>,
    /// Open elements with the binding count to restore when each closes
    elements: Vec<(QName, usize)>,
    /// In-scope prefix bindings, innermost last
    bindings: Vec<(String, String)>,
    /// General entities from the internal subset
    entities: EntityTable,
    encoding: String,
    started: bool,
    seen_root: bool,
    done: bool,
}

impl<R: Read> EventStream<R> {
    /// Open a stream over `reader`.
    ///
    /// Reads a short prefix to detect the encoding. Fails with
    /// `UnsupportedEncoding` when the declared encoding cannot be decoded.
    pub fn new(mut reader: R, options: StreamOptions) -> Result<Self> {
        let mut prefix = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            match reader.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        prefix.truncate(filled);

        let (encoding, bom_len) = InputEncoding::detect(&prefix)?;
        let mut head = Cursor::new(prefix);
        head.set_position(bom_len as u64);
        let decoded = DecodingReader::new(head.chain(reader), encoding);
        let source = BufferedReader::with_capacity(decoded, options.buffer_size);

        let mut bindings = vec![("xml".to_string(), XML_NAMESPACE.to_string())];
        bindings.extend(options.namespaces);

        Ok(EventStream {
            source: Some(source),
            document: DocumentState {
                pending: VecDeque::new(),
                elements: Vec::new(),
                bindings,
                entities: EntityTable::new(),
                encoding: encoding.label().to_string(),
                started: false,
                seen_root: false,
                done: false,
            },
        })
    }

    /// Encoding declared by the document, or the detected one when the
    /// document declares none
    pub fn encoding(&self) -> &str {
        &self.document.encoding
    }

    /// Nesting depth of the last token read
    pub fn depth(&self) -> usize {
        self.document.elements.len()
    }

    /// True once closed or once EndDocument has been read
    pub fn is_finished(&self) -> bool {
        self.source.is_none() || (self.document.done && self.document.pending.is_empty())
    }

    /// Release the underlying source. Idempotent; later reads return `None`.
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            log::debug!("event stream closed");
        }
        self.document.pending.clear();
        self.document.done = true;
    }

    /// Read the next token, or `None` when the stream is exhausted
    pub fn next_token(&mut self) -> Result<Option<XmlToken>> {
        loop {
            if let Some(token) = self.document.pending.pop_front() {
                return Ok(Some(token));
            }
            if self.document.done {
                return Ok(None);
            }
            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };

            let offset = source.offset();
            let advance = {
                let window = source.buffered();
                let mut tokenizer = Tokenizer::new(window, source.source_exhausted());
                match tokenizer.next_token() {
                    Err(e) => Err(Error::malformed(e.message, offset + e.position)),
                    Ok(Step::NeedMore) => Ok(Advance::NeedMore),
                    Ok(Step::Eof) => Ok(Advance::Eof),
                    Ok(Step::Token(token)) => self
                        .document
                        .accept(token, offset)
                        .map(|()| Advance::Consumed(tokenizer.position())),
                }
            };

            match advance {
                Ok(Advance::Consumed(n)) => source.consume(n),
                Ok(Advance::NeedMore) => {
                    if let Err(e) = source.fill_buffer() {
                        let err = match e.kind() {
                            io::ErrorKind::InvalidData => Error::malformed(e.to_string(), offset),
                            _ => Error::Io(e),
                        };
                        return Err(self.fail(err));
                    }
                }
                Ok(Advance::Eof) => {
                    if let Err(e) = self.document.finish(offset) {
                        return Err(self.fail(e));
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// A failed stream yields nothing further
    fn fail(&mut self, err: Error) -> Error {
        self.document.pending.clear();
        self.document.done = true;
        err
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<XmlToken>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

impl DocumentState {
    fn ensure_started(&mut self) {
        if !self.started {
            self.started = true;
            self.pending.push_back(XmlToken::StartDocument {
                version: "1.0".to_string(),
                encoding: None,
                standalone: None,
            });
        }
    }

    fn accept(&mut self, token: Token<'_>, offset: usize) -> Result<()> {
        let position = offset + token.span.0;
        let content = token.content.unwrap_or_default();

        if token.kind == TokenKind::XmlDeclaration {
            if self.started {
                return Err(Error::malformed("XML declaration is not at the start of the document", position));
            }
            return self.accept_declaration(content, position);
        }
        self.ensure_started();

        match token.kind {
            TokenKind::Text => self.accept_text(content, position)?,
            TokenKind::CData => {
                if self.elements.is_empty() {
                    return Err(Error::malformed("CDATA section outside the root element", position));
                }
                self.pending.push_back(XmlToken::CData(utf8(content, position)?));
            }
            TokenKind::Comment => self.pending.push_back(XmlToken::Comment(utf8(content, position)?)),
            TokenKind::ProcessingInstruction => {
                let target = utf8(token.name.unwrap_or_default(), position)?;
                let data = utf8(content, position)?;
                self.pending.push_back(XmlToken::ProcessingInstruction { target, data });
            }
            TokenKind::DocType => {
                if self.seen_root {
                    return Err(Error::malformed("DOCTYPE after the root element", position));
                }
                self.entities = EntityTable::from_doctype(content).map_err(|m| Error::malformed(m, position))?;
                self.pending.push_back(XmlToken::Dtd(utf8(content, position)?));
            }
            TokenKind::StartTag | TokenKind::EmptyTag => {
                let name = token.name.unwrap_or_default();
                self.accept_start(name, content, token.kind == TokenKind::EmptyTag, position)?;
            }
            TokenKind::EndTag => self.accept_end(token.name.unwrap_or_default(), position)?,
            TokenKind::XmlDeclaration => {}
        }
        Ok(())
    }

    fn accept_declaration(&mut self, content: &[u8], position: usize) -> Result<()> {
        let attrs = parse_attributes(content).map_err(|m| Error::malformed(m, position))?;
        let mut version = "1.0".to_string();
        let mut encoding = None;
        let mut standalone = None;
        for attr in attrs {
            let value = utf8(&attr.value, position)?;
            match attr.name {
                b"version" => version = value,
                b"encoding" => encoding = Some(value),
                b"standalone" => standalone = Some(value == "yes"),
                _ => {}
            }
        }
        if let Some(label) = &encoding {
            self.encoding = label.clone();
        }
        self.started = true;
        self.pending.push_back(XmlToken::StartDocument {
            version,
            encoding,
            standalone,
        });
        Ok(())
    }

    fn accept_text(&mut self, content: &[u8], position: usize) -> Result<()> {
        if self.elements.is_empty() {
            if content.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
                self.pending.push_back(XmlToken::Space(utf8(content, position)?));
                return Ok(());
            }
            return Err(Error::malformed("character data outside the root element", position));
        }
        for segment in split_text(content, Some(&self.entities)) {
            let token = match segment {
                TextSegment::Text(text) => XmlToken::characters(utf8(&text, position)?),
                TextSegment::EntityRef(name) => XmlToken::EntityReference {
                    name: utf8(name, position)?,
                },
            };
            self.pending.push_back(token);
        }
        Ok(())
    }

    fn accept_start(&mut self, raw_name: &[u8], content: &[u8], is_empty: bool, position: usize) -> Result<()> {
        if self.elements.is_empty() && self.seen_root {
            return Err(Error::malformed("more than one root element", position));
        }
        let raw_attrs =
            parse_attributes_with(content, Some(&self.entities)).map_err(|m| Error::malformed(m, position))?;
        let scope = self.bindings.len();

        let mut namespaces = Vec::new();
        let mut plain = Vec::new();
        for attr in raw_attrs {
            let value = utf8(&attr.value, position)?;
            if attr.name == b"xmlns" {
                namespaces.push(Namespace::new("", value));
            } else if let Some(prefix) = attr.name.strip_prefix(b"xmlns:") {
                namespaces.push(Namespace::new(utf8(prefix, position)?, value));
            } else {
                plain.push((utf8(attr.name, position)?, value));
            }
        }
        for ns in &namespaces {
            self.bindings.push((ns.prefix.clone(), ns.uri.clone()));
        }

        let mut name = QName::parse(&utf8(raw_name, position)?);
        name.namespace_uri = self.resolve(&name.prefix, true, position)?;

        let mut attributes = Vec::with_capacity(plain.len());
        for (raw, value) in plain {
            let mut attr_name = QName::parse(&raw);
            attr_name.namespace_uri = self.resolve(&attr_name.prefix, false, position)?;
            attributes.push(Attribute::new(attr_name, value));
        }

        self.seen_root = true;
        self.pending.push_back(XmlToken::StartElement(StartElement {
            name: name.clone(),
            attributes,
            namespaces,
        }));
        if is_empty {
            self.bindings.truncate(scope);
            self.pending.push_back(XmlToken::EndElement(EndElement { name }));
        } else {
            self.elements.push((name, scope));
        }
        Ok(())
    }

    fn accept_end(&mut self, raw_name: &[u8], position: usize) -> Result<()> {
        let raw_name = utf8(raw_name, position)?;
        let Some((name, scope)) = self.elements.pop() else {
            return Err(Error::malformed(format!("unexpected end tag </{raw_name}>"), position));
        };
        if name.qualified() != raw_name {
            return Err(Error::malformed(
                format!("mismatched end tag: expected </{}>, found </{raw_name}>", name.qualified()),
                position,
            ));
        }
        self.bindings.truncate(scope);
        self.pending.push_back(XmlToken::EndElement(EndElement { name }));
        Ok(())
    }

    /// Namespace URI for a prefix. Unprefixed attributes are in no namespace.
    fn resolve(&self, prefix: &str, is_element: bool, position: usize) -> Result<String> {
        if prefix.is_empty() && !is_element {
            return Ok(String::new());
        }
        match self.bindings.iter().rev().find(|(p, _)| p == prefix) {
            Some((_, uri)) => Ok(uri.clone()),
            None if prefix.is_empty() => Ok(String::new()),
            None => Err(Error::malformed(format!("unbound namespace prefix '{prefix}'"), position)),
        }
    }

    fn finish(&mut self, position: usize) -> Result<()> {
        if let Some((open, _)) = self.elements.last() {
            return Err(Error::malformed(
                format!("unexpected end of input inside <{}>", open.qualified()),
                position,
            ));
        }
        if !self.seen_root {
            return Err(Error::malformed("document has no root element", position));
        }
        self.ensure_started();
        self.pending.push_back(XmlToken::EndDocument);
        self.done = true;
        log::trace!("end of document at byte {position}");
        Ok(())
    }
}

fn utf8(bytes: &[u8], position: usize) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::malformed(format!("invalid UTF-8: {e}"), position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::events::TokenKind as Kind;
    use pretty_assertions::assert_eq;

    fn stream(xml: &str) -> EventStream<&[u8]> {
        EventStream::new(xml.as_bytes(), StreamOptions::default()).unwrap()
    }

    fn kinds(xml: &str) -> Vec<Kind> {
        stream(xml).map(|t| t.unwrap().kind()).collect()
    }

    #[test]
    fn test_simple_document() {
        assert_eq!(
            kinds("<?xml version=\"1.0\"?><a x=\"1\">hi<b/></a>"),
            vec![
                Kind::StartDocument,
                Kind::StartElement,
                Kind::Characters,
                Kind::StartElement,
                Kind::EndElement,
                Kind::EndElement,
                Kind::EndDocument,
            ]
        );
    }

    #[test]
    fn test_start_document_synthesised() {
        let mut s = stream("<a/>");
        assert_eq!(
            s.next_token().unwrap(),
            Some(XmlToken::StartDocument {
                version: "1.0".to_string(),
                encoding: None,
                standalone: None,
            })
        );
        assert_eq!(s.encoding(), "UTF-8");
    }

    #[test]
    fn test_declared_encoding_exposed() {
        let mut s = stream("<?xml version=\"1.0\" encoding=\"ISO-8859-1\" standalone=\"yes\"?><a/>");
        match s.next_token().unwrap() {
            Some(XmlToken::StartDocument { encoding, standalone, .. }) => {
                assert_eq!(encoding.as_deref(), Some("ISO-8859-1"));
                assert_eq!(standalone, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(s.encoding(), "ISO-8859-1");
    }

    #[test]
    fn test_exhausted_after_end_document() {
        let mut s = stream("<a/>");
        while s.next_token().unwrap().is_some() {}
        assert_eq!(s.next_token().unwrap(), None);
        assert!(s.is_finished());
    }

    #[test]
    fn test_entities_and_references() {
        let tokens: Vec<_> = stream("<a>x &amp; y&ext;z</a>").map(Result::unwrap).collect();
        assert_eq!(tokens[2], XmlToken::characters("x & y"));
        assert_eq!(tokens[3], XmlToken::EntityReference { name: "ext".to_string() });
        assert_eq!(tokens[4], XmlToken::characters("z"));
    }

    #[test]
    fn test_internal_subset_entities_expand() {
        let tokens: Vec<_> =
            stream("<!DOCTYPE r [<!ENTITY co \"Acme\"><!ENTITY ext SYSTEM \"e.xml\">]><r a=\"&co;\">x &co; y&ext;</r>")
                .map(Result::unwrap)
                .collect();
        assert_eq!(tokens[1].kind(), Kind::Dtd);
        let start = tokens[2].as_start_element().unwrap();
        assert_eq!(start.attributes[0].value, "Acme");
        assert_eq!(tokens[3], XmlToken::characters("x Acme y"));
        assert_eq!(tokens[4], XmlToken::EntityReference { name: "ext".to_string() });
    }

    #[test]
    fn test_recursive_entity_is_malformed() {
        let err = stream("<!DOCTYPE r [<!ENTITY a \"&a;\">]><r>&a;</r>")
            .find_map(Result::err)
            .unwrap();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_space_outside_root() {
        assert_eq!(
            kinds("<a/>\n"),
            vec![Kind::StartDocument, Kind::StartElement, Kind::EndElement, Kind::Space, Kind::EndDocument]
        );
    }

    #[test]
    fn test_namespaces_resolved() {
        let tokens: Vec<_> = stream("<s:env xmlns:s=\"urn:s\"><s:body a:b=\"1\" xmlns:a=\"urn:a\"/></s:env>")
            .map(Result::unwrap)
            .collect();
        let env = tokens[1].as_start_element().unwrap();
        assert_eq!(env.name, QName::new("s", "env", "urn:s"));
        assert_eq!(env.namespaces, vec![Namespace::new("s", "urn:s")]);
        let body = tokens[2].as_start_element().unwrap();
        assert_eq!(body.attributes[0].name, QName::new("a", "b", "urn:a"));
    }

    #[test]
    fn test_preconfigured_namespace() {
        let options = StreamOptions::default().with_namespace("p", "urn:p");
        let mut s = EventStream::new(&b"<p:a/>"[..], options).unwrap();
        s.next_token().unwrap();
        let start = s.next_token().unwrap().unwrap();
        assert_eq!(start.as_start_element().unwrap().name.namespace_uri, "urn:p");
    }

    #[test]
    fn test_unbound_prefix_is_malformed() {
        let err = stream("<p:a/>").find_map(Result::err).unwrap();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = stream("<a><b></a></b>").find_map(Result::err).unwrap();
        match err {
            Error::MalformedInput { message, position } => {
                assert!(message.contains("mismatched end tag"));
                assert_eq!(position, 6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_at_eof() {
        let err = stream("<a><b>").find_map(Result::err).unwrap();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_small_buffer_spanning_tokens() {
        let xml = format!("<root>{}<leaf attr=\"{}\"/></root>", "text ".repeat(20), "v".repeat(40));
        let options = StreamOptions::default().with_buffer_size(16);
        let tokens: Vec<_> = EventStream::new(xml.as_bytes(), options)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(tokens[2], XmlToken::characters("text ".repeat(20)));
        assert_eq!(
            tokens[3].as_start_element().unwrap().attribute_value("attr"),
            Some("v".repeat(40).as_str())
        );
        assert_eq!(tokens.last(), Some(&XmlToken::EndDocument));
    }

    #[test]
    fn test_utf16_input() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend("<a>é</a>".encode_utf16().flat_map(u16::to_le_bytes));
        let tokens: Vec<_> = EventStream::new(&bytes[..], StreamOptions::default())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(tokens[2], XmlToken::characters("é"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut s = stream("<a><b/></a>");
        s.next_token().unwrap();
        s.close();
        s.close();
        assert_eq!(s.next_token().unwrap(), None);
    }
}
