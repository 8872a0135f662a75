//! Subtree Reconstruction
//!
//! Rebuilds the element at a split point from the token stream and
//! serializes it as a standalone document. Only simple content is kept:
//! an element holds either child elements or text, never both. Text that
//! arrives after a node has children is discarded.

use crate::core::encoding::OutputEncoding;
use crate::error::{Error, Result};
use crate::reader::events::{Attribute, Namespace, QName, StartElement, XmlToken};
use crate::reader::stream::EventStream;
use crate::writer::xml::{StreamWriter, XmlWriter};
use std::cell::RefCell;
use std::io::Read;

/// Element rebuilt from the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtreeNode {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Declarations carried over from the source element
    pub namespaces: Vec<Namespace>,
    pub children: Vec<SubtreeNode>,
    /// Only set on nodes without children
    pub text: Option<String>,
}

impl SubtreeNode {
    pub fn from_start(start: StartElement) -> Self {
        SubtreeNode {
            name: start.name,
            attributes: start.attributes,
            namespaces: start.namespaces,
            children: Vec::new(),
            text: None,
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn append_text(&mut self, text: &str) {
        if self.has_children() {
            return;
        }
        self.text.get_or_insert_with(String::new).push_str(text);
    }
}

/// Rebuild the element opened by `start`, consuming tokens up to its end
pub fn reconstruct<R: Read>(
    stream: &mut EventStream<R>,
    start: StartElement,
    preserve_whitespace: bool,
) -> Result<SubtreeNode> {
    let stop_name = start.local_name().to_string();
    let mut roots = Vec::with_capacity(1);
    build_frame(stream, start, &stop_name, &mut roots, preserve_whitespace)?;

    let mut roots = roots.into_iter();
    let root = roots
        .next()
        .ok_or_else(|| Error::malformed(format!("no content for <{stop_name}>"), 0))?;
    let dropped = roots.count();
    if dropped > 0 {
        log::warn!("dropped {dropped} extra top-level element(s) while rebuilding <{stop_name}>");
    }
    Ok(root)
}

/// One level of the rebuild. The frame opens its node on `first`, hands
/// every nested StartElement to a child frame, and ends at the first
/// EndElement named `stop_name`. Finished nodes are pushed onto `parent`.
fn build_frame<R: Read>(
    stream: &mut EventStream<R>,
    first: StartElement,
    stop_name: &str,
    parent: &mut Vec<SubtreeNode>,
    preserve_whitespace: bool,
) -> Result<()> {
    let mut current: Option<SubtreeNode> = None;
    let mut token = Some(XmlToken::StartElement(first));

    while let Some(tok) = token.take() {
        if tok.is_end_named(stop_name) {
            parent.extend(current.take());
            return Ok(());
        }
        match tok {
            XmlToken::StartElement(start) => match current.as_mut() {
                Some(node) => {
                    let child_name = start.local_name().to_string();
                    build_frame(stream, start, &child_name, &mut node.children, preserve_whitespace)?;
                }
                None => current = Some(SubtreeNode::from_start(start)),
            },
            XmlToken::Characters(chars) => {
                if let Some(node) = current.as_mut() {
                    if preserve_whitespace || !chars.is_whitespace_only {
                        node.append_text(&chars.text);
                    }
                }
            }
            XmlToken::CData(text) => {
                if let Some(node) = current.as_mut() {
                    if preserve_whitespace || !text.trim().is_empty() {
                        node.append_text(&text);
                    }
                }
            }
            XmlToken::EntityReference { name } => {
                log::trace!("entity reference &{name}; not carried into split document");
            }
            XmlToken::EndElement(_) => parent.extend(current.take()),
            _ => {}
        }
        token = stream.next_token()?;
    }

    // Input ran out before the end tag
    parent.extend(current.take());
    Ok(())
}

/// Writes rebuilt subtrees as documents. Holds a reusable output buffer.
pub struct SubtreeSerializer {
    buffer: Vec<u8>,
}

thread_local! {
    static SERIALIZER: RefCell<SubtreeSerializer> = RefCell::new(SubtreeSerializer::new());
}

impl Default for SubtreeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl SubtreeSerializer {
    pub fn new() -> Self {
        SubtreeSerializer {
            buffer: Vec::with_capacity(8192),
        }
    }

    /// Serialize `node` as a complete document
    pub fn serialize(&mut self, node: &SubtreeNode, encoding: OutputEncoding, indent: Option<usize>) -> Result<Vec<u8>> {
        self.buffer.clear();
        let mut writer = XmlWriter::with_encoding(&mut self.buffer, encoding).with_indent(indent);
        writer.write_start_document("1.0", Some(encoding.label()))?;
        write_node(&mut writer, node)?;
        writer.write_end_document()?;
        Ok(self.buffer.clone())
    }
}

/// Serialize with this thread's cached serializer
pub fn serialize_document(node: &SubtreeNode, encoding: OutputEncoding, indent: Option<usize>) -> Result<Vec<u8>> {
    SERIALIZER.with(|serializer| serializer.borrow_mut().serialize(node, encoding, indent))
}

fn write_node(writer: &mut dyn StreamWriter, node: &SubtreeNode) -> Result<()> {
    writer.write_start_element(&node.name)?;
    for namespace in &node.namespaces {
        writer.write_namespace(namespace)?;
    }
    for attribute in &node.attributes {
        writer.write_attribute(attribute)?;
    }
    if node.has_children() {
        for child in &node.children {
            write_node(writer, child)?;
        }
    } else if let Some(text) = &node.text {
        writer.write_characters(text)?;
    }
    writer.write_end_element()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::stream::StreamOptions;
    use crate::split::path::next_matching;
    use pretty_assertions::assert_eq;

    fn rebuild(xml: &str, name: &str, preserve: bool) -> SubtreeNode {
        let mut stream = EventStream::new(xml.as_bytes(), StreamOptions::default()).unwrap();
        let start = next_matching(&mut stream, name).unwrap().unwrap();
        reconstruct(&mut stream, start, preserve).unwrap()
    }

    fn compact(node: &SubtreeNode) -> String {
        String::from_utf8(serialize_document(node, OutputEncoding::Utf8, None).unwrap()).unwrap()
    }

    #[test]
    fn test_nested_elements() {
        let node = rebuild("<r><doc id=\"7\"><a>1</a><b><c>2</c></b></doc></r>", "doc", false);
        assert_eq!(node.name.local_name, "doc");
        assert_eq!(node.attributes[0].value, "7");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].text.as_deref(), Some("1"));
        assert_eq!(node.children[1].children[0].text.as_deref(), Some("2"));
        assert_eq!(
            compact(&node),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><doc id=\"7\"><a>1</a><b><c>2</c></b></doc>"
        );
    }

    #[test]
    fn test_whitespace_only_text() {
        let dropped = rebuild("<Address><Zip> </Zip></Address>", "Address", false);
        assert_eq!(dropped.children[0].text, None);

        let kept = rebuild("<Address><Zip> </Zip></Address>", "Address", true);
        assert_eq!(kept.children[0].text.as_deref(), Some(" "));
    }

    #[test]
    fn test_mixed_content_not_modelled() {
        let node = rebuild("<p>lead<b>bold</b>tail</p>", "p", false);
        assert_eq!(node.text.as_deref(), Some("lead"));
        assert_eq!(node.children.len(), 1);
        // Text is only written for childless nodes
        assert_eq!(compact(&node), "<?xml version=\"1.0\" encoding=\"UTF-8\"?><p><b>bold</b></p>");
    }

    #[test]
    fn test_same_name_nested() {
        let node = rebuild("<x><x>nested</x></x>", "x", false);
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].text.as_deref(), Some("nested"));
    }

    #[test]
    fn test_cdata_is_text() {
        let node = rebuild("<d><![CDATA[a<b]]></d>", "d", false);
        assert_eq!(node.text.as_deref(), Some("a<b"));
        assert_eq!(compact(&node), "<?xml version=\"1.0\" encoding=\"UTF-8\"?><d>a&lt;b</d>");
    }

    #[test]
    fn test_namespaces_kept() {
        let node = rebuild("<s:e xmlns:s=\"urn:s\"><s:d><s:v>1</s:v></s:d></s:e>", "d", false);
        assert_eq!(node.name, QName::new("s", "d", "urn:s"));
        assert_eq!(
            compact(&node),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><s:d xmlns:s=\"urn:s\"><s:v>1</s:v></s:d>"
        );
    }

    #[test]
    fn test_indented_output() {
        let node = rebuild("<doc><a>1</a><b>2</b></doc>", "doc", false);
        let out = String::from_utf8(serialize_document(&node, OutputEncoding::Utf8, Some(2)).unwrap()).unwrap();
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<doc>\n  <a>1</a>\n  <b>2</b>\n</doc>"
        );
    }
}
