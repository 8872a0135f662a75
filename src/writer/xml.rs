//! Streaming XML Writer
//!
//! `StreamWriter` is the low-level writing seam the dispatch table and the
//! output sessions drive. `XmlWriter` implements it over any `io::Write`,
//! encoding output on the way out.
//!
//! The writer keeps a start tag open until something other than a
//! namespace or attribute is written, so an element closed immediately is
//! written as `<name/>`. Prefixed names whose namespace is not in scope are
//! declared on the element automatically.

use crate::core::encoding::OutputEncoding;
use crate::core::entities::{escape_attribute, escape_text};
use crate::error::{Error, Result};
use crate::reader::events::{Attribute, Namespace, QName};
use crate::reader::stream::XML_NAMESPACE;
use std::io::Write;

/// Low-level streaming writer primitives
pub trait StreamWriter {
    fn write_start_document(&mut self, version: &str, encoding: Option<&str>) -> Result<()>;
    fn write_end_document(&mut self) -> Result<()>;
    fn write_start_element(&mut self, name: &QName) -> Result<()>;
    /// Declare a namespace on the element just started
    fn write_namespace(&mut self, namespace: &Namespace) -> Result<()>;
    /// Add an attribute to the element just started
    fn write_attribute(&mut self, attribute: &Attribute) -> Result<()>;
    fn write_end_element(&mut self) -> Result<()>;
    fn write_characters(&mut self, text: &str) -> Result<()>;
    fn write_cdata(&mut self, text: &str) -> Result<()>;
    fn write_comment(&mut self, text: &str) -> Result<()>;
    fn write_processing_instruction(&mut self, target: &str, data: &str) -> Result<()>;
    fn write_entity_ref(&mut self, name: &str) -> Result<()>;
    fn write_dtd(&mut self, dtd: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

impl<T: StreamWriter + ?Sized> StreamWriter for &mut T {
    fn write_start_document(&mut self, version: &str, encoding: Option<&str>) -> Result<()> {
        (**self).write_start_document(version, encoding)
    }
    fn write_end_document(&mut self) -> Result<()> {
        (**self).write_end_document()
    }
    fn write_start_element(&mut self, name: &QName) -> Result<()> {
        (**self).write_start_element(name)
    }
    fn write_namespace(&mut self, namespace: &Namespace) -> Result<()> {
        (**self).write_namespace(namespace)
    }
    fn write_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        (**self).write_attribute(attribute)
    }
    fn write_end_element(&mut self) -> Result<()> {
        (**self).write_end_element()
    }
    fn write_characters(&mut self, text: &str) -> Result<()> {
        (**self).write_characters(text)
    }
    fn write_cdata(&mut self, text: &str) -> Result<()> {
        (**self).write_cdata(text)
    }
    fn write_comment(&mut self, text: &str) -> Result<()> {
        (**self).write_comment(text)
    }
    fn write_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        (**self).write_processing_instruction(target, data)
    }
    fn write_entity_ref(&mut self, name: &str) -> Result<()> {
        (**self).write_entity_ref(name)
    }
    fn write_dtd(&mut self, dtd: &str) -> Result<()> {
        (**self).write_dtd(dtd)
    }
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum State {
    Empty,
    Document,
    /// Start tag written, `>` not yet
    Attributes,
    Finished,
}

#[derive(Debug)]
struct DepthData {
    name: QName,
    /// Namespace binding count to restore on close
    scope: usize,
    has_children: bool,
    has_text: bool,
}

/// XML implementation of `StreamWriter`
pub struct XmlWriter<W: Write> {
    out: W,
    encoding: OutputEncoding,
    indent: Option<usize>,
    state: State,
    depth_stack: Vec<DepthData>,
    bindings: Vec<(String, String)>,
    scratch: Vec<u8>,
}

impl<W: Write> XmlWriter<W> {
    /// Compact UTF-8 writer
    pub fn new(out: W) -> Self {
        Self::with_encoding(out, OutputEncoding::Utf8)
    }

    pub fn with_encoding(out: W, encoding: OutputEncoding) -> Self {
        XmlWriter {
            out,
            encoding,
            indent: None,
            state: State::Empty,
            depth_stack: Vec::new(),
            bindings: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Pretty-print element children with `spaces` per level
    pub fn with_indent(mut self, spaces: Option<usize>) -> Self {
        self.indent = spaces;
        self
    }

    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.depth_stack.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write `s` without escaping. Unrepresentable characters fail.
    fn put(&mut self, s: &str) -> Result<()> {
        self.scratch.clear();
        self.encoding.encode_into(s, false, &mut self.scratch)?;
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    /// Write already-escaped character data, using character references
    /// for anything the encoding cannot hold
    fn put_escaped(&mut self, s: &str) -> Result<()> {
        self.scratch.clear();
        self.encoding.encode_into(s, true, &mut self.scratch)?;
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn declare(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() {
            self.put(" xmlns=\"")?;
        } else {
            self.put(" xmlns:")?;
            self.put(prefix)?;
            self.put("=\"")?;
        }
        self.put_escaped(&escape_attribute(uri))?;
        self.put("\"")?;
        self.bindings.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    /// Declare `prefix` unless it is already bound to `uri`
    fn ensure_bound(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix == "xml" {
            return Ok(());
        }
        let bound = self.lookup(prefix).unwrap_or("");
        if bound == uri || (!prefix.is_empty() && uri.is_empty()) {
            return Ok(());
        }
        self.declare(prefix, uri)
    }

    /// Finish an open start tag with `>`
    fn close_start_tag(&mut self) -> Result<()> {
        if self.state != State::Attributes {
            return Ok(());
        }
        if let Some(top) = self.depth_stack.last() {
            let (prefix, uri) = (top.name.prefix.clone(), top.name.namespace_uri.clone());
            self.ensure_bound(&prefix, &uri)?;
        }
        self.put(">")?;
        self.state = State::Document;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.state == State::Finished {
            return Err(Error::SessionMisuse("document already ended"));
        }
        Ok(())
    }

    /// Line break and indentation before a child node, when pretty-printing
    fn write_node_indent(&mut self, level: usize) -> Result<()> {
        let Some(spaces) = self.indent else {
            return Ok(());
        };
        if self.depth_stack.last().is_some_and(|d| d.has_text) {
            return Ok(());
        }
        if self.state == State::Empty {
            return Ok(());
        }
        let line = format!("\n{}", " ".repeat(spaces * level));
        self.put(&line)
    }

    fn mark_child(&mut self) {
        if let Some(top) = self.depth_stack.last_mut() {
            top.has_children = true;
        }
    }

    fn mark_text(&mut self) {
        if let Some(top) = self.depth_stack.last_mut() {
            top.has_text = true;
        }
    }
}

impl<W: Write> StreamWriter for XmlWriter<W> {
    fn write_start_document(&mut self, version: &str, _encoding: Option<&str>) -> Result<()> {
        if self.state != State::Empty {
            return Err(Error::SessionMisuse("document already started"));
        }
        // The declared encoding is always the one actually written
        self.out.write_all(self.encoding.bom())?;
        let decl = format!("<?xml version=\"{}\" encoding=\"{}\"?>", version, self.encoding.label());
        self.put(&decl)?;
        self.state = State::Document;
        Ok(())
    }

    fn write_end_document(&mut self) -> Result<()> {
        self.check_open()?;
        while !self.depth_stack.is_empty() {
            self.write_end_element()?;
        }
        self.state = State::Finished;
        self.flush()
    }

    fn write_start_element(&mut self, name: &QName) -> Result<()> {
        self.check_open()?;
        self.close_start_tag()?;
        self.write_node_indent(self.depth_stack.len())?;
        self.mark_child();

        self.put("<")?;
        self.put(&name.qualified())?;
        self.depth_stack.push(DepthData {
            name: name.clone(),
            scope: self.bindings.len(),
            has_children: false,
            has_text: false,
        });
        self.state = State::Attributes;
        Ok(())
    }

    fn write_namespace(&mut self, namespace: &Namespace) -> Result<()> {
        if self.state != State::Attributes {
            return Err(Error::SessionMisuse("namespace written outside a start tag"));
        }
        if self.lookup(&namespace.prefix) == Some(namespace.uri.as_str()) {
            return Ok(());
        }
        self.declare(&namespace.prefix, &namespace.uri)
    }

    fn write_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        if self.state != State::Attributes {
            return Err(Error::SessionMisuse("attribute written outside a start tag"));
        }
        let name = &attribute.name;
        if !name.prefix.is_empty() {
            self.ensure_bound(&name.prefix, &name.namespace_uri)?;
        }
        self.put(" ")?;
        self.put(&name.qualified())?;
        self.put("=\"")?;
        self.put_escaped(&escape_attribute(&attribute.value))?;
        self.put("\"")
    }

    fn write_end_element(&mut self) -> Result<()> {
        self.check_open()?;
        let Some(top) = self.depth_stack.last() else {
            return Err(Error::SessionMisuse("no open element to end"));
        };
        if self.state == State::Attributes {
            let (prefix, uri) = (top.name.prefix.clone(), top.name.namespace_uri.clone());
            self.ensure_bound(&prefix, &uri)?;
            self.put("/>")?;
            self.state = State::Document;
        } else {
            let qualified = top.name.qualified();
            if top.has_children && !top.has_text {
                self.write_node_indent(self.depth_stack.len() - 1)?;
            }
            self.put("</")?;
            self.put(&qualified)?;
            self.put(">")?;
        }
        if let Some(closed) = self.depth_stack.pop() {
            self.bindings.truncate(closed.scope);
        }
        Ok(())
    }

    fn write_characters(&mut self, text: &str) -> Result<()> {
        self.check_open()?;
        self.close_start_tag()?;
        self.mark_text();
        self.put_escaped(&escape_text(text))
    }

    fn write_cdata(&mut self, text: &str) -> Result<()> {
        self.check_open()?;
        self.close_start_tag()?;
        self.mark_text();
        self.put("<![CDATA[")?;
        self.put(&text.replace("]]>", "]]]]><![CDATA[>"))?;
        self.put("]]>")
    }

    fn write_comment(&mut self, text: &str) -> Result<()> {
        self.check_open()?;
        self.close_start_tag()?;
        self.write_node_indent(self.depth_stack.len())?;
        self.mark_child();
        self.put("<!--")?;
        self.put(text)?;
        self.put("-->")
    }

    fn write_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.check_open()?;
        self.close_start_tag()?;
        self.write_node_indent(self.depth_stack.len())?;
        self.mark_child();
        self.put("<?")?;
        self.put(target)?;
        if !data.is_empty() {
            self.put(" ")?;
            self.put(data)?;
        }
        self.put("?>")
    }

    fn write_entity_ref(&mut self, name: &str) -> Result<()> {
        self.check_open()?;
        self.close_start_tag()?;
        self.mark_text();
        self.put("&")?;
        self.put(name)?;
        self.put(";")
    }

    fn write_dtd(&mut self, dtd: &str) -> Result<()> {
        self.check_open()?;
        if !self.depth_stack.is_empty() {
            return Err(Error::SessionMisuse("DOCTYPE written inside an element"));
        }
        self.write_node_indent(0)?;
        self.put(dtd)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
