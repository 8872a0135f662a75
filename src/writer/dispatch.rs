//! Token Dispatch
//!
//! A static table maps each `TokenKind` to the `StreamWriter` primitive
//! that writes it. Kinds with no writer equivalent have no entry and fail
//! with `UnsupportedTokenKind`.

use super::xml::StreamWriter;
use crate::error::{Error, Result};
use crate::reader::events::{TokenKind, XmlToken};
use crate::reader::stream::EventStream;
use std::io::Read;

/// Writes one token through a writer
pub type Handler = fn(&XmlToken, &mut dyn StreamWriter) -> Result<()>;

/// Indexed by `TokenKind::index()`
static HANDLERS: [Option<Handler>; TokenKind::COUNT] = [
    Some(write_start_document),
    Some(write_end_document),
    Some(write_start_element),
    Some(write_end_element),
    Some(write_characters),
    Some(write_cdata),
    Some(write_comment),
    Some(write_processing_instruction),
    Some(write_entity_reference),
    Some(write_namespace),
    Some(write_attribute),
    Some(write_dtd),
    Some(write_space),
    // EntityDeclaration
    None,
    // NotationDeclaration
    None,
];

/// Write a single token
pub fn write_token(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let kind = token.kind();
    match HANDLERS[kind.index()] {
        Some(handler) => handler(token, writer),
        None => Err(Error::UnsupportedTokenKind(kind)),
    }
}

fn wrong_kind(token: &XmlToken) -> Error {
    Error::UnsupportedTokenKind(token.kind())
}

fn write_start_document(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::StartDocument { version, encoding, .. } = token else {
        return Err(wrong_kind(token));
    };
    writer.write_start_document(version, encoding.as_deref())
}

fn write_end_document(_token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    writer.write_end_document()
}

fn write_start_element(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::StartElement(element) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_start_element(&element.name)?;
    for namespace in &element.namespaces {
        writer.write_namespace(namespace)?;
    }
    for attribute in &element.attributes {
        writer.write_attribute(attribute)?;
    }
    Ok(())
}

fn write_end_element(_token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    writer.write_end_element()
}

fn write_characters(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::Characters(chars) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_characters(&chars.text)
}

fn write_cdata(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::CData(text) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_cdata(text)
}

fn write_comment(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::Comment(text) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_comment(text)
}

fn write_processing_instruction(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::ProcessingInstruction { target, data } = token else {
        return Err(wrong_kind(token));
    };
    writer.write_processing_instruction(target, data)
}

fn write_entity_reference(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::EntityReference { name } = token else {
        return Err(wrong_kind(token));
    };
    writer.write_entity_ref(name)
}

fn write_namespace(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::Namespace(namespace) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_namespace(namespace)
}

fn write_attribute(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::Attribute(attribute) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_attribute(attribute)
}

fn write_dtd(token: &XmlToken, writer: &mut dyn StreamWriter) -> Result<()> {
    let XmlToken::Dtd(dtd) = token else {
        return Err(wrong_kind(token));
    };
    writer.write_dtd(dtd)
}

/// Space carries no content
fn write_space(_token: &XmlToken, _writer: &mut dyn StreamWriter) -> Result<()> {
    Ok(())
}

/// Writes tokens through an owned `StreamWriter`
pub struct EventDispatchWriter<W: StreamWriter> {
    writer: W,
}

impl<W: StreamWriter> EventDispatchWriter<W> {
    pub fn new(writer: W) -> Self {
        EventDispatchWriter { writer }
    }

    /// Write a single token
    pub fn write(&mut self, token: &XmlToken) -> Result<()> {
        write_token(token, &mut self.writer)
    }

    /// Copy every remaining token of `stream` into the writer.
    /// Returns the number of tokens written.
    pub fn drain<R: Read>(&mut self, stream: &mut EventStream<R>) -> Result<usize> {
        let mut written = 0;
        while let Some(token) = stream.next_token()? {
            self.write(&token)?;
            written += 1;
        }
        self.writer.flush()?;
        Ok(written)
    }

    /// Like `drain`, but leaves out StartDocument and EndDocument so the
    /// content can be embedded in a document that is already open
    pub fn drain_fragment<R: Read>(&mut self, stream: &mut EventStream<R>) -> Result<usize> {
        let mut written = 0;
        while let Some(token) = stream.next_token()? {
            if matches!(token, XmlToken::StartDocument { .. } | XmlToken::EndDocument) {
                continue;
            }
            self.write(&token)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::events::{Attribute, Namespace, QName};
    use crate::reader::stream::StreamOptions;
    use crate::writer::xml::XmlWriter;
    use pretty_assertions::assert_eq;

    /// Records every primitive call
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl StreamWriter for Recorder {
        fn write_start_document(&mut self, version: &str, _encoding: Option<&str>) -> Result<()> {
            self.calls.push(format!("start_document {version}"));
            Ok(())
        }
        fn write_end_document(&mut self) -> Result<()> {
            self.calls.push("end_document".into());
            Ok(())
        }
        fn write_start_element(&mut self, name: &QName) -> Result<()> {
            self.calls.push(format!("start {}", name.qualified()));
            Ok(())
        }
        fn write_namespace(&mut self, namespace: &Namespace) -> Result<()> {
            self.calls.push(format!("ns {}={}", namespace.prefix, namespace.uri));
            Ok(())
        }
        fn write_attribute(&mut self, attribute: &Attribute) -> Result<()> {
            self.calls.push(format!("attr {}={}", attribute.name.qualified(), attribute.value));
            Ok(())
        }
        fn write_end_element(&mut self) -> Result<()> {
            self.calls.push("end".into());
            Ok(())
        }
        fn write_characters(&mut self, text: &str) -> Result<()> {
            self.calls.push(format!("text {text}"));
            Ok(())
        }
        fn write_cdata(&mut self, text: &str) -> Result<()> {
            self.calls.push(format!("cdata {text}"));
            Ok(())
        }
        fn write_comment(&mut self, text: &str) -> Result<()> {
            self.calls.push(format!("comment {text}"));
            Ok(())
        }
        fn write_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
            self.calls.push(format!("pi {target} {data}"));
            Ok(())
        }
        fn write_entity_ref(&mut self, name: &str) -> Result<()> {
            self.calls.push(format!("entity {name}"));
            Ok(())
        }
        fn write_dtd(&mut self, dtd: &str) -> Result<()> {
            self.calls.push(format!("dtd {dtd}"));
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unsupported_kinds_fail() {
        let mut dispatch = EventDispatchWriter::new(Recorder::default());
        let entity = XmlToken::EntityDeclaration {
            name: "e".into(),
            value: "v".into(),
        };
        let notation = XmlToken::NotationDeclaration {
            name: "n".into(),
            public_id: None,
            system_id: Some("n.dtd".into()),
        };
        assert!(matches!(
            dispatch.write(&entity),
            Err(Error::UnsupportedTokenKind(TokenKind::EntityDeclaration))
        ));
        assert!(matches!(
            dispatch.write(&notation),
            Err(Error::UnsupportedTokenKind(TokenKind::NotationDeclaration))
        ));
        assert!(dispatch.get_ref().calls.is_empty());
    }

    #[test]
    fn test_space_is_no_op() {
        let mut dispatch = EventDispatchWriter::new(Recorder::default());
        dispatch.write(&XmlToken::Space("\n  ".into())).unwrap();
        assert!(dispatch.get_ref().calls.is_empty());
    }

    #[test]
    fn test_start_element_order() {
        let mut element = crate::reader::events::StartElement::new(QName::new("p", "a", "urn:p"));
        element.namespaces.push(Namespace::new("p", "urn:p"));
        element.attributes.push(Attribute::new(QName::local("id"), "1"));
        let mut dispatch = EventDispatchWriter::new(Recorder::default());
        dispatch.write(&XmlToken::StartElement(element)).unwrap();
        assert_eq!(dispatch.into_inner().calls, vec!["start p:a", "ns p=urn:p", "attr id=1"]);
    }

    #[test]
    fn test_drain_reserializes() {
        let xml = "<?xml version=\"1.0\"?><a x=\"1\"><!--c--><b>t &amp; u</b><?pi d?></a>";
        let mut stream = EventStream::new(xml.as_bytes(), StreamOptions::default()).unwrap();
        let mut dispatch = EventDispatchWriter::new(XmlWriter::new(Vec::new()));
        dispatch.drain(&mut stream).unwrap();
        let out = String::from_utf8(dispatch.into_inner().into_inner()).unwrap();
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a x=\"1\"><!--c--><b>t &amp; u</b><?pi d?></a>"
        );
    }

    #[test]
    fn test_drain_fragment_skips_document_tokens() {
        let mut stream = EventStream::new(&b"<item>1</item>"[..], StreamOptions::default()).unwrap();
        let mut dispatch = EventDispatchWriter::new(Recorder::default());
        let written = dispatch.drain_fragment(&mut stream).unwrap();
        assert_eq!(written, 3);
        assert_eq!(dispatch.into_inner().calls, vec!["start item", "text 1", "end"]);
    }

    #[test]
    fn test_writer_failure_propagates() {
        let mut dispatch = EventDispatchWriter::new(XmlWriter::new(Vec::new()));
        assert!(matches!(
            dispatch.write(&XmlToken::EndElement(crate::reader::events::EndElement {
                name: QName::local("a")
            })),
            Err(Error::SessionMisuse(_))
        ));
    }
}
