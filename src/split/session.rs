//! Split Sessions
//!
//! A `SplitSession` owns one `EventStream` and yields one standalone
//! document per occurrence of the path's last element. The sequence is
//! lazy and single-use: the stream cannot be rewound, so a session hands
//! out its iterator once.

use super::path::{next_matching, resolve, PathSpec};
use super::subtree::{reconstruct, serialize_document};
use crate::core::encoding::OutputEncoding;
use crate::error::{Error, Result};
use crate::reader::buffered::DEFAULT_BUFFER_SIZE;
use crate::reader::events::StartElement;
use crate::reader::stream::{EventStream, StreamOptions};
use std::io::Read;
use std::sync::Arc;

/// Configuration for a `SplitSession`
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub path: String,
    /// Yield nothing instead of failing when the path is not found
    pub suppress_path_not_found: bool,
    /// Keep whitespace-only text under split elements
    pub preserve_whitespace: bool,
    /// Output encoding; defaults to the source document's encoding.
    ///
    /// Only UTF-8, UTF-16 (BE/LE), ISO-8859-1 and US-ASCII are supported,
    /// both here and as the source's declared encoding. Any other label,
    /// `windows-1252` included, fails with `UnsupportedEncoding`.
    pub encoding: Option<String>,
    pub buffer_size: usize,
    /// Prefix bindings in scope before the document starts
    pub namespaces: Vec<(String, String)>,
    /// Spaces per level when pretty-printing, `None` for compact output
    pub indent: Option<usize>,
}

impl SplitOptions {
    pub fn new(path: impl Into<String>) -> Self {
        SplitOptions {
            path: path.into(),
            suppress_path_not_found: false,
            preserve_whitespace: false,
            encoding: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            namespaces: Vec::new(),
            indent: None,
        }
    }

    pub fn with_suppress_path_not_found(mut self, suppress: bool) -> Self {
        self.suppress_path_not_found = suppress;
        self
    }

    pub fn with_preserve_whitespace(mut self, preserve: bool) -> Self {
        self.preserve_whitespace = preserve;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    pub fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }
}

/// One split-out document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDocument {
    pub bytes: Vec<u8>,
    /// Encoding the bytes are written in, as declared in the document
    pub encoding: String,
}

impl SplitDocument {
    /// The document as text, when written in UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    NotStarted,
    InProgress,
    Exhausted,
}

/// Lazy single-use splitter over one input document
pub struct SplitSession<R: Read> {
    /// None once closed
    stream: Option<EventStream<R>>,
    path: Arc<PathSpec>,
    preserve_whitespace: bool,
    indent: Option<usize>,
    encoding: OutputEncoding,
    /// Local name of the element each document is rooted at
    split_on: Option<String>,
    pending: Option<SplitDocument>,
    state: IterationState,
    iterator_taken: bool,
}

impl<R: Read> SplitSession<R> {
    /// Resolve the path against `reader` and buffer the first document.
    ///
    /// Fails with `PathNotFound` when any segment cannot be matched,
    /// unless `suppress_path_not_found` is set, in which case the session
    /// yields nothing.
    pub fn new(reader: R, options: SplitOptions) -> Result<Self> {
        let path = PathSpec::compile(&options.path)?;
        let stream_options = StreamOptions {
            buffer_size: options.buffer_size,
            namespaces: options.namespaces,
        };
        let mut stream = EventStream::new(reader, stream_options)?;
        let matched = resolve(&mut stream, &path)?;

        // Override, then the source's own encoding (known once the
        // declaration has been read), then UTF-8
        let label = options
            .encoding
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| stream.encoding().to_string());
        let encoding = OutputEncoding::from_label(&label)?;

        let mut session = SplitSession {
            stream: Some(stream),
            path: Arc::clone(&path),
            preserve_whitespace: options.preserve_whitespace,
            indent: options.indent,
            encoding,
            split_on: None,
            pending: None,
            state: IterationState::NotStarted,
            iterator_taken: false,
        };

        match matched {
            Some(start) => {
                log::debug!("split path {} resolved, splitting on <{}>", path.as_str(), path.terminal());
                session.split_on = Some(path.terminal().to_string());
                session.pending = Some(session.build(start)?);
            }
            None if options.suppress_path_not_found => {
                log::debug!("split path {} not found, yielding no documents", path.as_str());
                session.close();
            }
            None => {
                session.close();
                return Err(Error::PathNotFound {
                    path: path.as_str().to_string(),
                });
            }
        }
        Ok(session)
    }

    pub fn path(&self) -> &PathSpec {
        &self.path
    }

    /// Encoding split documents are written in
    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    fn build(&mut self, start: StartElement) -> Result<SplitDocument> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::SessionMisuse("split session is closed"));
        };
        let node = reconstruct(stream, start, self.preserve_whitespace)?;
        let bytes = serialize_document(&node, self.encoding, self.indent)?;
        log::trace!("split document <{}> of {} bytes", node.name.local_name, bytes.len());
        Ok(SplitDocument {
            bytes,
            encoding: self.encoding.label().to_string(),
        })
    }

    /// True when a document is buffered, reading ahead for one if needed
    pub fn has_next(&mut self) -> Result<bool> {
        if self.pending.is_some() {
            self.mark_in_progress();
            return Ok(true);
        }
        let (Some(stream), Some(split_on)) = (self.stream.as_mut(), self.split_on.as_deref()) else {
            self.state = IterationState::Exhausted;
            return Ok(false);
        };
        match next_matching(stream, split_on)? {
            Some(start) => {
                self.pending = Some(self.build(start)?);
                self.mark_in_progress();
                Ok(true)
            }
            None => {
                self.state = IterationState::Exhausted;
                self.close();
                Ok(false)
            }
        }
    }

    /// Take the buffered document. `None` unless `has_next` returned true.
    pub fn next_document(&mut self) -> Option<SplitDocument> {
        self.pending.take()
    }

    /// The session's only iterator. A second call fails with `SessionMisuse`.
    pub fn iterate(&mut self) -> Result<SplitIter<'_, R>> {
        if self.iterator_taken {
            return Err(Error::SessionMisuse("split session has already been iterated"));
        }
        self.iterator_taken = true;
        self.mark_in_progress();
        Ok(SplitIter { session: self })
    }

    fn mark_in_progress(&mut self) {
        if self.state == IterationState::NotStarted {
            self.state = IterationState::InProgress;
        }
    }

    /// Release the stream. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            log::debug!("split session for {} closed", self.path.as_str());
        }
        self.pending = None;
        self.state = IterationState::Exhausted;
    }
}

/// Iterator over the documents of a `SplitSession`
pub struct SplitIter<'a, R: Read> {
    session: &'a mut SplitSession<R>,
}

impl<R: Read> Iterator for SplitIter<'_, R> {
    type Item = Result<SplitDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.session.has_next() {
            Ok(true) => self.session.next_document().map(Ok),
            Ok(false) => None,
            Err(e) => {
                self.session.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENVELOPE: &str = "<envelope><document><nested>1</nested></document><document><nested>2</nested></document></envelope>";
    const DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

    fn split_all(xml: &str, options: SplitOptions) -> Result<Vec<String>> {
        let mut session = SplitSession::new(xml.as_bytes(), options)?;
        session
            .iterate()?
            .map(|doc| doc.map(|d| String::from_utf8(d.bytes).unwrap()))
            .collect()
    }

    #[test]
    fn test_split_envelope() {
        let docs = split_all(ENVELOPE, SplitOptions::new("/envelope/document")).unwrap();
        assert_eq!(
            docs,
            vec![
                format!("{DECL}<document><nested>1</nested></document>"),
                format!("{DECL}<document><nested>2</nested></document>"),
            ]
        );
    }

    #[test]
    fn test_path_not_found() {
        let err = SplitSession::new(ENVELOPE.as_bytes(), SplitOptions::new("/envelope/missing"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::PathNotFound { ref path } if path == "/envelope/missing"));
        assert_eq!(err.to_string(), "could not traverse to /envelope/missing");
    }

    #[test]
    fn test_path_not_found_suppressed() {
        let options = SplitOptions::new("/envelope/missing").with_suppress_path_not_found(true);
        let docs = split_all(ENVELOPE, options).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_iterate_twice_fails() {
        let mut session = SplitSession::new(ENVELOPE.as_bytes(), SplitOptions::new("/envelope/document")).unwrap();
        assert_eq!(session.iterate().unwrap().count(), 2);
        assert!(matches!(session.iterate(), Err(Error::SessionMisuse(_))));

        let mut fresh = SplitSession::new(ENVELOPE.as_bytes(), SplitOptions::new("/envelope/document")).unwrap();
        drop(fresh.iterate().unwrap());
        assert!(matches!(fresh.iterate(), Err(Error::SessionMisuse(_))));
    }

    #[test]
    fn test_has_next_next_document() {
        let mut session = SplitSession::new(ENVELOPE.as_bytes(), SplitOptions::new("envelope/document")).unwrap();
        assert!(session.has_next().unwrap());
        assert!(session.has_next().unwrap());
        assert!(session.next_document().is_some());
        assert!(session.next_document().is_none());
        assert!(session.has_next().unwrap());
        assert!(session.next_document().is_some());
        assert!(!session.has_next().unwrap());
        assert_eq!(session.state(), IterationState::Exhausted);
    }

    #[test]
    fn test_has_next_starts_iteration() {
        let mut session = SplitSession::new(ENVELOPE.as_bytes(), SplitOptions::new("/envelope/document")).unwrap();
        assert_eq!(session.state(), IterationState::NotStarted);
        assert!(session.has_next().unwrap());
        assert_eq!(session.state(), IterationState::InProgress);
        session.next_document().unwrap();
        assert!(session.has_next().unwrap());
        assert_eq!(session.state(), IterationState::InProgress);
    }

    #[test]
    fn test_declared_entities_in_split_documents() {
        let xml = "<!DOCTYPE r [<!ENTITY co \"Acme\">]><r><d a=\"&co;\">x &co; y</d></r>";
        let docs = split_all(xml, SplitOptions::new("/r/d")).unwrap();
        assert_eq!(docs, vec![format!("{DECL}<d a=\"Acme\">x Acme y</d>")]);
    }

    #[test]
    fn test_unsupported_encodings() {
        let xml = "<?xml version=\"1.0\" encoding=\"windows-1252\"?><r><d/></r>";
        let err = SplitSession::new(xml.as_bytes(), SplitOptions::new("/r/d")).err().unwrap();
        assert!(matches!(err, Error::UnsupportedEncoding(ref label) if label == "windows-1252"));

        let options = SplitOptions::new("/envelope/document").with_encoding("windows-1252");
        assert!(matches!(
            SplitSession::new(ENVELOPE.as_bytes(), options),
            Err(Error::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_whitespace_preservation() {
        let xml = "<Addresses><Address><Zip> </Zip></Address></Addresses>";
        let dropped = split_all(xml, SplitOptions::new("/Addresses/Address")).unwrap();
        assert_eq!(dropped, vec![format!("{DECL}<Address><Zip/></Address>")]);

        let kept = split_all(xml, SplitOptions::new("/Addresses/Address").with_preserve_whitespace(true)).unwrap();
        assert_eq!(kept, vec![format!("{DECL}<Address><Zip> </Zip></Address>")]);
    }

    #[test]
    fn test_encoding_resolution() {
        let xml = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r><d>caf\u{e9}</d></r>";
        let mut session = SplitSession::new(xml.as_bytes(), SplitOptions::new("/r/d")).unwrap();
        assert_eq!(session.encoding(), OutputEncoding::Latin1);

        let mut overridden =
            SplitSession::new(xml.as_bytes(), SplitOptions::new("/r/d").with_encoding("UTF-8")).unwrap();
        let doc = overridden.iterate().unwrap().next().unwrap().unwrap();
        assert_eq!(doc.encoding, "UTF-8");
        session.close();
        session.close();
    }

    #[test]
    fn test_malformed_input_surfaces() {
        let xml = "<envelope><document><a></b></document></envelope>";
        assert!(matches!(
            SplitSession::new(xml.as_bytes(), SplitOptions::new("/envelope/a")),
            Err(Error::MalformedInput { .. })
        ));

        let xml = "<envelope><document/><document><x></document>";
        let mut session = SplitSession::new(xml.as_bytes(), SplitOptions::new("/envelope/document")).unwrap();
        let results: Vec<_> = session.iterate().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::MalformedInput { .. })));
    }

    #[test]
    fn test_invalid_path() {
        assert!(matches!(
            SplitSession::new(ENVELOPE.as_bytes(), SplitOptions::new("/envelope/document[1]")),
            Err(Error::InvalidPath(_))
        ));
    }
}
