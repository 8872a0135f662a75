//! Output Sessions
//!
//! One XML document assembled over many calls. `start` writes the
//! declaration and the root start tag, any number of callers then take
//! turns writing inside the root, and `finish` closes the root.
//!
//! Access to the writer goes through a `FairLock`. `acquire_writer` hands
//! out the writer and leaves the lock held until `release_lock` is called
//! from the same thread, so a caller can keep the writer across work the
//! session knows nothing about. `writer` wraps the same pair in a guard
//! that releases on drop.

use crate::core::encoding::OutputEncoding;
use crate::error::{Error, Result};
use crate::output::lock::FairLock;
use crate::output::sink::Sink;
use crate::reader::events::{Attribute, Namespace, QName};
use crate::reader::stream::{EventStream, StreamOptions};
use crate::writer::dispatch::EventDispatchWriter;
use crate::writer::xml::{StreamWriter, XmlWriter};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_ENCODING: &str = "UTF-8";
const DEFAULT_ROOT: &str = "root";

/// Writer type held by a session
pub type SessionWriter = XmlWriter<Box<dyn Write + Send>>;

/// Document settings for an output session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub encoding: String,
    pub root_element: String,
    pub prefix: String,
    pub namespace_uri: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            encoding: DEFAULT_ENCODING.to_string(),
            root_element: DEFAULT_ROOT.to_string(),
            prefix: String::new(),
            namespace_uri: String::new(),
        }
    }
}

impl OutputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_root_element(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.root_element = if name.is_empty() { DEFAULT_ROOT.to_string() } else { name };
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_namespace_uri(mut self, uri: impl Into<String>) -> Self {
        self.namespace_uri = uri.into();
        self
    }
}

/// Lifecycle of an output session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Finished,
    Closed,
}

struct Slot {
    state: SessionState,
    writer: Option<SessionWriter>,
    sink: Option<Box<dyn Sink>>,
}

/// Incrementally written document shared between callers
pub struct OutputSession {
    encoding: OutputEncoding,
    label: String,
    root: QName,
    lock: Arc<FairLock>,
    slot: Arc<Mutex<Slot>>,
    closed: AtomicBool,
}

impl OutputSession {
    pub fn new(options: OutputOptions) -> Result<Self> {
        let label = options.encoding.trim();
        if label.is_empty() {
            return Err(Error::UnsupportedEncoding(options.encoding));
        }
        let encoding = OutputEncoding::from_label(label)?;
        let local = if options.root_element.is_empty() {
            DEFAULT_ROOT.to_string()
        } else {
            options.root_element
        };

        Ok(OutputSession {
            encoding,
            label: encoding.label().to_string(),
            root: QName::new(options.prefix, local, options.namespace_uri),
            lock: Arc::new(FairLock::new()),
            slot: Arc::new(Mutex::new(Slot {
                state: SessionState::Unopened,
                writer: None,
                sink: None,
            })),
            closed: AtomicBool::new(false),
        })
    }

    /// Label written into the XML declaration
    pub fn encoding(&self) -> &str {
        &self.label
    }

    pub fn output_encoding(&self) -> OutputEncoding {
        self.encoding
    }

    pub fn root(&self) -> &QName {
        &self.root
    }

    pub fn state(&self) -> SessionState {
        if self.closed.load(Ordering::Acquire) {
            return SessionState::Closed;
        }
        self.slot.lock().state
    }

    fn check_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SessionMisuse("session is closed"));
        }
        Ok(())
    }

    /// Run `f` on the slot while holding the session lock
    fn locked<T>(&self, f: impl FnOnce(&mut Slot) -> Result<T>) -> Result<T> {
        self.check_not_closed()?;
        self.lock.lock()?;
        let result = f(&mut self.slot.lock());
        self.lock.release();
        result
    }

    /// Open `sink` and write the document start and the root start tag.
    /// On failure the session stays unopened.
    pub fn start(&self, sink: impl Sink + 'static) -> Result<()> {
        let mut sink: Box<dyn Sink> = Box::new(sink);
        self.locked(|slot| {
            if slot.state != SessionState::Unopened {
                return Err(Error::SessionMisuse("session already started"));
            }
            let out = sink.open()?;
            let mut writer = XmlWriter::with_encoding(out, self.encoding);
            writer.write_start_document("1.0", Some(self.label.as_str()))?;
            writer.write_start_element(&self.root)?;
            if !self.root.namespace_uri.is_empty() {
                writer.write_namespace(&Namespace::new(
                    self.root.prefix.as_str(),
                    self.root.namespace_uri.as_str(),
                ))?;
            }
            writer.flush()?;

            slot.writer = Some(writer);
            slot.sink = Some(sink);
            slot.state = SessionState::Open;
            log::debug!("output session started with root <{}>", self.root.qualified());
            Ok(())
        })
    }

    /// Take the lock and return the writer. The lock stays held until
    /// `release_lock` is called on this thread.
    pub fn acquire_writer(&self) -> Result<WriterHandle> {
        self.check_not_closed()?;
        self.lock.lock()?;
        if self.slot.lock().state != SessionState::Open {
            self.lock.release();
            return Err(Error::SessionMisuse("writer not started"));
        }
        Ok(WriterHandle {
            slot: Arc::clone(&self.slot),
            lock: Arc::clone(&self.lock),
        })
    }

    /// Release the lock taken by `acquire_writer`. Calling it again, or
    /// from a thread that does not hold the lock, does nothing.
    pub fn release_lock(&self) {
        if !self.lock.release() {
            log::trace!("release_lock called without holding the output lock");
        }
    }

    /// Acquire the writer behind a guard that releases the lock on drop
    pub fn writer(&self) -> Result<WriterGuard<'_>> {
        let handle = self.acquire_writer()?;
        Ok(WriterGuard { handle, lock: &*self.lock })
    }

    /// Copy every token of the document in `reader`, except its start and
    /// end, into the root element. Returns the number of tokens written.
    pub fn write_fragment<R: Read>(&self, reader: R) -> Result<usize> {
        let mut stream = EventStream::new(reader, StreamOptions::default())?;
        let mut guard = self.writer()?;
        let mut dispatch = EventDispatchWriter::new(&mut *guard);
        let written = dispatch.drain_fragment(&mut stream)?;
        dispatch.get_mut().flush()?;
        log::trace!("wrote fragment of {written} tokens");
        Ok(written)
    }

    /// Close the root element and end the document
    pub fn finish(&self) -> Result<()> {
        self.locked(|slot| {
            if slot.state != SessionState::Open {
                return Err(Error::SessionMisuse("session is not open"));
            }
            let writer = slot
                .writer
                .as_mut()
                .ok_or(Error::SessionMisuse("writer not started"))?;
            if writer.depth() > 0 {
                writer.write_end_element()?;
            }
            writer.write_end_document()?;
            slot.state = SessionState::Finished;
            log::debug!("output session finished");
            Ok(())
        })
    }

    /// Release the writer and the sink. Failures are logged, never
    /// returned, and a second call does nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.lock.interrupt();

        let mut slot = self.slot.lock();
        if let Some(mut writer) = slot.writer.take() {
            if let Err(err) = writer.get_mut().flush() {
                let err = Error::ResourceCloseFailure {
                    resource: "writer",
                    source: err,
                };
                log::warn!("{err}");
            }
        }
        if let Some(mut sink) = slot.sink.take() {
            if let Err(err) = sink.close() {
                let err = Error::ResourceCloseFailure {
                    resource: "sink",
                    source: err,
                };
                log::warn!("{err}");
            }
        }
        slot.state = SessionState::Closed;
        log::debug!("output session closed");
    }

    /// `finish`, then `close` whatever `finish` returned
    pub fn finish_and_close(&self) -> Result<()> {
        let result = self.finish();
        self.close();
        result
    }
}

/// Live writer of an open session. Holding it does not release the
/// session lock; pair it with `OutputSession::release_lock`. Writes fail
/// with `SessionMisuse` once the lock has been released or the session
/// has been closed.
pub struct WriterHandle {
    slot: Arc<Mutex<Slot>>,
    lock: Arc<FairLock>,
}

impl WriterHandle {
    /// Run `f` against the session's writer
    pub fn with_writer<T>(&mut self, f: impl FnOnce(&mut SessionWriter) -> Result<T>) -> Result<T> {
        if !self.lock.is_held_by_current_thread() {
            return Err(Error::SessionMisuse("output lock not held"));
        }
        let mut slot = self.slot.lock();
        let writer = slot
            .writer
            .as_mut()
            .ok_or(Error::SessionMisuse("writer not started"))?;
        f(writer)
    }

    /// Convenience for the common case of a single text element
    pub fn write_text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.with_writer(|writer| {
            writer.write_start_element(&QName::local(name))?;
            writer.write_characters(text)?;
            writer.write_end_element()
        })
    }
}

impl StreamWriter for WriterHandle {
    fn write_start_document(&mut self, version: &str, encoding: Option<&str>) -> Result<()> {
        self.with_writer(|w| w.write_start_document(version, encoding))
    }
    fn write_end_document(&mut self) -> Result<()> {
        self.with_writer(|w| w.write_end_document())
    }
    fn write_start_element(&mut self, name: &QName) -> Result<()> {
        self.with_writer(|w| w.write_start_element(name))
    }
    fn write_namespace(&mut self, namespace: &Namespace) -> Result<()> {
        self.with_writer(|w| w.write_namespace(namespace))
    }
    fn write_attribute(&mut self, attribute: &Attribute) -> Result<()> {
        self.with_writer(|w| w.write_attribute(attribute))
    }
    fn write_end_element(&mut self) -> Result<()> {
        self.with_writer(|w| w.write_end_element())
    }
    fn write_characters(&mut self, text: &str) -> Result<()> {
        self.with_writer(|w| w.write_characters(text))
    }
    fn write_cdata(&mut self, text: &str) -> Result<()> {
        self.with_writer(|w| w.write_cdata(text))
    }
    fn write_comment(&mut self, text: &str) -> Result<()> {
        self.with_writer(|w| w.write_comment(text))
    }
    fn write_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.with_writer(|w| w.write_processing_instruction(target, data))
    }
    fn write_entity_ref(&mut self, name: &str) -> Result<()> {
        self.with_writer(|w| w.write_entity_ref(name))
    }
    fn write_dtd(&mut self, dtd: &str) -> Result<()> {
        self.with_writer(|w| w.write_dtd(dtd))
    }
    fn flush(&mut self) -> Result<()> {
        self.with_writer(|w| w.flush())
    }
}

/// Writer handle that releases the session lock when dropped
pub struct WriterGuard<'a> {
    handle: WriterHandle,
    lock: &'a FairLock,
}

impl Deref for WriterGuard<'_> {
    type Target = WriterHandle;

    fn deref(&self) -> &WriterHandle {
        &self.handle
    }
}

impl DerefMut for WriterGuard<'_> {
    fn deref_mut(&mut self) -> &mut WriterHandle {
        &mut self.handle
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
