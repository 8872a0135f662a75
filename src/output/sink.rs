//! Output Sinks
//!
//! Where an output session's bytes go. A sink is opened once when the
//! session starts and closed once when the session closes.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Destination for an output document
pub trait Sink: Send {
    /// Open the byte stream the document is written to
    fn open(&mut self) -> io::Result<Box<dyn Write + Send>>;

    /// Release anything held after the writer has been dropped
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes to a file, created or truncated on open
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSink { path: path.into() }
    }
}

impl Sink for FileSink {
    fn open(&mut self) -> io::Result<Box<dyn Write + Send>> {
        let file = File::create(&self.path)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Collects the document in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }
}

impl Sink for MemorySink {
    fn open(&mut self) -> io::Result<Box<dyn Write + Send>> {
        self.buffer.lock().clear();
        Ok(Box::new(SharedBuffer(Arc::clone(&self.buffer))))
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_buffer() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        let mut out = handle.open().unwrap();
        out.write_all(b"<a/>").unwrap();
        assert_eq!(sink.contents(), b"<a/>");
    }

    #[test]
    fn test_file_sink_missing_directory() {
        let mut sink = FileSink::new("/nonexistent-dir/for/output.xml");
        assert!(sink.open().is_err());
    }
}
