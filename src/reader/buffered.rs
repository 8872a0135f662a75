//! Buffered XML Reader
//!
//! Reads XML from any source implementing Read trait, using an internal
//! buffer as the tokenizer's window. The buffer grows when a single token
//! does not fit, so its configured size is a starting capacity rather
//! than a limit on token length.

use std::io::Read;

/// Buffer size for reading chunks
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Buffered XML reader for streaming input
pub struct BufferedReader<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    pos: usize,
    end: usize,
    eof: bool,
    /// Bytes consumed before the current window
    consumed: usize,
}

impl<R: Read> BufferedReader<R> {
    /// Create a new buffered reader
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new buffered reader with specified buffer capacity
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        BufferedReader {
            reader,
            buffer: vec![0u8; capacity.max(16)],
            pos: 0,
            end: 0,
            eof: false,
            consumed: 0,
        }
    }

    /// Fill the buffer from the reader.
    ///
    /// Returns false once the source is exhausted.
    pub fn fill_buffer(&mut self) -> std::io::Result<bool> {
        if self.eof {
            return Ok(false);
        }

        // Compact: move remaining data to start
        if self.pos > 0 {
            let remaining = self.end - self.pos;
            if remaining > 0 {
                self.buffer.copy_within(self.pos..self.end, 0);
            }
            self.end = remaining;
            self.pos = 0;
        }

        // Window is full of one unfinished token
        if self.end == self.buffer.len() {
            let grown = self.buffer.len() * 2;
            self.buffer.resize(grown, 0);
        }

        // Read more data
        let read = loop {
            match self.reader.read(&mut self.buffer[self.end..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if read == 0 {
            self.eof = true;
            Ok(false)
        } else {
            self.end += read;
            Ok(true)
        }
    }

    /// Get current buffered data as a slice
    pub fn buffered(&self) -> &[u8] {
        &self.buffer[self.pos..self.end]
    }

    /// True once the source has reported end of input
    pub fn source_exhausted(&self) -> bool {
        self.eof
    }

    /// Check if we've reached end of input
    pub fn is_eof(&self) -> bool {
        self.eof && self.pos >= self.end
    }

    /// Consume n bytes from the buffer
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.end - self.pos);
        self.pos += n;
        self.consumed += n;
    }

    /// Absolute offset of the start of the current window
    pub fn offset(&self) -> usize {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_buffered_reader() {
        let data = b"<root>content</root>";
        let cursor = Cursor::new(data.to_vec());
        let mut reader = BufferedReader::new(cursor);

        reader.fill_buffer().unwrap();
        assert_eq!(reader.buffered(), data);
        assert!(!reader.fill_buffer().unwrap());
        assert!(reader.source_exhausted());
    }

    #[test]
    fn test_consume_tracks_offset() {
        let mut reader = BufferedReader::new(Cursor::new(b"<a><b/></a>".to_vec()));
        reader.fill_buffer().unwrap();
        reader.consume(3);
        assert_eq!(reader.buffered(), b"<b/></a>");
        assert_eq!(reader.offset(), 3);
    }

    #[test]
    fn test_grows_when_full() {
        let data = vec![b'x'; 100];
        let mut reader = BufferedReader::with_capacity(Cursor::new(data.clone()), 16);
        while reader.fill_buffer().unwrap() {}
        assert_eq!(reader.buffered(), &data[..]);
        assert!(!reader.is_eof());
        reader.consume(100);
        assert!(reader.is_eof());
    }
}
