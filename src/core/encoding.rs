//! XML Encoding Detection and Conversion
//!
//! Handles detection of the input encoding based on BOM and XML declaration,
//! converts non-UTF-8 input to UTF-8 as it is read, and encodes output text
//! into the requested output encoding.

use crate::error::{Error, Result};
use std::io::{self, Read};

/// Chunk read from the underlying source per decode step
const DECODE_CHUNK: usize = 4096;

/// Encoding of an input document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl InputEncoding {
    /// Detect encoding from byte order mark, initial bytes, or the
    /// `encoding` pseudo-attribute of the XML declaration.
    ///
    /// Returns the encoding and the length of the BOM to skip.
    pub fn detect(input: &[u8]) -> Result<(Self, usize)> {
        match input {
            [0xEF, 0xBB, 0xBF, ..] => return Ok((InputEncoding::Utf8, 3)),
            // UTF-16 LE BOM: 0xFF 0xFE
            [0xFF, 0xFE, ..] => return Ok((InputEncoding::Utf16Le, 2)),
            // UTF-16 BE BOM: 0xFE 0xFF
            [0xFE, 0xFF, ..] => return Ok((InputEncoding::Utf16Be, 2)),
            // No BOM - check for UTF-16 pattern (< followed by null or null followed by <)
            [0x00, b'<', ..] => return Ok((InputEncoding::Utf16Be, 0)),
            [b'<', 0x00, ..] => return Ok((InputEncoding::Utf16Le, 0)),
            _ => {}
        }
        match sniff_declared_encoding(input) {
            Some(label) => Ok((Self::from_label(label)?, 0)),
            None => Ok((InputEncoding::Utf8, 0)),
        }
    }

    /// Map a declared label onto a decoder. UTF-16 labels in a byte
    /// stream without a BOM or NUL pattern are read as 8-bit UTF-8.
    pub fn from_label(label: &str) -> Result<Self> {
        match normalize_label(label).as_str() {
            "UTF-8" | "UTF8" | "UTF-16" | "UTF-16LE" | "UTF-16BE" => Ok(InputEncoding::Utf8),
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" | "L1" => Ok(InputEncoding::Latin1),
            "US-ASCII" | "ASCII" => Ok(InputEncoding::Ascii),
            _ => Err(Error::UnsupportedEncoding(label.to_string())),
        }
    }

    /// Canonical label
    pub fn label(self) -> &'static str {
        match self {
            InputEncoding::Utf8 => "UTF-8",
            InputEncoding::Utf16Le => "UTF-16LE",
            InputEncoding::Utf16Be => "UTF-16BE",
            InputEncoding::Latin1 => "ISO-8859-1",
            InputEncoding::Ascii => "US-ASCII",
        }
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_uppercase().replace('_', "-")
}

/// Pull the `encoding` value out of a leading `<?xml ...?>` in an 8-bit prefix
fn sniff_declared_encoding(prefix: &[u8]) -> Option<&str> {
    if !prefix.starts_with(b"<?xml") {
        return None;
    }
    let end = memchr::memmem::find(prefix, b"?>")?;
    let decl = &prefix[5..end];
    let at = memchr::memmem::find(decl, b"encoding")?;
    let rest = &decl[at + 8..];
    let eq = rest.iter().position(|&b| b == b'=')?;
    let rest = &rest[eq + 1..];
    let open = rest.iter().position(|&b| b == b'"' || b == b'\'')?;
    let quote = rest[open];
    let value = &rest[open + 1..];
    let close = value.iter().position(|&b| b == quote)?;
    std::str::from_utf8(&value[..close]).ok()
}

/// Read adapter producing UTF-8 from a source in another encoding
pub struct DecodingReader<R: Read> {
    inner: R,
    encoding: InputEncoding,
    /// Undecoded source bytes, at most one incomplete code unit or pair
    raw: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    eof: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: InputEncoding) -> Self {
        DecodingReader {
            inner,
            encoding,
            raw: Vec::new(),
            out: Vec::new(),
            out_pos: 0,
            eof: false,
        }
    }

    pub fn encoding(&self) -> InputEncoding {
        self.encoding
    }

    fn decode_more(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; DECODE_CHUNK];
        let read = self.inner.read(&mut chunk)?;
        self.out.clear();
        self.out_pos = 0;
        if read == 0 {
            self.eof = true;
            if !self.raw.is_empty() {
                return Err(invalid_data("input ends inside a character"));
            }
            return Ok(());
        }
        self.raw.extend_from_slice(&chunk[..read]);

        match self.encoding {
            InputEncoding::Utf8 => {
                self.out.append(&mut self.raw);
            }
            InputEncoding::Latin1 => {
                let decoded: String = self.raw.drain(..).map(char::from).collect();
                self.out.extend_from_slice(decoded.as_bytes());
            }
            InputEncoding::Ascii => {
                if let Some(bad) = self.raw.iter().find(|b| !b.is_ascii()) {
                    return Err(invalid_data(format!("byte 0x{bad:02X} is not US-ASCII")));
                }
                self.out.append(&mut self.raw);
            }
            InputEncoding::Utf16Le | InputEncoding::Utf16Be => self.decode_utf16()?,
        }
        Ok(())
    }

    fn decode_utf16(&mut self) -> io::Result<()> {
        let big_endian = self.encoding == InputEncoding::Utf16Be;
        let mut units: Vec<u16> = self
            .raw
            .chunks_exact(2)
            .map(|pair| {
                if big_endian {
                    u16::from_be_bytes([pair[0], pair[1]])
                } else {
                    u16::from_le_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        let mut keep = self.raw.len() % 2;
        // A high surrogate waits for its partner in the next chunk
        if matches!(units.last(), Some(0xD800..=0xDBFF)) {
            units.pop();
            keep += 2;
        }
        let tail = self.raw.split_off(self.raw.len() - keep);
        self.raw = tail;

        for c in char::decode_utf16(units) {
            let c = c.map_err(|e| invalid_data(format!("invalid UTF-16: {e}")))?;
            let mut buf = [0u8; 4];
            self.out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.encoding == InputEncoding::Utf8 && self.out_pos >= self.out.len() {
            return self.inner.read(buf);
        }
        while self.out_pos >= self.out.len() {
            if self.eof {
                return Ok(0);
            }
            self.decode_more()?;
        }
        let n = buf.len().min(self.out.len() - self.out_pos);
        buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        Ok(n)
    }
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Encoding of an output document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl OutputEncoding {
    /// Parse an encoding label such as `UTF-8` or `ISO-8859-1`
    pub fn from_label(label: &str) -> Result<Self> {
        match normalize_label(label).as_str() {
            "UTF-8" | "UTF8" => Ok(OutputEncoding::Utf8),
            "UTF-16" | "UTF-16BE" => Ok(OutputEncoding::Utf16Be),
            "UTF-16LE" => Ok(OutputEncoding::Utf16Le),
            "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" | "L1" => Ok(OutputEncoding::Latin1),
            "US-ASCII" | "ASCII" => Ok(OutputEncoding::Ascii),
            _ => Err(Error::UnsupportedEncoding(label.to_string())),
        }
    }

    /// Label written into the XML declaration
    pub fn label(self) -> &'static str {
        match self {
            OutputEncoding::Utf8 => "UTF-8",
            OutputEncoding::Utf16Le => "UTF-16LE",
            OutputEncoding::Utf16Be => "UTF-16",
            OutputEncoding::Latin1 => "ISO-8859-1",
            OutputEncoding::Ascii => "US-ASCII",
        }
    }

    /// Byte order mark to write before the document
    pub fn bom(self) -> &'static [u8] {
        match self {
            OutputEncoding::Utf16Be => &[0xFE, 0xFF],
            OutputEncoding::Utf16Le => &[0xFF, 0xFE],
            _ => &[],
        }
    }

    fn limit(self) -> Option<u32> {
        match self {
            OutputEncoding::Latin1 => Some(0xFF),
            OutputEncoding::Ascii => Some(0x7F),
            _ => None,
        }
    }

    /// Append `text` in this encoding.
    ///
    /// With `char_refs`, characters the encoding cannot represent become
    /// numeric character references; without it they are an error.
    pub fn encode_into(self, text: &str, char_refs: bool, out: &mut Vec<u8>) -> Result<()> {
        match self {
            OutputEncoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            OutputEncoding::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            OutputEncoding::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            OutputEncoding::Latin1 | OutputEncoding::Ascii => {
                let limit = self.limit().unwrap_or(0xFF);
                for c in text.chars() {
                    let cp = c as u32;
                    if cp <= limit {
                        out.push(cp as u8);
                    } else if char_refs {
                        out.extend_from_slice(format!("&#{cp};").as_bytes());
                    } else {
                        return Err(Error::UnsupportedEncoding(format!(
                            "U+{cp:04X} cannot be written in {}",
                            self.label()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8], encoding: InputEncoding) -> io::Result<String> {
        let mut reader = DecodingReader::new(bytes, encoding);
        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_detect_utf8() {
        assert_eq!(InputEncoding::detect(b"<root/>").unwrap(), (InputEncoding::Utf8, 0));
        assert_eq!(InputEncoding::detect(&[0xEF, 0xBB, 0xBF, b'<']).unwrap(), (InputEncoding::Utf8, 3));
    }

    #[test]
    fn test_detect_utf16() {
        assert_eq!(InputEncoding::detect(&[0xFF, 0xFE, b'<', 0x00]).unwrap(), (InputEncoding::Utf16Le, 2));
        assert_eq!(InputEncoding::detect(&[0xFE, 0xFF, 0x00, b'<']).unwrap(), (InputEncoding::Utf16Be, 2));
        assert_eq!(InputEncoding::detect(&[0x00, b'<', 0x00, b'r']).unwrap(), (InputEncoding::Utf16Be, 0));
    }

    #[test]
    fn test_detect_declared() {
        let (enc, bom) = InputEncoding::detect(b"<?xml version=\"1.0\" encoding='ISO-8859-1'?><r/>").unwrap();
        assert_eq!(enc, InputEncoding::Latin1);
        assert_eq!(bom, 0);
        assert!(matches!(
            InputEncoding::detect(b"<?xml version=\"1.0\" encoding=\"EBCDIC\"?><r/>"),
            Err(Error::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_decode_utf16_le() {
        // "<r>é</r>" in UTF-16 LE without BOM
        let units: Vec<u8> = "<r>é</r>".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(decode_all(&units, InputEncoding::Utf16Le).unwrap(), "<r>é</r>");
    }

    #[test]
    fn test_decode_utf16_surrogate_across_chunks() {
        let text = format!("{}😀", "a".repeat(DECODE_CHUNK / 2 - 1));
        let units: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        assert_eq!(decode_all(&units, InputEncoding::Utf16Be).unwrap(), text);
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_all(&[b'<', b'a', b'>', 0xE9, b'<'], InputEncoding::Latin1).unwrap(), "<a>é<");
        assert!(decode_all(&[0xE9], InputEncoding::Ascii).is_err());
    }

    #[test]
    fn test_truncated_utf16_is_error() {
        assert!(decode_all(&[b'<', 0x00, b'r'], InputEncoding::Utf16Le).is_err());
    }

    #[test]
    fn test_output_encoding() {
        assert_eq!(OutputEncoding::from_label("utf-8").unwrap(), OutputEncoding::Utf8);
        assert_eq!(OutputEncoding::from_label("latin1").unwrap(), OutputEncoding::Latin1);
        assert!(matches!(OutputEncoding::from_label("KOI8-R"), Err(Error::UnsupportedEncoding(_))));

        let mut out = Vec::new();
        OutputEncoding::Ascii.encode_into("é!", true, &mut out).unwrap();
        assert_eq!(out, b"&#233;!");
        assert!(OutputEncoding::Ascii.encode_into("é", false, &mut Vec::new()).is_err());

        let mut out = Vec::new();
        OutputEncoding::Utf16Be.encode_into("<a", false, &mut out).unwrap();
        assert_eq!(out, vec![0x00, b'<', 0x00, b'a']);
    }
}
