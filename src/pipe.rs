//! Format-Conversion Pipe
//!
//! Copies a whole token stream into a writer. Used to re-encode documents
//! or to feed an `EventStream` into any `StreamWriter`.

use crate::core::encoding::OutputEncoding;
use crate::error::Result;
use crate::reader::stream::{EventStream, StreamOptions};
use crate::writer::dispatch::EventDispatchWriter;
use crate::writer::xml::{StreamWriter, XmlWriter};
use std::io::Read;

/// Drain `stream` into `writer`. Returns the number of tokens copied.
pub fn stream_copy<R: Read, W: StreamWriter>(stream: &mut EventStream<R>, writer: W) -> Result<usize> {
    let mut dispatch = EventDispatchWriter::new(writer);
    let copied = dispatch.drain(stream)?;
    stream.close();
    Ok(copied)
}

/// Parse `reader` and write it back out in the encoding named by `label`
pub fn reserialize<R: Read>(reader: R, label: &str) -> Result<Vec<u8>> {
    let encoding = OutputEncoding::from_label(label)?;
    let mut stream = EventStream::new(reader, StreamOptions::default())?;
    let mut out = Vec::new();
    let copied = stream_copy(&mut stream, XmlWriter::with_encoding(&mut out, encoding))?;
    log::trace!("reserialized {copied} tokens as {}", encoding.label());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::reader::events::XmlToken;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reserialize_utf8() {
        let out = reserialize(&b"<a x='1'><!--c--><b>t&amp;u</b><c/></a>"[..], "UTF-8").unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a x=\"1\"><!--c--><b>t&amp;u</b><c/></a>"
        );
    }

    #[test]
    fn test_reserialize_to_utf16() {
        let out = reserialize(&b"<a>\xc3\xa9</a>"[..], "UTF-16").unwrap();
        assert_eq!(&out[..2], &[0xFE, 0xFF]);

        let mut stream = EventStream::new(&out[..], StreamOptions::default()).unwrap();
        let mut text = String::new();
        while let Some(token) = stream.next_token().unwrap() {
            if let XmlToken::Characters(chars) = token {
                text.push_str(&chars.text);
            }
        }
        assert_eq!(text, "é");
    }

    #[test]
    fn test_reserialize_unknown_encoding() {
        assert!(matches!(
            reserialize(&b"<a/>"[..], "KOI8-R"),
            Err(Error::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_stream_copy_counts_tokens() {
        let mut stream = EventStream::new(&b"<a><b/></a>"[..], StreamOptions::default()).unwrap();
        let mut out = Vec::new();
        let copied = stream_copy(&mut stream, XmlWriter::new(&mut out)).unwrap();
        // StartDocument, a, b, /b, /a, EndDocument
        assert_eq!(copied, 6);
        assert!(stream.is_finished());
    }
}
