//! Split Paths and Path Matching
//!
//! A path is a `/`-separated list of element local names. Matching is a
//! flat forward scan: each segment is the next StartElement with that
//! local name anywhere after the previous match, whether or not it is a
//! descendant of it. `/a/b` will match a `b` that follows `a` as a sibling
//! or sits under some unrelated element. Callers with repeated names must
//! choose paths that avoid the ambiguity.

use crate::error::{Error, Result};
use crate::reader::events::{StartElement, XmlToken};
use crate::reader::stream::{EventStream, StreamOptions};
use lru::LruCache;
use parking_lot::Mutex;
use std::io::Read;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};

/// Compiled paths kept per process
const PATH_CACHE_SIZE: usize = 64;

static PATH_CACHE: LazyLock<Mutex<LruCache<String, Arc<PathSpec>>>> = LazyLock::new(|| {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(PATH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
    ))
});

/// Parsed split path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    raw: String,
    segments: Vec<String>,
}

impl PathSpec {
    /// Parse a path such as `/envelope/document` or `envelope/document`.
    /// One leading and one trailing `/` are allowed.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
        let body = body.strip_suffix('/').unwrap_or(body);
        if body.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }

        let mut segments = Vec::new();
        for segment in body.split('/') {
            if !is_plain_name(segment) {
                return Err(Error::InvalidPath(path.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(PathSpec {
            raw: path.to_string(),
            segments,
        })
    }

    /// Parse through the process-wide cache
    pub fn compile(path: &str) -> Result<Arc<PathSpec>> {
        if let Some(spec) = PATH_CACHE.lock().get(path) {
            return Ok(Arc::clone(spec));
        }
        let spec = Arc::new(PathSpec::parse(path)?);
        PATH_CACHE.lock().put(path.to_string(), Arc::clone(&spec));
        Ok(spec)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Name of the element each split document is rooted at
    pub fn terminal(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn is_plain_name(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment
            .chars()
            .any(|c| matches!(c, '[' | ']' | '*' | '@' | '(' | ')' | ':' | '=') || c.is_whitespace())
}

/// Pull tokens until a StartElement with the given local name, discarding
/// everything before it. `None` when the stream runs out first.
pub fn next_matching<R: Read>(stream: &mut EventStream<R>, local_name: &str) -> Result<Option<StartElement>> {
    while let Some(token) = stream.next_token()? {
        if let XmlToken::StartElement(element) = token {
            if element.local_name() == local_name {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}

/// Match every segment in order. Returns the StartElement for the last
/// segment, or `None` if any segment is not found.
pub fn resolve<R: Read>(stream: &mut EventStream<R>, spec: &PathSpec) -> Result<Option<StartElement>> {
    let mut matched = None;
    for segment in spec.segments() {
        match next_matching(stream, segment)? {
            Some(element) => matched = Some(element),
            None => return Ok(None),
        }
    }
    Ok(matched)
}

/// Local name of the document's first element
pub fn root_element_name<R: Read>(reader: R) -> Result<Option<String>> {
    let mut stream = EventStream::new(reader, StreamOptions::default())?;
    let mut name = None;
    while let Some(token) = stream.next_token()? {
        if let XmlToken::StartElement(element) = token {
            name = Some(element.name.local_name);
            break;
        }
    }
    stream.close();
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(xml: &str) -> EventStream<&[u8]> {
        EventStream::new(xml.as_bytes(), StreamOptions::default()).unwrap()
    }

    #[test]
    fn test_parse() {
        let spec = PathSpec::parse("/envelope/document").unwrap();
        assert_eq!(spec.segments(), ["envelope", "document"]);
        assert_eq!(spec.terminal(), "document");
        assert_eq!(PathSpec::parse("envelope/document").unwrap().segments(), spec.segments());
    }

    #[test]
    fn test_parse_trailing_slash() {
        assert_eq!(PathSpec::parse("/a/b/").unwrap().segments(), ["a", "b"]);
        assert_eq!(PathSpec::parse("a/").unwrap().segments(), ["a"]);
        assert_eq!(PathSpec::parse("/a/b/").unwrap().as_str(), "/a/b/");
    }

    #[test]
    fn test_parse_rejects_non_names() {
        for path in ["", "/", "  ", "/a//b", "/a/b//", "//", "/a[1]", "//a", "/a/*", "/a/@id", "/a/text()", "/child::a", "/p:a"] {
            assert!(matches!(PathSpec::parse(path), Err(Error::InvalidPath(_))), "{path}");
        }
    }

    #[test]
    fn test_compile_is_cached() {
        let first = PathSpec::compile("/cached/path").unwrap();
        let second = PathSpec::compile("/cached/path").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(PathSpec::compile("/bad[").is_err());
    }

    #[test]
    fn test_next_matching_skips_other_tokens() {
        let mut s = stream("<a><!--x--><b id=\"1\"/><c/></a>");
        let found = next_matching(&mut s, "c").unwrap().unwrap();
        assert_eq!(found.local_name(), "c");
        assert!(next_matching(&mut s, "c").unwrap().is_none());
    }

    #[test]
    fn test_resolve_is_flat() {
        // b is a sibling of a, not a child, and still matches /a/b
        let mut s = stream("<r><a/><x><b>hit</b></x></r>");
        let spec = PathSpec::parse("/a/b").unwrap();
        let found = resolve(&mut s, &spec).unwrap().unwrap();
        assert_eq!(found.local_name(), "b");
    }

    #[test]
    fn test_resolve_missing_segment() {
        let mut s = stream("<r><a/></r>");
        let spec = PathSpec::parse("/r/missing").unwrap();
        assert!(resolve(&mut s, &spec).unwrap().is_none());
    }

    #[test]
    fn test_root_element_name() {
        assert_eq!(
            root_element_name(&b"<?xml version=\"1.0\"?><!--c--><p:root xmlns:p=\"urn:p\"/>"[..]).unwrap(),
            Some("root".to_string())
        );
    }
}
