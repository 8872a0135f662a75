//! XML Tokenizer - State machine for XML token extraction
//!
//! Pull-style tokenizer over one buffered window of input. A token that
//! runs past the end of the window is reported as `Step::NeedMore` unless
//! the window is known to be the tail of the input, in which case it is
//! an error. Tokens borrow from the window and must be made owned before
//! the window is advanced.
//!
//! Extracts:
//! - Element start/end/empty tags
//! - Text content (raw, entities untouched)
//! - CDATA sections
//! - Comments
//! - Processing instructions and the XML declaration
//! - DOCTYPE declarations (raw)

use super::scanner::{is_whitespace, Scanner};

/// Type of XML token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Element start tag: <element>
    StartTag,
    /// Element end tag: </element>
    EndTag,
    /// Empty element: <element/>
    EmptyTag,
    /// Text content
    Text,
    /// CDATA section: <![CDATA[...]]>
    CData,
    /// Comment: <!--...-->
    Comment,
    /// Processing instruction: <?target ...?>
    ProcessingInstruction,
    /// XML declaration: <?xml ...?>
    XmlDeclaration,
    /// DOCTYPE declaration
    DocType,
}

/// A parsed XML token
#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Raw span in the window (start, end)
    pub span: (usize, usize),
    /// For tags: the element name. For PIs: the target
    pub name: Option<&'a [u8]>,
    /// For tags: raw attribute text. For everything else: the body
    pub content: Option<&'a [u8]>,
}

impl<'a> Token<'a> {
    fn new(kind: TokenKind, span: (usize, usize)) -> Self {
        Token {
            kind,
            span,
            name: None,
            content: None,
        }
    }

    fn with_name(mut self, name: &'a [u8]) -> Self {
        self.name = Some(name);
        self
    }

    fn with_content(mut self, content: &'a [u8]) -> Self {
        self.content = Some(content);
        self
    }
}

/// Outcome of asking the tokenizer for the next token
#[derive(Debug)]
pub enum Step<'a> {
    Token(Token<'a>),
    /// The window ends inside a token; refill and retry
    NeedMore,
    /// The window is exhausted and no more input follows
    Eof,
}

/// Error for input that cannot be tokenized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// Offset in the window
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

/// XML tokenizer implementing a pull-parser pattern
pub struct Tokenizer<'a> {
    scanner: Scanner<'a>,
    at_eof: bool,
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer for a window. `at_eof` marks the window as the
    /// end of the input.
    pub fn new(input: &'a [u8], at_eof: bool) -> Self {
        Tokenizer {
            scanner: Scanner::new(input),
            at_eof,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.scanner.position()
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Step<'a>, ParseError> {
        if self.scanner.is_eof() {
            return Ok(if self.at_eof { Step::Eof } else { Step::NeedMore });
        }
        if self.scanner.peek() == Some(b'<') {
            self.parse_markup()
        } else {
            self.parse_text()
        }
    }

    fn need_more(&self, message: &str, start: usize) -> Result<Step<'a>, ParseError> {
        if self.at_eof {
            Err(ParseError::new(message, start))
        } else {
            Ok(Step::NeedMore)
        }
    }

    fn finish(&mut self, token: Token<'a>) -> Result<Step<'a>, ParseError> {
        self.scanner.set_position(token.span.1);
        Ok(Step::Token(token))
    }

    fn parse_text(&mut self) -> Result<Step<'a>, ParseError> {
        let start = self.scanner.position();
        let end = match self.scanner.find_tag_start() {
            Some(end) => end,
            // Text may continue into the next window
            None if !self.at_eof => return Ok(Step::NeedMore),
            None => start + self.scanner.remaining().len(),
        };
        let token = Token::new(TokenKind::Text, (start, end)).with_content(self.scanner.slice(start, end));
        self.finish(token)
    }

    fn parse_markup(&mut self) -> Result<Step<'a>, ParseError> {
        let start = self.scanner.position();
        let rest = self.scanner.remaining();
        if rest.len() < 2 {
            return self.need_more("Unexpected end of input in markup", start);
        }
        match rest[1] {
            b'/' => self.parse_end_tag(start),
            b'?' => self.parse_pi(start),
            b'!' => self.parse_declaration(start),
            _ => self.parse_start_tag(start),
        }
    }

    fn parse_end_tag(&mut self, start: usize) -> Result<Step<'a>, ParseError> {
        let Some(gt) = self.scanner.find_byte(b'>') else {
            return self.need_more("Unterminated end tag", start);
        };
        let inner = self.scanner.slice(start + 2, gt);
        let mut name_scanner = Scanner::new(inner);
        let Some(name) = name_scanner.read_name() else {
            return Err(ParseError::new("Invalid end tag name", start));
        };
        if !name_scanner.remaining().iter().all(|&b| is_whitespace(b)) {
            return Err(ParseError::new("Malformed end tag", start));
        }
        let token = Token::new(TokenKind::EndTag, (start, gt + 1)).with_name(name);
        self.finish(token)
    }

    fn parse_pi(&mut self, start: usize) -> Result<Step<'a>, ParseError> {
        self.scanner.set_position(start + 2);
        let close = self.scanner.find_seq(b"?>");
        self.scanner.set_position(start);
        let Some(close) = close else {
            return self.need_more("Unterminated processing instruction", start);
        };
        let inner = self.scanner.slice(start + 2, close);
        let mut target_scanner = Scanner::new(inner);
        let Some(target) = target_scanner.read_name() else {
            return Err(ParseError::new("Processing instruction target required", start));
        };
        let data = target_scanner.remaining();
        if !data.is_empty() && !is_whitespace(data[0]) {
            return Err(ParseError::new("Malformed processing instruction", start));
        }
        let data_start = data.iter().position(|&b| !is_whitespace(b)).unwrap_or(data.len());
        let data = &data[data_start..];

        let kind = if target.eq_ignore_ascii_case(b"xml") {
            TokenKind::XmlDeclaration
        } else {
            TokenKind::ProcessingInstruction
        };
        let token = Token::new(kind, (start, close + 2)).with_name(target).with_content(data);
        self.finish(token)
    }

    fn parse_declaration(&mut self, start: usize) -> Result<Step<'a>, ParseError> {
        if self.scanner.starts_with(b"<!--") {
            self.scanner.set_position(start + 4);
            let close = self.scanner.find_seq(b"-->");
            self.scanner.set_position(start);
            let Some(close) = close else {
                return self.need_more("Unterminated comment", start);
            };
            let token = Token::new(TokenKind::Comment, (start, close + 3))
                .with_content(self.scanner.slice(start + 4, close));
            return self.finish(token);
        }

        if self.scanner.starts_with(b"<![CDATA[") {
            self.scanner.set_position(start + 9);
            let close = self.scanner.find_seq(b"]]>");
            self.scanner.set_position(start);
            let Some(close) = close else {
                return self.need_more("Unterminated CDATA section", start);
            };
            let token = Token::new(TokenKind::CData, (start, close + 3))
                .with_content(self.scanner.slice(start + 9, close));
            return self.finish(token);
        }

        if self.scanner.starts_with(b"<!DOCTYPE") {
            let Some(gt) = self.scanner.find_doctype_end() else {
                return self.need_more("Unterminated DOCTYPE", start);
            };
            let token = Token::new(TokenKind::DocType, (start, gt + 1))
                .with_content(self.scanner.slice(start, gt + 1));
            return self.finish(token);
        }

        let partial = [b"<!--" as &[u8], b"<![CDATA[", b"<!DOCTYPE"]
            .iter()
            .any(|needle| self.scanner.is_partial_prefix_of(needle));
        if partial && !self.at_eof {
            return Ok(Step::NeedMore);
        }
        Err(ParseError::new("Unrecognized markup declaration", start))
    }

    fn parse_start_tag(&mut self, start: usize) -> Result<Step<'a>, ParseError> {
        let Some(gt) = self.scanner.find_tag_end_quoted() else {
            return self.need_more("Unterminated start tag", start);
        };
        let inner = self.scanner.slice(start + 1, gt);
        let is_empty = inner.last() == Some(&b'/');
        let inner = if is_empty { &inner[..inner.len() - 1] } else { inner };

        let mut name_scanner = Scanner::new(inner);
        let Some(name) = name_scanner.read_name() else {
            return Err(ParseError::new("Invalid element name", start));
        };

        let kind = if is_empty { TokenKind::EmptyTag } else { TokenKind::StartTag };
        let token = Token::new(kind, (start, gt + 1))
            .with_name(name)
            .with_content(name_scanner.remaining());
        self.finish(token)
    }
}
