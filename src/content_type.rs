//! The `Content-Type` value and its parser.
//!
//! The grammar accepted is the RFC 2616 media type:
//!
//! ```text
//! media-type = type "/" subtype *( LWS ";" LWS attribute "=" value )
//! value      = token | quoted-string
//! ```
//!
//! Only the `charset` parameter is retained. When it is absent, `text/*` defaults to
//! ISO-8859-1 and `application/json` to UTF-8.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::header::is_token_char;

/// Errors which can occur when parsing a `Content-Type` value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentTypeError {
    /// The type or sub-type was empty.
    #[error("empty media type in {0:?}")]
    EmptyType(String),

    /// There was no `/` separating type and sub-type.
    #[error("media type has no sub-type: {0:?}")]
    MissingSubtype(String),

    /// Something other than a `;`-separated parameter followed the media type.
    #[error("unknown text following media type: {0:?}")]
    TrailingText(String),

    /// A parameter attribute was not followed by `=` and a value.
    #[error("parameter has no value: {0:?}")]
    MissingValue(String),

    /// A quoted-string ran to the end of input.
    #[error("unterminated quoted string: {0:?}")]
    UnterminatedQuote(String),
}

/// A character set this crate knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Charset {
    /// UTF-8
    Utf8,
    /// ISO-8859-1 (Latin-1)
    Latin1,
    /// US-ASCII
    Ascii,
    /// UTF-16 with an optional byte-order mark, big-endian otherwise.
    Utf16,
    /// UTF-16, big-endian
    Utf16Be,
    /// UTF-16, little-endian
    Utf16Le,
}

impl Charset {
    /// Look up a charset by its (case-insensitive) label.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        let charset = match label.as_str() {
            "utf-8" | "utf8" => Self::Utf8,
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "l1" => Self::Latin1,
            "us-ascii" | "ascii" => Self::Ascii,
            "utf-16" | "utf16" => Self::Utf16,
            "utf-16be" => Self::Utf16Be,
            "utf-16le" => Self::Utf16Le,
            _ => return None,
        };
        Some(charset)
    }

    /// Decode `bytes` as text in this charset.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Self::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Utf16 => match bytes {
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
                _ => decode_utf16(bytes, u16::from_be_bytes),
            },
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// A media type, with an optional charset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentType {
    mime_type: String,
    charset: Option<String>,
}

impl ContentType {
    /// Create a content type from a MIME type and an optional charset label.
    pub fn new(mime_type: impl Into<String>, charset: Option<impl Into<String>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            charset: charset.map(Into::into),
        }
    }

    /// `application/octet-stream`, with no charset.
    pub fn octet_stream() -> Self {
        Self::new("application/octet-stream", None::<String>)
    }

    /// `text/plain; charset=UTF-8`
    pub fn text_utf8() -> Self {
        Self::new("text/plain", Some("UTF-8"))
    }

    /// Parse a `Content-Type` header value.
    pub fn parse(source: &str) -> Result<Self, ContentTypeError> {
        Parser::new(source).parse()
    }

    /// The MIME type, e.g. `text/plain`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The charset label, if one was given or defaulted.
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Resolve the charset label to a known [`Charset`].
    ///
    /// Returns `Ok(None)` when there is no charset.
    pub fn resolve_charset(&self) -> Result<Option<Charset>, crate::Error> {
        match &self.charset {
            None => Ok(None),
            Some(label) => Charset::from_label(label)
                .map(Some)
                .ok_or_else(|| crate::Error::UnsupportedCharset(label.clone())),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.charset {
            Some(charset) => write!(f, "{}; charset={}", self.mime_type, charset),
            None => write!(f, "{}", self.mime_type),
        }
    }
}

impl FromStr for ContentType {
    type Err = ContentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn default_charset(kind: &str, subtype: &str) -> Option<&'static str> {
    if kind.eq_ignore_ascii_case("text") {
        Some("ISO-8859-1")
    } else if kind.eq_ignore_ascii_case("application") && subtype.eq_ignore_ascii_case("json") {
        Some("UTF-8")
    } else {
        None
    }
}

struct Parser<'s> {
    source: &'s str,
    chars: Vec<char>,
    index: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            index: 0,
        }
    }

    fn parse(mut self) -> Result<ContentType, ContentTypeError> {
        let kind = self.token();
        if self.next() != Some('/') {
            return Err(ContentTypeError::MissingSubtype(self.source.into()));
        }
        let subtype = self.token();
        if kind.is_empty() || subtype.is_empty() {
            return Err(ContentTypeError::EmptyType(self.source.into()));
        }

        let mut charset = None;
        loop {
            self.linear_whitespace();
            match self.next() {
                None => break,
                Some(';') => {}
                Some(_) => return Err(ContentTypeError::TrailingText(self.source.into())),
            }
            self.linear_whitespace();
            let attribute = self.token();
            if attribute.is_empty() || self.next() != Some('=') {
                return Err(ContentTypeError::MissingValue(self.source.into()));
            }
            let value = match self.peek() {
                None => return Err(ContentTypeError::MissingValue(self.source.into())),
                Some('"') => {
                    self.index += 1;
                    self.quoted_string()?
                }
                Some(_) => self.token(),
            };
            if attribute.eq_ignore_ascii_case("charset") {
                charset = Some(value);
            }
        }

        let charset = charset.or_else(|| default_charset(&kind, &subtype).map(String::from));
        Ok(ContentType {
            mime_type: format!("{kind}/{subtype}"),
            charset,
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        Some(c)
    }

    fn token(&mut self) -> String {
        let start = self.index;
        while self.peek().is_some_and(is_token_char) {
            self.index += 1;
        }
        self.chars[start..self.index].iter().collect()
    }

    fn quoted_string(&mut self) -> Result<String, ContentTypeError> {
        let mut value = String::new();
        loop {
            match self.next() {
                None => return Err(ContentTypeError::UnterminatedQuote(self.source.into())),
                Some('\\') => match self.next() {
                    Some(c) => value.push(c),
                    None => return Err(ContentTypeError::UnterminatedQuote(self.source.into())),
                },
                Some('"') => return Ok(value),
                Some(c) => value.push(c),
            }
        }
    }

    /// LWS = [CRLF] 1*( SP | HT ), though here the whitespace is optional.
    fn linear_whitespace(&mut self) {
        if self.chars[self.index..].starts_with(&['\r', '\n']) {
            self.index += 2;
        }
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.index += 1;
        }
    }
}
