//! HTTP wire codecs.
//!
//! A codec turns a [`Request`](crate::Request) into the packets written to a
//! connection, and turns the bytes read back into the head of a response. Only
//! HTTP/1.1 is implemented; asking for any other protocol version fails up front.

use http::Version;
use thiserror::Error;

use crate::header::HeaderMap;
use crate::packet::PACKET_SIZE;

mod decoder;
mod encoder;

pub use self::decoder::Http1Decoder;
pub use self::encoder::{EncodedRequest, Http1Encoder};

/// The default longest line the decoder accepts.
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// Errors raised when the bytes of a response are not valid HTTP/1.x.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The status line does not have a version, a three digit code and a reason.
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    /// The status line names a protocol version other than HTTP/1.0 or HTTP/1.1.
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(String),

    /// A header line has no colon.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// A header name is not a valid token.
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// A header value contains control characters.
    #[error("invalid header value for {name}: {value:?}")]
    InvalidHeaderValue {
        /// Header name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// A line ran past the configured limit without a terminator.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// The configured limit.
        limit: usize,
    },
}

/// The head of a response: everything before the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialResponse {
    status: u16,
    message: String,
    headers: HeaderMap,
}

impl PartialResponse {
    /// The status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The reason phrase, possibly empty.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn into_parts(self) -> (u16, String, HeaderMap) {
        (self.status, self.message, self.headers)
    }
}

/// Tuning for the HTTP/1.1 codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Http1Config {
    /// The size of each read from the connection.
    pub packet_size: usize,

    /// The longest status or header line accepted from the server.
    pub max_line_length: usize,
}

impl Default for Http1Config {
    fn default() -> Self {
        Self {
            packet_size: PACKET_SIZE,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

/// A versioned HTTP codec.
#[derive(Debug, Clone)]
pub struct HttpCodec {
    config: Http1Config,
}

impl HttpCodec {
    /// Select the codec for a protocol version.
    ///
    /// Only [`Version::HTTP_11`] is supported.
    pub fn for_version(version: Version) -> Result<Self, crate::Error> {
        if version == Version::HTTP_11 {
            Ok(Self {
                config: Http1Config::default(),
            })
        } else {
            Err(crate::Error::UnsupportedVersion(version))
        }
    }

    /// Replace the codec configuration.
    pub fn with_config(mut self, config: Http1Config) -> Self {
        self.config = config;
        self
    }

    /// The protocol version this codec speaks.
    pub fn version(&self) -> Version {
        Version::HTTP_11
    }

    /// The codec configuration.
    pub fn config(&self) -> &Http1Config {
        &self.config
    }

    /// A request encoder.
    pub fn encoder(&self) -> Http1Encoder {
        Http1Encoder::new()
    }

    /// A fresh response decoder.
    pub fn decoder(&self) -> Http1Decoder {
        Http1Decoder::with_max_line_length(self.config.max_line_length)
    }
}
