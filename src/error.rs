use thiserror::Error;

use crate::codec::DecodeError;
use crate::content_type::ContentTypeError;
use crate::BoxError;

/// Client error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection could not be established.
    #[error("connect: {0}")]
    Connect(#[source] BoxError),

    /// Reading from or writing to the connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The response contained malformed HTTP data.
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    /// The response carried a `Content-Type` header which could not be parsed.
    #[error("content-type: {0}")]
    ContentType(#[from] ContentTypeError),

    /// The connection reached end-of-input before the response header was complete.
    #[error("connection closed before the response header was complete")]
    PrematureEof,

    /// The connection reached end-of-input before the declared body length was read.
    #[error("response body truncated: expected {expected} bytes, received {received}")]
    BodyTruncated {
        /// Declared content length.
        expected: u64,
        /// Bytes received before end-of-input.
        received: u64,
    },

    /// Protocol version is not supported by this client.
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(http::Version),

    /// A body was supplied for a method which does not carry one.
    #[error("{0} requests can not carry a body")]
    BodyNotAllowed(http::Method),

    /// The request URI is not `http` or `https`.
    #[error("URI scheme must be http or https")]
    InvalidScheme,

    /// The request URI has no host.
    #[error("URI is missing a host")]
    MissingHost,

    /// The request URI could not be parsed.
    #[error("invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// The request method could not be parsed.
    #[error("invalid method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// A header name is not a valid HTTP token.
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// A header value contains characters which are not allowed.
    #[error("invalid header value for {name}: {value:?}")]
    InvalidHeaderValue {
        /// Header name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// A header which must be single-valued has several values.
    #[error("more than one value for header {0}")]
    MultipleValues(String),

    /// The body's charset is not one this crate can decode.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// The body is not valid text in its declared charset.
    #[error("body is not valid text in its charset")]
    InvalidText,

    /// No Tokio runtime was available to drive the client.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// The task driving the request ended without producing a result.
    #[error("request was canceled")]
    Canceled,
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: std::error::Error, Send, Sync, Into<BoxError>);

    #[test]
    fn display_truncated() {
        let err = Error::BodyTruncated {
            expected: 10,
            received: 4,
        };
        assert_eq!(
            err.to_string(),
            "response body truncated: expected 10 bytes, received 4"
        );
    }
}
