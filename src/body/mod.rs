//! Request and response bodies.
//!
//! Outgoing bodies implement [`RequestBody`], which can be opened into a fresh
//! [`PacketStream`] as many times as the body needs to be sent. Incoming bodies are
//! a [`ResponseBody`], which is read exactly once and owns the connection it is read
//! from.

use bytes::Bytes;
use futures_core::Stream;
use tracing::warn;

use crate::content_type::{Charset, ContentType};
use crate::packet::{self, PacketStream};
use crate::Error;

mod full;
pub mod incoming;

pub use self::full::Full;
pub use self::incoming::IncomingBody;

/// The body of an outgoing request.
pub trait RequestBody: Send + Sync {
    /// The length of the body in bytes, if known up front.
    fn content_length(&self) -> Option<u64> {
        None
    }

    /// The media type of the body.
    fn content_type(&self) -> &ContentType;

    /// Start a new read of the body from the beginning.
    fn open(&self) -> Box<dyn PacketStream>;
}

/// The body of a response, bound to the connection it arrives on.
#[derive(Debug)]
pub struct ResponseBody {
    content_type: ContentType,
    stream: IncomingBody,
}

impl ResponseBody {
    pub(crate) fn new(content_type: ContentType, stream: IncomingBody) -> Self {
        Self {
            content_type,
            stream,
        }
    }

    /// The length declared by the response, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.stream.content_length()
    }

    /// The media type declared by the response.
    ///
    /// Responses without a `Content-Type` header are `application/octet-stream`.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    /// Take the underlying packet stream.
    pub fn packets(self) -> IncomingBody {
        self.stream
    }

    /// Read the whole body into memory, then close the connection.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let result = packet::collect(&self.stream).await;
        if let Err(error) = self.stream.shutdown().await {
            warn!("error closing connection after reading body: {error}");
        }
        result
    }

    /// Read the whole body and decode it as text.
    ///
    /// The charset comes from the content type; bodies without one are read as UTF-8.
    pub async fn text(self) -> Result<String, Error> {
        let charset = self.content_type.resolve_charset()?.unwrap_or(Charset::Utf8);
        let content = self.bytes().await?;
        charset.decode(&content).ok_or(Error::InvalidText)
    }

    /// Convert the body into a [`Stream`] of packets.
    ///
    /// The stream ends after the last packet, or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> + Send {
        futures_util::stream::unfold(Some(self.stream), |state| async move {
            let stream = state?;
            match stream.read_packet().await {
                Ok(packet) if packet.is_empty() => None,
                Ok(packet) => Some((Ok(packet), Some(stream))),
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    /// Close the body and its connection without reading the rest.
    pub async fn close(self) -> Result<(), Error> {
        self.stream.shutdown().await
    }
}
