//! The response body stream.
//!
//! The stream reads from the connection the response header arrived on, and keeps
//! count of how many body bytes it has handed out. Once the declared content length
//! has been delivered it stops reading, so whatever follows on the connection is left
//! in place for whoever uses the connection next.

use std::fmt;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::packet::{BoxConnection, ChannelPacketSource, PacketStream};
use crate::{BoxFuture, Error};

#[derive(Debug, Default)]
struct Progress {
    delivered: u64,
    leftover: Option<Bytes>,
    surplus: Bytes,
    done: bool,
}

/// A packet stream over the body of a response.
///
/// Bytes which were read past the end of the header block are delivered first, then
/// the connection is read until either the content length is reached or, if the
/// length is unknown, the connection signals end-of-input.
pub struct IncomingBody {
    source: ChannelPacketSource,
    content_length: Option<u64>,
    progress: Mutex<Progress>,
}

impl fmt::Debug for IncomingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingBody")
            .field("content_length", &self.content_length)
            .finish()
    }
}

impl IncomingBody {
    /// Create a body stream over `source`, which starts with `leftover`.
    pub fn new(source: ChannelPacketSource, content_length: Option<u64>, leftover: Bytes) -> Self {
        Self {
            source,
            content_length,
            progress: Mutex::new(Progress {
                leftover: (!leftover.is_empty()).then_some(leftover),
                ..Default::default()
            }),
        }
    }

    /// The declared length of the body, if known.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the next packet of the body.
    pub async fn read_packet(&self) -> Result<Bytes, Error> {
        let mut progress = self.progress.lock().await;
        if progress.done {
            return Ok(Bytes::new());
        }

        let remaining = match self.content_length {
            Some(length) if progress.delivered >= length => {
                trace!(length, "body complete");
                progress.done = true;
                if let Some(leftover) = progress.leftover.take() {
                    progress.surplus = leftover;
                }
                return Ok(Bytes::new());
            }
            Some(length) => Some(length - progress.delivered),
            None => None,
        };

        let mut packet = match progress.leftover.take() {
            Some(leftover) => leftover,
            None => self.source.read_packet().await?,
        };

        if packet.is_empty() {
            progress.done = true;
            return match self.content_length {
                Some(expected) => {
                    debug!(expected, received = progress.delivered, "body truncated");
                    Err(Error::BodyTruncated {
                        expected,
                        received: progress.delivered,
                    })
                }
                None => Ok(packet),
            };
        }

        if let Some(remaining) = remaining {
            if packet.len() as u64 > remaining {
                // Bytes past the declared length belong to whatever comes next.
                progress.surplus = packet.split_off(remaining as usize);
                trace!(surplus = progress.surplus.len(), "retained bytes past body end");
            }
        }

        progress.delivered += packet.len() as u64;
        Ok(packet)
    }

    /// Close the body and the connection underneath it.
    pub async fn shutdown(&self) -> Result<(), Error> {
        {
            let mut progress = self.progress.lock().await;
            progress.done = true;
            progress.leftover = None;
        }
        self.source.shutdown().await
    }

    /// Recover the connection once the body has been read to its declared end.
    ///
    /// Returns the connection together with any bytes already read past the end of
    /// the body. Returns `None` when the body length is unknown, when the body was
    /// not read to the end, or when the connection was closed.
    pub fn into_connection(self) -> Option<(BoxConnection, Bytes)> {
        let progress = self.progress.into_inner();
        if self.content_length != Some(progress.delivered) {
            return None;
        }
        let surplus = progress.leftover.unwrap_or(progress.surplus);
        self.source.into_connection().map(|io| (io, surplus))
    }
}

impl PacketStream for IncomingBody {
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>> {
        Box::pin(self.read_packet())
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::client::transport::mock::MockChannel;

    assert_impl_all!(IncomingBody: PacketStream, Send, Sync);

    fn body(channel: &MockChannel, length: Option<u64>, leftover: &'static str) -> IncomingBody {
        let source = ChannelPacketSource::new(Box::new(channel.connection()));
        IncomingBody::new(source, length, Bytes::from_static(leftover.as_bytes()))
    }

    #[tokio::test]
    async fn stops_reading_at_content_length() {
        let _ = tracing_subscriber::fmt::try_init();

        let channel = MockChannel::new();
        channel.push_read("lo wor");
        channel.push_read("HTTP/1.1 204 No Content\r\n\r\n");

        let body = body(&channel, Some(5), "hel");
        assert_eq!(body.next_packet().await.unwrap(), "hel");
        assert_eq!(channel.read_calls(), 0);
        assert_eq!(body.next_packet().await.unwrap(), "lo");
        assert_eq!(channel.read_calls(), 1);

        for _ in 0..3 {
            assert!(body.next_packet().await.unwrap().is_empty());
        }
        assert_eq!(channel.read_calls(), 1);

        let (_io, surplus) = body.into_connection().expect("body was read to the end");
        assert_eq!(surplus, " wor");
        assert_eq!(channel.pending_reads(), 1);
    }

    #[tokio::test]
    async fn leftover_can_hold_entire_body() {
        let channel = MockChannel::new();
        let body = body(&channel, Some(4), "pingHTTP/1.1");

        assert_eq!(body.next_packet().await.unwrap(), "ping");
        assert!(body.next_packet().await.unwrap().is_empty());
        assert_eq!(channel.read_calls(), 0);

        let (_io, surplus) = body.into_connection().unwrap();
        assert_eq!(surplus, "HTTP/1.1");
    }

    #[tokio::test]
    async fn zero_length_body_never_reads() {
        let channel = MockChannel::new();
        channel.push_read("next");

        let body = body(&channel, Some(0), "");
        assert!(body.next_packet().await.unwrap().is_empty());
        assert_eq!(channel.read_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_length_reads_until_eof() {
        let channel = MockChannel::new();
        channel.push_read("more ");
        channel.push_read("data");
        channel.close_read();

        let body = body(&channel, None, "some ");
        let all = crate::packet::collect(&body).await.unwrap();
        assert_eq!(all, "some more data");
        assert!(body.next_packet().await.unwrap().is_empty());
        assert!(body.into_connection().is_none());
    }

    #[tokio::test]
    async fn early_eof_is_truncation() {
        let channel = MockChannel::new();
        channel.push_read("abc");
        channel.close_read();

        let body = body(&channel, Some(10), "");
        assert_eq!(body.next_packet().await.unwrap(), "abc");
        assert!(matches!(
            body.next_packet().await,
            Err(Error::BodyTruncated {
                expected: 10,
                received: 3
            })
        ));
        assert!(body.next_packet().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_shuts_down_connection() {
        let channel = MockChannel::new();
        channel.push_read("unread");

        let body = body(&channel, Some(6), "");
        body.close().await.unwrap();
        assert!(channel.is_shutdown());
        assert!(body.next_packet().await.unwrap().is_empty());
        assert_eq!(channel.read_calls(), 0);
        assert!(body.into_connection().is_none());
    }
}
