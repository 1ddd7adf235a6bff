//! Packet streams.
//!
//! A packet stream hands out successive chunks ("packets") of a single logical byte
//! stream. An empty packet marks the end of the stream, in both the read and write
//! directions, and every pull after the end yields another empty packet.
//!
//! Streams serialize their own pulls: a second call to [`PacketStream::next_packet`]
//! made while the first is still outstanding waits for it to finish rather than
//! failing. Callers receive owned [`Bytes`], which stay valid regardless of what the
//! stream does next.

use bytes::Bytes;

use crate::{BoxFuture, Error};

pub mod channel;

pub use self::channel::{BoxConnection, ChannelPacketSource, Connection};

/// The default size of a single packet read from a connection or sliced from a body.
pub const PACKET_SIZE: usize = 4096;

/// A pull-based stream of packets with explicit release.
pub trait PacketStream: Send + Sync {
    /// Produce the next packet. An empty packet means the stream has ended.
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>>;

    /// Release the stream and any resource it owns.
    ///
    /// All later calls to [`next_packet`](PacketStream::next_packet) return empty packets.
    fn close(&self) -> BoxFuture<'_, Result<(), Error>>;
}

impl<P> PacketStream for Box<P>
where
    P: PacketStream + ?Sized,
{
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>> {
        (**self).next_packet()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        (**self).close()
    }
}

/// Pull every remaining packet from `stream` and concatenate them.
pub async fn collect<P>(stream: &P) -> Result<Bytes, Error>
where
    P: PacketStream + ?Sized,
{
    let first = stream.next_packet().await?;
    if first.is_empty() {
        return Ok(first);
    }

    let second = stream.next_packet().await?;
    if second.is_empty() {
        return Ok(first);
    }

    let mut buf = bytes::BytesMut::with_capacity(first.len() + second.len());
    buf.extend_from_slice(&first);
    buf.extend_from_slice(&second);
    loop {
        let packet = stream.next_packet().await?;
        if packet.is_empty() {
            return Ok(buf.freeze());
        }
        buf.extend_from_slice(&packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Full, RequestBody as _};

    #[tokio::test]
    async fn collect_concatenates_packets() {
        let body = Full::from("one two three").with_packet_size(4);
        assert_eq!(collect(&body.open()).await.unwrap(), "one two three");

        let body = Full::from("one");
        assert_eq!(collect(&body.open()).await.unwrap(), "one");

        let body = Full::from("");
        assert!(collect(&body.open()).await.unwrap().is_empty());
    }
}
