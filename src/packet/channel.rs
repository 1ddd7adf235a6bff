//! Packet source over a raw connection.

use std::fmt;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{PacketStream, PACKET_SIZE};
use crate::{BoxFuture, Error};

/// A bidirectional byte stream which can carry an HTTP exchange.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// An exclusively owned, type-erased connection.
pub type BoxConnection = Box<dyn Connection>;

struct Channel {
    io: Option<BoxConnection>,
    buffer: Box<[u8]>,
}

/// Reads packets from a connection, one fixed-size read at a time.
///
/// Only one read is ever outstanding: the lock is taken before the read is issued
/// and released once it completes, so concurrent callers queue up behind each other.
/// The working buffer is reused between reads; each packet handed out is its own copy.
pub struct ChannelPacketSource {
    inner: Mutex<Channel>,
}

impl fmt::Debug for ChannelPacketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPacketSource").finish()
    }
}

impl ChannelPacketSource {
    /// Create a packet source which reads [`PACKET_SIZE`] bytes at a time.
    pub fn new(io: BoxConnection) -> Self {
        Self::with_packet_size(io, PACKET_SIZE)
    }

    /// Create a packet source which reads up to `packet_size` bytes at a time.
    pub fn with_packet_size(io: BoxConnection, packet_size: usize) -> Self {
        Self {
            inner: Mutex::new(Channel {
                io: Some(io),
                buffer: vec![0; packet_size.max(1)].into_boxed_slice(),
            }),
        }
    }

    /// Read the next packet from the connection.
    ///
    /// End-of-input, or a closed source, produces an empty packet.
    pub async fn read_packet(&self) -> Result<Bytes, Error> {
        let mut channel = self.inner.lock().await;
        let Channel { io, buffer } = &mut *channel;
        let Some(io) = io.as_mut() else {
            return Ok(Bytes::new());
        };

        loop {
            match io.read(buffer).await {
                Ok(0) => {
                    trace!("connection reached end of input");
                    return Ok(Bytes::new());
                }
                Ok(n) => {
                    trace!(bytes = n, "read packet");
                    return Ok(Bytes::copy_from_slice(&buffer[..n]));
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    trace!("read interrupted, retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Shut down and release the connection.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let io = self.inner.lock().await.io.take();
        let Some(mut io) = io else {
            return Ok(());
        };

        match io.shutdown().await {
            Ok(()) => {
                debug!("connection closed");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotConnected => {
                debug!("connection already closed by peer");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Whether the connection has been released.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.io.is_none()
    }

    /// Take back the connection, if it has not been closed.
    pub fn into_connection(self) -> Option<BoxConnection> {
        self.inner.into_inner().io
    }
}

impl PacketStream for ChannelPacketSource {
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>> {
        Box::pin(self.read_packet())
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use static_assertions::assert_impl_all;
    use tokio::io::ReadBuf;

    use super::*;

    assert_impl_all!(ChannelPacketSource: PacketStream, Send, Sync);

    #[tokio::test]
    async fn reads_fixed_size_packets_then_eof() {
        let _ = tracing_subscriber::fmt::try_init();

        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"abcdefghij").await.unwrap();
        drop(server);

        let source = ChannelPacketSource::with_packet_size(Box::new(client), 4);
        assert_eq!(source.next_packet().await.unwrap(), "abcd");
        assert_eq!(source.next_packet().await.unwrap(), "efgh");
        assert_eq!(source.next_packet().await.unwrap(), "ij");
        assert!(source.next_packet().await.unwrap().is_empty());
        assert!(source.next_packet().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_source_yields_empty_packets() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(b"pending").await.unwrap();

        let source = ChannelPacketSource::new(Box::new(client));
        source.close().await.unwrap();
        assert!(source.is_closed().await);
        assert!(source.next_packet().await.unwrap().is_empty());
        assert!(source.into_connection().is_none());
    }

    #[tokio::test]
    async fn concurrent_reads_are_serialized() {
        let (client, mut server) = tokio::io::duplex(64);
        let source = ChannelPacketSource::with_packet_size(Box::new(client), 3);

        let writer = async {
            server.write_all(b"abcdef").await.unwrap();
        };
        let (first, second, ()) = tokio::join!(source.next_packet(), source.next_packet(), writer);

        let mut packets = vec![first.unwrap(), second.unwrap()];
        packets.sort();
        assert_eq!(packets, vec![Bytes::from("abc"), Bytes::from("def")]);
    }

    /// Fails its first read with `Interrupted`, then serves its contents.
    struct Flaky {
        interrupted: bool,
        data: &'static [u8],
    }

    impl AsyncRead for Flaky {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.interrupted {
                self.interrupted = true;
                return Poll::Ready(Err(io::ErrorKind::Interrupted.into()));
            }
            let n = self.data.len().min(buf.remaining());
            buf.put_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for Flaky {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn interrupted_reads_are_retried() {
        let source = ChannelPacketSource::new(Box::new(Flaky {
            interrupted: false,
            data: b"ok",
        }));

        assert_eq!(source.next_packet().await.unwrap(), "ok");
        assert!(source.next_packet().await.unwrap().is_empty());
    }
}
