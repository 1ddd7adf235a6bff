//! An in-memory transport, for testing code which speaks to a connection.
//!
//! A [`MockChannel`] plays the server side: tests queue up the chunks the client
//! should read, then inspect what the client wrote. Each queued chunk is delivered by
//! exactly one read, so tests control the chunk boundaries the client sees.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::{Buf as _, Bytes, BytesMut};
use http::Uri;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use crate::BoxFuture;

/// An error returned by a [`MockTransport`] which refuses to connect.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("connection error")]
pub struct MockConnectionError;

#[derive(Debug, Default)]
struct State {
    incoming: VecDeque<Bytes>,
    eof: bool,
    written: BytesMut,
    max_write: Option<usize>,
    shutdown: bool,
    reader: Option<Waker>,
}

impl State {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    reads: AtomicUsize,
}

/// The server side of an in-memory connection.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    shared: Arc<Shared>,
}

impl MockChannel {
    /// Create a channel with nothing to read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit each write on the connection to at most `max` bytes.
    pub fn with_max_write(self, max: usize) -> Self {
        self.shared.state.lock().max_write = Some(max.max(1));
        self
    }

    /// Queue a chunk to be delivered by a single read.
    pub fn push_read(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        let mut state = self.shared.state.lock();
        state.incoming.push_back(chunk);
        state.wake_reader();
    }

    /// Signal end-of-input once the queued chunks have been read.
    pub fn close_read(&self) {
        let mut state = self.shared.state.lock();
        state.eof = true;
        state.wake_reader();
    }

    /// Everything written to the connection so far.
    pub fn written(&self) -> Bytes {
        Bytes::copy_from_slice(&self.shared.state.lock().written)
    }

    /// The number of reads which have completed on the connection.
    pub fn read_calls(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }

    /// The number of queued chunks not yet read.
    pub fn pending_reads(&self) -> usize {
        self.shared.state.lock().incoming.len()
    }

    /// Whether the client has shut the connection down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Create the client side of this channel.
    pub fn connection(&self) -> MockConnection {
        MockConnection {
            shared: self.shared.clone(),
        }
    }
}

/// The client side of an in-memory connection.
#[derive(Debug)]
pub struct MockConnection {
    shared: Arc<Shared>,
}

impl AsyncRead for MockConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.shared.state.lock();
        if let Some(front) = state.incoming.front_mut() {
            let n = front.len().min(buf.remaining());
            buf.put_slice(&front[..n]);
            front.advance(n);
            if front.is_empty() {
                state.incoming.pop_front();
            }
        } else if !(state.eof || state.shutdown) {
            state.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }

        self.shared.reads.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        let n = state.max_write.map_or(buf.len(), |max| buf.len().min(max));
        state.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        state.wake_reader();
        trace!("mock connection shut down");
        Poll::Ready(Ok(()))
    }
}

/// A transport which hands out connections to a [`MockChannel`].
#[derive(Debug, Clone)]
pub struct MockTransport {
    channel: Option<MockChannel>,
    connected: Arc<Mutex<Vec<Uri>>>,
}

impl MockTransport {
    /// Create a transport whose connections all lead to `channel`.
    pub fn new(channel: MockChannel) -> Self {
        Self {
            channel: Some(channel),
            connected: Default::default(),
        }
    }

    /// Transport which fails every connection attempt.
    pub fn connection_error() -> Self {
        Self {
            channel: None,
            connected: Default::default(),
        }
    }

    /// The URIs connections were requested for, in order.
    pub fn connected(&self) -> Vec<Uri> {
        self.connected.lock().clone()
    }
}

impl tower::Service<Uri> for MockTransport {
    type Response = MockConnection;
    type Error = MockConnectionError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Uri) -> Self::Future {
        trace!(uri = %req, "mock connect");
        self.connected.lock().push(req);
        let result = self
            .channel
            .as_ref()
            .map(MockChannel::connection)
            .ok_or(MockConnectionError);
        Box::pin(std::future::ready(result))
    }
}
