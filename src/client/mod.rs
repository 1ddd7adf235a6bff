//! The HTTP client.
//!
//! A [`Client`] opens a fresh connection for every request through its transport,
//! writes the encoded request, decodes the response head, and hands back a
//! [`Response`] whose body is still bound to that connection.
//!
//! Each request runs as a task on the client's Tokio runtime. [`Client::execute`]
//! returns immediately with a [`ResponseFuture`] which resolves once the response head
//! has arrived.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Method, Uri};
use pin_project::pin_project;
use tokio::io::AsyncWriteExt as _;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn, Instrument as _};

use self::exchange::{ReadHead, WriteRequest};
use self::transport::SharedTransport;
use crate::body::{Full, IncomingBody, ResponseBody};
use crate::codec::HttpCodec;
use crate::packet::{BoxConnection, ChannelPacketSource, PacketStream as _};
use crate::request::Request;
use crate::response::Response;
use crate::rt::{self, Promise};
use crate::Error;

mod builder;
mod exchange;
pub mod transport;

pub use self::builder::Builder;

/// An HTTP/1.1 client.
///
/// Clients are cheap to clone, and clones share their transport and runtime.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("version", &self.inner.codec.version())
            .finish()
    }
}

#[derive(Debug)]
struct Inner {
    transport: SharedTransport,
    codec: HttpCodec,
    executor: Handle,
}

impl Client {
    /// A builder for configuring a client.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// A client with the default configuration, on the current Tokio runtime.
    pub fn new() -> Result<Self, Error> {
        Builder::new().build()
    }

    /// Send a request.
    ///
    /// The request starts running immediately, whether or not the returned future is
    /// polled. Dropping the future does not stop the request.
    pub fn execute(&self, request: Request) -> ResponseFuture {
        let span = tracing::debug_span!("request", method = %request.method(), uri = %request.uri());
        let inner = self.inner.clone();
        let promise = rt::spawn(
            &self.inner.executor,
            async move { inner.send(request).await }.instrument(span),
        );
        ResponseFuture { promise }
    }

    /// Send a `GET` request.
    pub async fn get(&self, uri: Uri) -> Result<Response, Error> {
        self.execute(Request::get(uri)?).await
    }

    /// Send a `HEAD` request.
    pub async fn head(&self, uri: Uri) -> Result<Response, Error> {
        self.execute(Request::head(uri)?).await
    }

    /// Send a `DELETE` request.
    pub async fn delete(&self, uri: Uri) -> Result<Response, Error> {
        self.execute(Request::delete(uri)?).await
    }

    /// Send a `POST` request with a body.
    pub async fn post(&self, uri: Uri, body: impl Into<Full>) -> Result<Response, Error> {
        self.execute(Request::post(uri, body)?).await
    }

    /// Send a `PUT` request with a body.
    pub async fn put(&self, uri: Uri, body: impl Into<Full>) -> Result<Response, Error> {
        self.execute(Request::put(uri, body)?).await
    }
}

/// A future resolving to the response of a request.
#[derive(Debug)]
#[pin_project]
pub struct ResponseFuture {
    #[pin]
    promise: Promise<Response>,
}

impl Future for ResponseFuture {
    type Output = Result<Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().promise.poll(cx)
    }
}

impl Inner {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let mut io = self.connect(request.uri()).await?;

        let encoded = self.codec.encoder().encode(&request);
        if let Err(error) = rt::drive(&mut WriteRequest::new(&mut io, &encoded)).await {
            debug!("failed to write request: {error}");
            if let Err(error) = encoded.close().await {
                warn!("error closing request body: {error}");
            }
            if let Err(error) = io.shutdown().await {
                warn!("error closing connection: {error}");
            }
            return Err(error);
        }

        let source = ChannelPacketSource::with_packet_size(io, self.codec.config().packet_size);
        match self.receive(request.method(), source).await {
            Ok(response) => Ok(response),
            Err((error, source)) => {
                debug!("failed to read response: {error}");
                if let Err(error) = source.shutdown().await {
                    warn!("error closing connection: {error}");
                }
                Err(error)
            }
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn connect(&self, uri: &Uri) -> Result<BoxConnection, Error> {
        let io = self.transport.connect(uri).await?;
        trace!("connected");
        Ok(io)
    }

    async fn receive(
        &self,
        method: &Method,
        source: ChannelPacketSource,
    ) -> Result<Response, (Error, ChannelPacketSource)> {
        let read = rt::drive(&mut ReadHead::new(&source, self.codec.decoder())).await;
        let (head, leftover) = match read {
            Ok(read) => read,
            Err(error) => return Err((error, source)),
        };

        let (status, message, headers) = head.into_parts();
        debug!(status, %message, "received response head");

        if !exchange::has_body(method, status) {
            if let Err(error) = source.shutdown().await {
                warn!("error closing connection: {error}");
            }
            return Ok(Response::new(status, message, headers, None));
        }

        let content_type = match exchange::content_type(&headers) {
            Ok(content_type) => content_type,
            Err(error) => return Err((error, source)),
        };
        let content_length = exchange::content_length(&headers);
        trace!(?content_length, %content_type, "response body");

        let body = IncomingBody::new(source, content_length, leftover);
        let body = ResponseBody::new(content_type, body);
        Ok(Response::new(status, message, headers, Some(body)))
    }
}
