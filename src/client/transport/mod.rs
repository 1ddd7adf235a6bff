//! Transports establish the raw connections requests are written to.
//!
//! Any cloneable [`tower::Service`] which accepts a [`Uri`] and produces a
//! [`Connection`] can serve as a transport: it is adapted into the object-safe
//! [`Connect`] capability which the client holds on to.

use std::fmt;

use http::Uri;
use tower::ServiceExt as _;

use crate::packet::{BoxConnection, Connection};
use crate::{BoxError, BoxFuture, Error};

#[cfg(any(test, feature = "mocks"))]
pub mod mock;
#[cfg(feature = "tcp")]
pub mod tcp;

/// The capability to open a connection to the authority named by a URI.
pub trait Connect: Send + Sync + 'static {
    /// Open a new connection for a request to `uri`.
    fn connect(&self, uri: &Uri) -> BoxFuture<'static, Result<BoxConnection, Error>>;
}

impl<T> Connect for T
where
    T: tower::Service<Uri> + Clone + Send + Sync + 'static,
    T::Response: Connection,
    T::Error: Into<BoxError>,
    T::Future: Send + 'static,
{
    fn connect(&self, uri: &Uri) -> BoxFuture<'static, Result<BoxConnection, Error>> {
        let transport = self.clone();
        let uri = uri.clone();
        Box::pin(async move {
            let io = transport
                .oneshot(uri)
                .await
                .map_err(|error| Error::Connect(error.into()))?;
            Ok(Box::new(io) as BoxConnection)
        })
    }
}

/// A shared, type-erased transport.
#[derive(Clone)]
pub(crate) struct SharedTransport(std::sync::Arc<dyn Connect>);

impl SharedTransport {
    pub(crate) fn new<T: Connect>(transport: T) -> Self {
        Self(std::sync::Arc::new(transport))
    }

    pub(crate) fn connect(&self, uri: &Uri) -> BoxFuture<'static, Result<BoxConnection, Error>> {
        self.0.connect(uri)
    }
}

impl fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransport").finish()
    }
}
