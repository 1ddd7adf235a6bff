use std::sync::Arc;

use http::Version;
use tokio::runtime::Handle;

use super::transport::{Connect, SharedTransport};
#[cfg(feature = "tcp")]
use super::transport::tcp::{TcpTransport, TcpTransportConfig};
use super::{Client, Inner};
use crate::codec::{Http1Config, HttpCodec};
use crate::Error;

/// A builder for a client.
///
/// By default the client connects over TCP, speaks HTTP/1.1, and runs its requests
/// on the Tokio runtime it was built inside.
#[derive(Debug)]
pub struct Builder {
    executor: Option<Handle>,
    version: Version,
    config: Http1Config,
    transport: Option<SharedTransport>,
    #[cfg(feature = "tcp")]
    tcp: TcpTransportConfig,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Create a builder with the default settings.
    pub fn new() -> Self {
        Self {
            executor: None,
            version: Version::HTTP_11,
            config: Http1Config::default(),
            transport: None,
            #[cfg(feature = "tcp")]
            tcp: TcpTransportConfig::default(),
        }
    }

    /// Run requests on the runtime behind `handle`.
    pub fn executor(mut self, handle: Handle) -> Self {
        self.executor = Some(handle);
        self
    }

    /// Select the protocol version. Only HTTP/1.1 is supported.
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the size of each read from the connection.
    pub fn packet_size(mut self, packet_size: usize) -> Self {
        self.config.packet_size = packet_size.max(1);
        self
    }

    /// Set the longest status or header line accepted from the server.
    pub fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.config.max_line_length = max_line_length;
        self
    }

    /// Open connections with `transport`.
    pub fn with_transport<T>(mut self, transport: T) -> Self
    where
        T: Connect,
    {
        self.transport = Some(SharedTransport::new(transport));
        self
    }

    /// Configure the default TCP transport.
    ///
    /// Ignored when a transport is supplied with [`with_transport`](Builder::with_transport).
    #[cfg(feature = "tcp")]
    pub fn with_tcp_config(mut self, config: TcpTransportConfig) -> Self {
        self.tcp = config;
        self
    }

    /// Build the client.
    ///
    /// Fails if the protocol version is not supported, or if no executor was given
    /// and the builder is not running inside a Tokio runtime.
    pub fn build(self) -> Result<Client, Error> {
        let codec = HttpCodec::for_version(self.version)?.with_config(self.config);

        let executor = match self.executor {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            #[cfg(feature = "tcp")]
            None => SharedTransport::new(TcpTransport::new(self.tcp)),
            #[cfg(not(feature = "tcp"))]
            None => return Err(Error::Connect("no transport configured".into())),
        };

        Ok(Client {
            inner: Arc::new(Inner {
                transport,
                codec,
                executor,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::mock::{MockChannel, MockTransport};

    fn builder() -> Builder {
        Builder::new().with_transport(MockTransport::new(MockChannel::new()))
    }

    #[test]
    fn build_outside_runtime_needs_executor() {
        assert!(matches!(builder().build(), Err(Error::NoRuntime)));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        assert!(builder().executor(runtime.handle().clone()).build().is_ok());
    }

    #[tokio::test]
    async fn only_http11() {
        assert!(builder().version(Version::HTTP_11).build().is_ok());
        assert!(matches!(
            builder().version(Version::HTTP_2).build(),
            Err(Error::UnsupportedVersion(v)) if v == Version::HTTP_2
        ));
    }
}
