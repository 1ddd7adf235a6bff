//! The write and read loops of a single request/response exchange.

use bytes::{Buf as _, Bytes, BytesMut};
use http::Method;
use tokio::io::AsyncWriteExt as _;
use tracing::trace;

use crate::codec::{EncodedRequest, Http1Decoder, PartialResponse};
use crate::content_type::ContentType;
use crate::header::{names, HeaderMap};
use crate::packet::{BoxConnection, ChannelPacketSource, PacketStream as _};
use crate::rt::{Step, StepMachine};
use crate::{BoxFuture, Error};

enum Writing {
    Pull,
    Write(Bytes),
    Flush,
}

/// Writes every packet of an encoded request to a connection.
///
/// Each packet is written until it has drained completely, resubmitting whatever a
/// partial write left behind, before the next packet is pulled. The connection is
/// flushed once the encoder runs out of packets.
pub(super) struct WriteRequest<'a> {
    io: &'a mut BoxConnection,
    encoded: &'a EncodedRequest,
    state: Writing,
    written: u64,
}

impl<'a> WriteRequest<'a> {
    pub(super) fn new(io: &'a mut BoxConnection, encoded: &'a EncodedRequest) -> Self {
        Self {
            io,
            encoded,
            state: Writing::Pull,
            written: 0,
        }
    }
}

impl StepMachine for WriteRequest<'_> {
    type Output = u64;

    fn step(&mut self) -> BoxFuture<'_, Result<Step<u64>, Error>> {
        Box::pin(async move {
            match std::mem::replace(&mut self.state, Writing::Pull) {
                Writing::Pull => {
                    let packet = self.encoded.next_packet().await?;
                    self.state = if packet.is_empty() {
                        Writing::Flush
                    } else {
                        Writing::Write(packet)
                    };
                }
                Writing::Write(mut packet) => {
                    let n = self.io.write(&packet).await?;
                    if n == 0 {
                        return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
                    }
                    self.written += n as u64;
                    packet.advance(n);
                    if !packet.is_empty() {
                        trace!(remaining = packet.len(), "partial write");
                        self.state = Writing::Write(packet);
                    }
                }
                Writing::Flush => {
                    self.io.flush().await?;
                    trace!(bytes = self.written, "request written");
                    return Ok(Step::Done(self.written));
                }
            }
            Ok(Step::Continue)
        })
    }
}

/// Reads from a connection until the response head has been decoded.
///
/// Produces the head together with any bytes read past it.
pub(super) struct ReadHead<'a> {
    source: &'a ChannelPacketSource,
    decoder: Http1Decoder,
    buffer: BytesMut,
}

impl<'a> ReadHead<'a> {
    pub(super) fn new(source: &'a ChannelPacketSource, decoder: Http1Decoder) -> Self {
        Self {
            source,
            decoder,
            buffer: BytesMut::new(),
        }
    }
}

impl StepMachine for ReadHead<'_> {
    type Output = (PartialResponse, Bytes);

    fn step(&mut self) -> BoxFuture<'_, Result<Step<Self::Output>, Error>> {
        Box::pin(async move {
            let packet = self.source.read_packet().await?;
            if packet.is_empty() {
                trace!(buffered = self.buffer.len(), "end of input inside response head");
                return Err(Error::PrematureEof);
            }

            self.buffer.extend_from_slice(&packet);
            match self.decoder.try_decode(&mut self.buffer)? {
                Some(head) => {
                    let leftover = self.buffer.split().freeze();
                    Ok(Step::Done((head, leftover)))
                }
                None => Ok(Step::Continue),
            }
        })
    }
}

/// The declared body length.
///
/// A missing, unparseable or negative length is unknown, as are repeated values which
/// disagree.
pub(super) fn content_length(headers: &HeaderMap) -> Option<u64> {
    let mut length = None;
    for value in headers.get_all(names::CONTENT_LENGTH) {
        let parsed: u64 = value.trim().parse().ok()?;
        if length.is_some_and(|length| length != parsed) {
            return None;
        }
        length = Some(parsed);
    }
    length
}

/// The declared media type, `application/octet-stream` when absent.
pub(super) fn content_type(headers: &HeaderMap) -> Result<ContentType, Error> {
    match headers.get(names::CONTENT_TYPE)? {
        Some(value) => Ok(ContentType::parse(value)?),
        None => Ok(ContentType::octet_stream()),
    }
}

/// Whether a response to `method` with `status` carries a body.
pub(super) fn has_body(method: &Method, status: u16) -> bool {
    !(*method == Method::HEAD || (100..200).contains(&status) || status == 204 || status == 304)
}
