//! In-memory request bodies.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use super::RequestBody;
use crate::content_type::ContentType;
use crate::packet::{PacketStream, PACKET_SIZE};
use crate::{BoxFuture, Error};

/// A request body held entirely in memory.
///
/// Every call to [`RequestBody::open`] starts a fresh read from the beginning, so the
/// body can be sent any number of times. Packets are zero-copy slices of the content.
#[derive(Debug, Clone)]
pub struct Full {
    content: Bytes,
    content_type: ContentType,
    packet_size: usize,
}

impl Full {
    /// Create a body from raw bytes and their content type.
    pub fn new(content: impl Into<Bytes>, content_type: ContentType) -> Self {
        Self {
            content: content.into(),
            content_type,
            packet_size: PACKET_SIZE,
        }
    }

    /// Create a UTF-8 text body with the given MIME type.
    pub fn text(content: impl Into<String>, mime_type: &str) -> Self {
        let content: String = content.into();
        Self::new(content, ContentType::new(mime_type, Some("UTF-8")))
    }

    /// Set the size of the packets this body is sliced into.
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size.max(1);
        self
    }

    /// The content of this body.
    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

impl RequestBody for Full {
    fn content_length(&self) -> Option<u64> {
        Some(self.content.len() as u64)
    }

    fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    fn open(&self) -> Box<dyn PacketStream> {
        if self.content.len() < self.packet_size {
            Box::new(SinglePacket {
                content: self.content.clone(),
                taken: AtomicBool::new(false),
            })
        } else {
            Box::new(SlicedPackets {
                content: self.content.clone(),
                packet_size: self.packet_size,
                index: Mutex::new(0),
            })
        }
    }
}

/// Hands out the whole content as one packet.
#[derive(Debug)]
struct SinglePacket {
    content: Bytes,
    taken: AtomicBool,
}

impl PacketStream for SinglePacket {
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>> {
        let packet = if self.taken.swap(true, Ordering::AcqRel) {
            Bytes::new()
        } else {
            self.content.clone()
        };
        Box::pin(std::future::ready(Ok(packet)))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        self.taken.store(true, Ordering::Release);
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Hands out the content in `packet_size` slices, tracked by index.
#[derive(Debug)]
struct SlicedPackets {
    content: Bytes,
    packet_size: usize,
    index: Mutex<usize>,
}

impl PacketStream for SlicedPackets {
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>> {
        let mut index = self.index.lock();
        let start = *index;
        let end = self.content.len().min(start + self.packet_size);
        *index = end;
        let packet = self.content.slice(start..end);
        Box::pin(std::future::ready(Ok(packet)))
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        *self.index.lock() = self.content.len();
        Box::pin(std::future::ready(Ok(())))
    }
}

impl From<Bytes> for Full {
    fn from(content: Bytes) -> Self {
        Self::new(content, ContentType::octet_stream())
    }
}

impl From<Vec<u8>> for Full {
    fn from(content: Vec<u8>) -> Self {
        Self::new(content, ContentType::octet_stream())
    }
}

impl From<&'static [u8]> for Full {
    fn from(content: &'static [u8]) -> Self {
        Self::new(content, ContentType::octet_stream())
    }
}

impl From<String> for Full {
    fn from(content: String) -> Self {
        Self::new(content, ContentType::text_utf8())
    }
}

impl From<&'static str> for Full {
    fn from(content: &'static str) -> Self {
        Self::new(content, ContentType::text_utf8())
    }
}
