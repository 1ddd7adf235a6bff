use std::mem;

use bytes::BytesMut;
use tracing::trace;

use super::{DecodeError, PartialResponse, MAX_LINE_LENGTH};
use crate::header::HeaderMap;
use crate::Error;

/// Incremental decoder for the head of an HTTP/1.x response.
///
/// The caller owns an accumulation buffer, appends each packet read from the
/// connection to it, and calls [`try_decode`](Http1Decoder::try_decode) after every
/// append. The decoder consumes complete lines from the front of the buffer and
/// leaves a trailing partial line in place, remembering how much of it has already
/// been scanned.
///
/// Once the blank line ending the header block is consumed, the decoder returns the
/// [`PartialResponse`]; whatever remains in the buffer is the start of the body.
#[derive(Debug)]
pub struct Http1Decoder {
    max_line_length: usize,
    scanned: usize,
    status: Option<(u16, String)>,
    headers: HeaderMap,
    finished: bool,
}

impl Default for Http1Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Http1Decoder {
    /// Create a decoder with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a decoder which rejects lines longer than `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            scanned: 0,
            status: None,
            headers: HeaderMap::new(),
            finished: false,
        }
    }

    /// Whether the header block has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume every complete line in `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Every call consumes all the
    /// complete lines available, so `Ok(None)` always means the buffer holds at most
    /// an unterminated line. After the response head has been returned, later calls
    /// leave the buffer untouched and return `Ok(None)`.
    pub fn try_decode(&mut self, buf: &mut BytesMut) -> Result<Option<PartialResponse>, DecodeError> {
        while !self.finished {
            let start = self.scanned.min(buf.len());
            let Some(offset) = buf[start..].windows(2).position(|pair| pair == b"\r\n") else {
                if buf.len() > self.max_line_length {
                    return Err(DecodeError::LineTooLong {
                        limit: self.max_line_length,
                    });
                }
                // A trailing '\r' may be completed by the next packet.
                self.scanned = buf.len().saturating_sub(1);
                return Ok(None);
            };

            let end = start + offset;
            if end > self.max_line_length {
                return Err(DecodeError::LineTooLong {
                    limit: self.max_line_length,
                });
            }

            let line = buf.split_to(end + 2);
            self.scanned = 0;

            if let Some(response) = self.decode_line(latin1(&line[..end]))? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    fn decode_line(&mut self, line: String) -> Result<Option<PartialResponse>, DecodeError> {
        if self.status.is_none() {
            let (status, message) = parse_status_line(line)?;
            trace!(status, %message, "decoded status line");
            self.status = Some((status, message));
            return Ok(None);
        }

        if line.is_empty() {
            self.finished = true;
            let (status, message) = self.status.take().unwrap_or_default();
            let headers = mem::take(&mut self.headers);
            trace!(status, headers = headers.len(), "decoded response head");
            return Ok(Some(PartialResponse {
                status,
                message,
                headers,
            }));
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(DecodeError::MalformedHeader(line));
        };
        let name = name.trim_matches(is_whitespace);
        let value = value.trim_matches(is_whitespace);
        self.headers.append(name, value).map_err(|error| match error {
            Error::InvalidHeaderName(name) => DecodeError::InvalidHeaderName(name),
            Error::InvalidHeaderValue { name, value } => {
                DecodeError::InvalidHeaderValue { name, value }
            }
            _ => DecodeError::MalformedHeader(line.clone()),
        })?;
        Ok(None)
    }
}

fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn parse_status_line(line: String) -> Result<(u16, String), DecodeError> {
    let mut fields = line.splitn(3, ' ');
    let (Some(version), Some(code), Some(message)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(DecodeError::MalformedStatusLine(line));
    };

    if version != "HTTP/1.0" && version != "HTTP/1.1" {
        return Err(DecodeError::UnsupportedVersion(version.to_owned()));
    }

    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::MalformedStatusLine(line));
    }

    let status = code
        .parse()
        .map_err(|_| DecodeError::MalformedStatusLine(line.clone()))?;
    Ok((status, message.to_owned()))
}
