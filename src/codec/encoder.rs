use std::fmt;
use std::sync::Arc;
use std::vec;

use bytes::{BufMut as _, Bytes, BytesMut};
use http::Uri;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::body::RequestBody;
use crate::header::names;
use crate::packet::PacketStream;
use crate::request::Request;
use crate::{BoxFuture, Error};

/// Encodes requests as HTTP/1.1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Http1Encoder {
    _priv: (),
}

impl Http1Encoder {
    /// Create an encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare `request` to be written, as a stream of packets.
    ///
    /// The `Host` header is always derived from the request URI. When the request has
    /// a body, `Content-Length` (if the body knows its length) and `Content-Type` are
    /// derived from the body. These replace any values the caller set.
    pub fn encode(&self, request: &Request) -> EncodedRequest {
        let mut line = BytesMut::new();
        line.put_slice(request.method().as_str().as_bytes());
        line.put_u8(b' ');
        line.put_slice(request_target(request.uri()).as_bytes());
        line.put_slice(b" HTTP/1.1\r\n");

        let mut synthesized = vec![(names::HOST, host_header(request.uri()))];
        if let Some(body) = request.body() {
            if let Some(length) = body.content_length() {
                synthesized.push((names::CONTENT_LENGTH, length.to_string()));
            }
            synthesized.push((names::CONTENT_TYPE, body.content_type().to_string()));
        }

        let mut headers: Vec<(String, String)> = request
            .headers()
            .iter()
            .filter(|(name, _)| {
                !synthesized
                    .iter()
                    .any(|(replaced, _)| replaced.eq_ignore_ascii_case(name))
            })
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        headers.extend(
            synthesized
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value)),
        );
        headers.sort_by_cached_key(|(name, _)| name.to_ascii_lowercase());

        EncodedRequest {
            body: request.body().cloned(),
            state: Mutex::new(State::RequestLine {
                line: line.freeze(),
                headers,
            }),
        }
    }
}

fn request_target(uri: &Uri) -> String {
    let path = match uri.path() {
        "" => "/",
        path => path,
    };
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    }
}

fn host_header(uri: &Uri) -> String {
    let host = uri.host().unwrap_or_default();
    match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}

fn latin1_line(name: &str, value: &str) -> Bytes {
    let mut line = BytesMut::with_capacity(name.len() + value.len() + 4);
    for c in name.chars().chain(": ".chars()).chain(value.chars()) {
        // Every header on a built request has been checked against the header grammar,
        // which only admits single octets.
        let octet = u8::try_from(u32::from(c));
        debug_assert!(octet.is_ok(), "header character {c:?} is not an octet");
        line.put_u8(octet.unwrap_or(b'?'));
    }
    line.put_slice(b"\r\n");
    line.freeze()
}

enum State {
    RequestLine {
        line: Bytes,
        headers: Vec<(String, String)>,
    },
    Headers(vec::IntoIter<(String, String)>),
    Body(Box<dyn PacketStream>),
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::RequestLine { .. } => "request-line",
            State::Headers(_) => "headers",
            State::Body(_) => "body",
            State::Closed => "closed",
        }
    }
}

/// A request being encoded, one packet at a time.
///
/// Packets are the request line, then one packet per header line, then the blank
/// line, then the packets of the body. An empty packet follows the last of them.
pub struct EncodedRequest {
    body: Option<Arc<dyn RequestBody>>,
    state: Mutex<State>,
}

impl fmt::Debug for EncodedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.try_lock().map(|state| state.name()).unwrap_or("busy");
        f.debug_struct("EncodedRequest")
            .field("state", &state)
            .finish()
    }
}

impl EncodedRequest {
    async fn encode_next(&self) -> Result<Bytes, Error> {
        let mut state = self.state.lock().await;
        let (packet, next) = match std::mem::replace(&mut *state, State::Closed) {
            State::RequestLine { line, headers } => (line, State::Headers(headers.into_iter())),
            State::Headers(mut headers) => match headers.next() {
                Some((name, value)) => (latin1_line(&name, &value), State::Headers(headers)),
                None => {
                    let next = match &self.body {
                        Some(body) => State::Body(body.open()),
                        None => State::Closed,
                    };
                    (Bytes::from_static(b"\r\n"), next)
                }
            },
            State::Body(stream) => match stream.next_packet().await {
                Ok(packet) if packet.is_empty() => {
                    close_body(stream).await;
                    (packet, State::Closed)
                }
                Ok(packet) => (packet, State::Body(stream)),
                Err(error) => {
                    close_body(stream).await;
                    return Err(error);
                }
            },
            State::Closed => (Bytes::new(), State::Closed),
        };
        trace!(bytes = packet.len(), state = next.name(), "encoded packet");
        *state = next;
        Ok(packet)
    }

    async fn shutdown(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if let State::Body(stream) = std::mem::replace(&mut *state, State::Closed) {
            stream.close().await?;
        }
        Ok(())
    }
}

async fn close_body(stream: Box<dyn PacketStream>) {
    if let Err(error) = stream.close().await {
        warn!("error closing request body: {error}");
    }
}

impl PacketStream for EncodedRequest {
    fn next_packet(&self) -> BoxFuture<'_, Result<Bytes, Error>> {
        Box::pin(self.encode_next())
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::body::Full;
    use crate::content_type::ContentType;
    use crate::packet;

    assert_impl_all!(EncodedRequest: PacketStream, Send, Sync);

    async fn packets(encoded: &EncodedRequest) -> Vec<Bytes> {
        let mut packets = Vec::new();
        loop {
            let packet = encoded.next_packet().await.unwrap();
            if packet.is_empty() {
                return packets;
            }
            packets.push(packet);
        }
    }

    #[tokio::test]
    async fn get_without_body() {
        let _ = tracing_subscriber::fmt::try_init();

        let request = Request::get("http://host/path".parse().unwrap()).unwrap();
        let encoded = Http1Encoder::new().encode(&request);

        assert_eq!(
            packets(&encoded).await,
            vec![
                Bytes::from("GET /path HTTP/1.1\r\n"),
                Bytes::from("Host: host\r\n"),
                Bytes::from("\r\n"),
            ]
        );
        for _ in 0..3 {
            assert!(encoded.next_packet().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn empty_path_and_query() {
        let encoder = Http1Encoder::new();

        let request = Request::get("http://example.com:8080".parse().unwrap()).unwrap();
        let wire = packet::collect(&encoder.encode(&request)).await.unwrap();
        assert_eq!(wire, "GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n");

        let request = Request::get("http://example.com/search?q=a&b".parse().unwrap()).unwrap();
        let wire = packet::collect(&encoder.encode(&request)).await.unwrap();
        assert_eq!(wire, "GET /search?q=a&b HTTP/1.1\r\nHost: example.com\r\n\r\n");
    }

    #[tokio::test]
    async fn post_with_body_headers() {
        let request = Request::builder(http::Method::POST, "http://h/submit".parse().unwrap())
            .header("X-Trace", "abc")
            .header("content-length", "999")
            .header("Host", "elsewhere")
            .body(Full::new("{}", ContentType::new("application/json", Some("UTF-8"))))
            .build()
            .unwrap();

        let wire = packet::collect(&Http1Encoder::new().encode(&request)).await.unwrap();
        assert_eq!(
            wire,
            "POST /submit HTTP/1.1\r\n\
             Content-Length: 2\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\
             Host: h\r\n\
             X-Trace: abc\r\n\
             \r\n\
             {}"
        );
    }

    #[tokio::test]
    async fn large_body_follows_in_packets() {
        let content = vec![b'x'; 10];
        let request = Request::builder(http::Method::PUT, "http://h/".parse().unwrap())
            .body(Full::from(content).with_packet_size(4))
            .build()
            .unwrap();

        let encoded = Http1Encoder::new().encode(&request);
        let packets = packets(&encoded).await;
        let body: Vec<usize> = packets[packets.len() - 3..].iter().map(Bytes::len).collect();
        assert_eq!(body, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn repeated_headers_keep_their_order() {
        let request = Request::builder(http::Method::GET, "http://h/".parse().unwrap())
            .header("Accept", "text/html")
            .header("accept", "*/*")
            .build()
            .unwrap();

        let wire = packet::collect(&Http1Encoder::new().encode(&request)).await.unwrap();
        assert_eq!(
            wire,
            "GET / HTTP/1.1\r\nAccept: text/html\r\nAccept: */*\r\nHost: h\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn synthesized_headers_are_valid_lines() {
        let body = Full::new("x", ContentType::new("text/plain", Some("utf-8")));
        let request = Request::builder(http::Method::POST, "http://h:81/".parse().unwrap())
            .body(body)
            .build()
            .unwrap();

        let encoded = Http1Encoder::new().encode(&request);
        let packets = packets(&encoded).await;
        let header_lines = &packets[1..packets.len() - 2];
        assert_eq!(
            header_lines,
            [
                Bytes::from("Content-Length: 1\r\n"),
                Bytes::from("Content-Type: text/plain; charset=utf-8\r\n"),
                Bytes::from("Host: h:81\r\n"),
            ]
        );
        for line in header_lines {
            let text = std::str::from_utf8(&line[..line.len() - 2]).unwrap();
            let (name, value) = text.split_once(": ").unwrap();
            assert!(crate::header::is_valid_name(name));
            assert!(crate::header::is_valid_value(value));
        }
    }

    #[test]
    fn bodies_with_invalid_media_types_never_reach_the_encoder() {
        let body = Full::text("x", "text/plain\r\n\r\nGET /evil HTTP/1.1");
        let result = Request::builder(http::Method::POST, "http://h/".parse().unwrap())
            .body(body)
            .build();
        assert!(matches!(
            result,
            Err(Error::InvalidHeaderValue { name, .. }) if name == "Content-Type"
        ));
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let request = Request::post("http://h/".parse().unwrap(), "payload").unwrap();
        let encoded = Http1Encoder::new().encode(&request);

        assert_eq!(encoded.next_packet().await.unwrap(), "POST / HTTP/1.1\r\n");
        encoded.close().await.unwrap();
        assert!(encoded.next_packet().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requests_can_be_encoded_twice() {
        let request = Request::post("http://h/".parse().unwrap(), "payload").unwrap();
        let encoder = Http1Encoder::new();
        let first = packet::collect(&encoder.encode(&request)).await.unwrap();
        let second = packet::collect(&encoder.encode(&request)).await.unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(b"\r\n\r\npayload"));
    }
}
