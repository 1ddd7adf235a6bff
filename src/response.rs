//! Incoming responses.

use crate::body::ResponseBody;
use crate::header::HeaderMap;

/// An HTTP response.
///
/// The body, when present, is still bound to the connection the response arrived on;
/// take it with [`into_body`](Response::into_body) to read it.
#[derive(Debug)]
pub struct Response {
    status: u16,
    message: String,
    headers: HeaderMap,
    body: Option<ResponseBody>,
}

impl Response {
    pub(crate) fn new(
        status: u16,
        message: String,
        headers: HeaderMap,
        body: Option<ResponseBody>,
    ) -> Self {
        Self {
            status,
            message,
            headers,
            body,
        }
    }

    /// The status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The reason phrase sent with the status code.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body, without taking it.
    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// Take the body.
    pub fn into_body(self) -> Option<ResponseBody> {
        self.body
    }

    /// 1xx
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 3xx
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// 4xx
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// 5xx
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Either a client or a server error.
    pub fn is_error(&self) -> bool {
        self.is_client_error() || self.is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> Response {
        Response::new(code, String::new(), HeaderMap::new(), None)
    }

    #[test]
    fn classification() {
        let expect = |code, flags: [bool; 6]| {
            let r = status(code);
            assert_eq!(
                [
                    r.is_informational(),
                    r.is_success(),
                    r.is_redirect(),
                    r.is_client_error(),
                    r.is_server_error(),
                    r.is_error(),
                ],
                flags,
                "status {code}"
            );
        };

        expect(100, [true, false, false, false, false, false]);
        expect(199, [true, false, false, false, false, false]);
        expect(200, [false, true, false, false, false, false]);
        expect(302, [false, false, true, false, false, false]);
        expect(404, [false, false, false, true, false, true]);
        expect(503, [false, false, false, false, true, true]);
        expect(600, [false, false, false, false, false, false]);
    }
}
