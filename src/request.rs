//! Outgoing requests.

use std::fmt;
use std::sync::Arc;

use http::{Method, Uri};

use crate::body::{Full, RequestBody};
use crate::header::{self, names, HeaderMap};
use crate::Error;

/// An HTTP request, ready to be executed by a [`Client`](crate::Client).
///
/// Requests are immutable once built, and can be executed more than once: each
/// execution opens the body afresh.
#[derive(Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Arc<dyn RequestBody>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|body| body.content_type().to_string()))
            .finish()
    }
}

impl Request {
    /// Start building a request.
    pub fn builder(method: Method, uri: Uri) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }

    /// A `GET` request for `uri`.
    pub fn get(uri: Uri) -> Result<Self, Error> {
        Self::builder(Method::GET, uri).build()
    }

    /// A `HEAD` request for `uri`.
    pub fn head(uri: Uri) -> Result<Self, Error> {
        Self::builder(Method::HEAD, uri).build()
    }

    /// A `DELETE` request for `uri`.
    pub fn delete(uri: Uri) -> Result<Self, Error> {
        Self::builder(Method::DELETE, uri).build()
    }

    /// A `POST` request for `uri` carrying `body`.
    pub fn post(uri: Uri, body: impl Into<Full>) -> Result<Self, Error> {
        Self::builder(Method::POST, uri).body(body.into()).build()
    }

    /// A `PUT` request for `uri` carrying `body`.
    pub fn put(uri: Uri, body: impl Into<Full>) -> Result<Self, Error> {
        Self::builder(Method::PUT, uri).body(body.into()).build()
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The headers set by the caller.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&Arc<dyn RequestBody>> {
        self.body.as_ref()
    }
}

/// Whether requests with this method may carry a body.
///
/// `POST`, `PUT` and `PATCH` may, as may extension methods. The other standard
/// methods may not.
pub fn method_allows_body(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET
            | Method::HEAD
            | Method::DELETE
            | Method::CONNECT
            | Method::OPTIONS
            | Method::TRACE
    )
}

/// Builder for a [`Request`].
///
/// Errors from individual steps are held until [`build`](RequestBuilder::build).
#[derive(Debug)]
pub struct RequestBuilder {
    request: Result<Request, Error>,
}

impl RequestBuilder {
    /// Start a request with the given method and target.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            request: Ok(Request {
                method,
                uri,
                headers: HeaderMap::new(),
                body: None,
            }),
        }
    }

    /// Add a header value. Repeated names accumulate values.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(request) = &mut self.request {
            if let Err(error) = request.headers.append(name, value) {
                self.request = Err(error);
            }
        }
        self
    }

    /// Replace all the headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        if let Ok(request) = &mut self.request {
            request.headers = headers;
        }
        self
    }

    /// Set the body.
    pub fn body<B>(self, body: B) -> Self
    where
        B: RequestBody + 'static,
    {
        self.shared_body(Arc::new(body))
    }

    /// Set a body which may be shared with other requests.
    pub fn shared_body(mut self, body: Arc<dyn RequestBody>) -> Self {
        if let Ok(request) = &mut self.request {
            request.body = Some(body);
        }
        self
    }

    /// Check the request and finish building it.
    pub fn build(self) -> Result<Request, Error> {
        let request = self.request?;

        if request.body.is_some() && !method_allows_body(&request.method) {
            return Err(Error::BodyNotAllowed(request.method));
        }

        match request.uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => return Err(Error::InvalidScheme),
        }

        if request.uri.host().map_or(true, str::is_empty) {
            return Err(Error::MissingHost);
        }

        // The body's media type goes on the wire as a header value.
        if let Some(body) = &request.body {
            let content_type = body.content_type().to_string();
            if !header::is_valid_value(&content_type) {
                return Err(Error::InvalidHeaderValue {
                    name: names::CONTENT_TYPE.into(),
                    value: content_type,
                });
            }
        }

        Ok(request)
    }
}
