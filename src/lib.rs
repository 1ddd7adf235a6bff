//! Postmark
//!
//! An HTTP/1.1 client engine which speaks the wire protocol one packet at a time.
//!
//! Requests are encoded into an ordered sequence of packets and written to a raw
//! connection; responses are decoded incrementally from whatever chunks the connection
//! happens to deliver. The response body stays bound to the connection it arrived on,
//! and reading stops exactly at the declared `Content-Length`, so the bytes of any
//! following response are left untouched.
//!
//! # Example
//! ```no_run
//! # use postmark::Client;
//! # async fn run() -> Result<(), postmark::Error> {
//! let client = Client::builder().build()?;
//! let response = client.get("http://example.com/".parse()?).await?;
//! println!("{} {}", response.status(), response.message());
//! if let Some(body) = response.into_body() {
//!     println!("{}", body.text().await?);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod body;
pub mod client;
pub mod codec;
pub mod content_type;
mod error;
pub mod header;
pub mod packet;
pub mod request;
pub mod response;
pub mod rt;

pub use body::{RequestBody, ResponseBody};
pub use client::Client;
pub use content_type::ContentType;
pub use error::Error;
pub use header::HeaderMap;
pub use request::Request;
pub use response::Response;

/// A boxed error which can be sent across threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A boxed future which can be sent across threads.
pub type BoxFuture<'a, T> = futures_util::future::BoxFuture<'a, T>;
