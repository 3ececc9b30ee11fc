//! Generic HTTP client trait for the poll transport.
//!
//! This abstracts over the HTTP client implementation so the session can be
//! driven by [`reqwest`](https://docs.rs/reqwest) in production and by a
//! scripted client in tests.

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::config::RequestHeaders;

#[cfg(feature = "reqwest")]
mod reqwest_client;

#[cfg(feature = "reqwest")]
pub use reqwest_client::{ReqwestHttpClient, ReqwestHttpError};

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Poll with an empty body.
    Get,

    /// Deliver queued egress bytes.
    Post,
}

/// One outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// The verb.
    pub method: HttpMethod,

    /// The full target URL.
    pub url: String,

    /// Headers to send, in order.
    pub headers: RequestHeaders,

    /// `Content-Type` of the body, if any.
    pub content_type: Option<&'static str>,

    /// The request body.
    pub body: Bytes,
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The response body bytes.
    pub body: Bytes,
}

/// A minimal async HTTP client.
///
/// Implementations handle the mechanics of making HTTP requests (TLS,
/// connection handling, etc.). The returned future resolves exactly once.
/// An `Err` means no HTTP response was received at all.
pub trait HttpClient: Clone + Send + Sync + 'static {
    /// The error type for HTTP operations.
    type Error: core::error::Error + Send + 'static;

    /// Send a request and return the response.
    fn request(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Self::Error>>;
}
