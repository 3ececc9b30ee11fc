//! [`reqwest`]-backed implementation of [`HttpClient`].

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture};
use reqwest::header::CONTENT_TYPE;

use super::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::{config::TransportOptions, error::TransportError};

/// Error type for the reqwest-based HTTP client.
#[derive(Debug, thiserror::Error)]
#[error("HTTP request failed: {0}")]
pub struct ReqwestHttpError(#[from] reqwest::Error);

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client configured from the transport options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::HttpClient`] if the TLS backend cannot be
    /// initialised.
    pub fn from_options(options: &TransportOptions) -> Result<Self, TransportError> {
        // Redirects are not followed: a 3xx reaches the session as sent.
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if options.skip_tls_validation {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }

        let inner = builder
            .build()
            .map_err(|e| TransportError::HttpClient(e.to_string()))?;

        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestHttpClient {
    type Error = ReqwestHttpError;

    fn request(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, Self::Error>> {
        let mut builder = match request.method {
            HttpMethod::Get => self.inner.get(&request.url),
            HttpMethod::Post => self.inner.post(&request.url),
        };
        for (name, value) in request.headers.pairs() {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        async move {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let body: Bytes = resp.bytes().await?;

            Ok(HttpResponse { status, body })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_options() {
        assert!(ReqwestHttpClient::from_options(&TransportOptions::default()).is_ok());
    }

    #[test]
    fn builds_with_tls_bypass_and_timeout() {
        let options = TransportOptions::default()
            .with_skip_tls_validation(true)
            .with_request_timeout(core::time::Duration::from_secs(30));
        assert!(ReqwestHttpClient::from_options(&options).is_ok());
    }
}
