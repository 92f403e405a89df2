//! HTTP request executor used by [`WdaSession`](crate::session::WdaSession).
//!
//! This module provides the [`Transport`] seam and its default implementation,
//! [`HttpTransport`], a thin wrapper around a [`reqwest::Client`] with an
//! explicit timeout. The session never talks to the network directly: it builds
//! an [`HttpRequest`], hands it to a transport, and interprets the raw
//! [`HttpResponse`] bytes itself.
//!
//! Any status code of 400 or above is reported as [`TransportError::Status`]
//! carrying the raw body, so protocol diagnostics survive the failure.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wda_core::transport::{HttpRequest, HttpTransport, Method, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(Duration::from_secs(10))?;
//! let response = transport
//!     .execute(HttpRequest::new(Method::Get, "http://localhost:8100/status"))
//!     .await?;
//! println!("{} bytes", response.body.len());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, debug_span, trace, Instrument};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Timeout applied to a whole request when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bodies longer than this are truncated in error messages.
const ERROR_BODY_PREVIEW: usize = 512;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while executing an HTTP request.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    /// The request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a status code of 400 or above.
    #[error("HTTP status {status}: {}", preview(.body))]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The raw response body.
        body: Vec<u8>,
    },
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() > ERROR_BODY_PREVIEW {
        let mut end = ERROR_BODY_PREVIEW;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.into_owned()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// HTTP verbs used by the device server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    /// Returns the upper-case verb name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A fully resolved request: absolute URL, headers and optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response from the server. Only produced for statuses below 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Executes HTTP requests on behalf of a session.
///
/// Implementations must report statuses of 400 and above as
/// [`TransportError::Status`] and must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the raw response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// [`Transport`] backed by a [`reqwest::Client`].
///
/// Each instance owns its own connection pool; there is no process-wide
/// default client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Builds a transport whose requests fail with [`TransportError::Timeout`]
    /// after `timeout`. A zero timeout selects [`DEFAULT_TIMEOUT`].
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Returns the configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let span = debug_span!("http", method = %request.method, url = %request.url);
        async {
            let mut builder = self
                .client
                .request(request.method.into(), request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                let bytes =
                    serde_json::to_vec(body).map_err(|e| TransportError::Request(e.to_string()))?;
                trace!(body = %body, "request body");
                builder = builder.body(bytes);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            debug!(status, body_bytes = body.len(), "response received");

            if status >= 400 {
                return Err(TransportError::Status { status, body });
            }
            Ok(HttpResponse { status, body })
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
