// src/transport.rs

//! HTTP transport seam and the reqwest-backed default
//!
//! The orchestrator speaks to registries exclusively through the
//! [`HttpTransport`] trait, using crate-local request and response types.
//! That keeps every pipeline testable without a socket and keeps reqwest
//! out of the public API. [`ReqwestTransport`] is the production
//! implementation; it owns a cancellation token that aborts in-flight
//! requests at issue time and between streamed body chunks.
//!
//! The transport performs no retries. Transient network failures surface
//! as [`TransportError::Network`] and are the caller's concern.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Request methods used by the registry surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// Case-insensitive multimap of header names to values
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for a header name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a header name, in insertion order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// An outbound request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An inbound response
///
/// For streamed downloads the body is written to disk and this carries only
/// status and headers; for everything else the body is buffered here.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    /// Body decoded as text, lossily
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Callback receiving (bytes received, total bytes if known) per chunk
pub type ProgressHandler = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Failures below the protocol layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request was cancelled. Propagates unwrapped through every
    /// pipeline stage.
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport abstraction the orchestrator is written against
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a request and buffer the response body.
    async fn send(&self, request: Request) -> Result<Response, TransportError>;

    /// Issue a request, streaming a successful response body to
    /// `destination`. Error response bodies are buffered into the returned
    /// response instead so the caller can classify them.
    async fn download(
        &self,
        request: Request,
        destination: &Path,
        progress: Option<ProgressHandler>,
    ) -> Result<Response, TransportError>;

    /// Abort in-flight and future requests. `deadline` is the grace the
    /// transport may give outstanding work before tearing it down.
    async fn cancel(&self, deadline: Duration);
}

/// Production transport backed by a shared reqwest client
pub struct ReqwestTransport {
    client: reqwest::Client,
    token: CancellationToken,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Build a transport that observes an externally owned token.
    pub fn with_cancellation(token: CancellationToken) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, token })
    }

    fn build(&self, request: &Request) -> reqwest::RequestBuilder {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
    }

    async fn issue(&self, request: &Request) -> Result<reqwest::Response, TransportError> {
        if self.token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        debug!(method = ?request.method, url = %request.url, "issuing request");
        let send = self.build(request).send();
        tokio::select! {
            _ = self.token.cancelled() => Err(TransportError::Cancelled),
            result = send => result.map_err(map_reqwest_error),
        }
    }

    fn read_headers(response: &reqwest::Response) -> Headers {
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }
        headers
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let response = self.issue(&request).await?;
        let status = response.status().as_u16();
        let headers = Self::read_headers(&response);
        let body = tokio::select! {
            _ = self.token.cancelled() => return Err(TransportError::Cancelled),
            bytes = response.bytes() => bytes.map_err(map_reqwest_error)?,
        };
        debug!(status, url = %request.url, bytes = body.len(), "response received");
        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    async fn download(
        &self,
        request: Request,
        destination: &Path,
        progress: Option<ProgressHandler>,
    ) -> Result<Response, TransportError> {
        let mut response = self.issue(&request).await?;
        let status = response.status().as_u16();
        let headers = Self::read_headers(&response);

        if !response.status().is_success() {
            let body = tokio::select! {
                _ = self.token.cancelled() => return Err(TransportError::Cancelled),
                bytes = response.bytes() => bytes.map_err(map_reqwest_error)?,
            };
            return Ok(Response {
                status,
                headers,
                body: body.to_vec(),
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(destination).await?;
        let mut downloaded: u64 = 0;
        loop {
            let chunk = tokio::select! {
                _ = self.token.cancelled() => return Err(TransportError::Cancelled),
                chunk = response.chunk() => chunk.map_err(map_reqwest_error)?,
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(progress) = &progress {
                progress(downloaded, total);
            }
        }
        file.flush().await?;
        debug!(url = %request.url, bytes = downloaded, path = %destination.display(), "download complete");

        Ok(Response {
            status,
            headers,
            body: Vec::new(),
        })
    }

    async fn cancel(&self, deadline: Duration) {
        debug!(?deadline, "cancelling transport");
        self.token.cancel();
    }
}
