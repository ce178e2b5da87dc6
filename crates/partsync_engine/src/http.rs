//! HTTP transport implementation.
//!
//! The HTTP client is abstracted via [`HttpClient`] so the same transport
//! runs over `reqwest` in production and over an in-process
//! [`LoopbackServer`] in tests.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use partsync_protocol::{PullRequest, PullResponse, PushRequest};
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;

/// Longest server error body kept in a [`SyncError::ServerError`].
const MAX_ERROR_BODY: usize = 256;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Creates a response with a status and a text body.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into().into_bytes(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// `Err` means no response was received at all (connection refused, DNS
/// failure, timeout). Any status code, 5xx included, is an `Ok`.
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// HTTP-based sync transport speaking JSON.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the backend (e.g. `https://api.example.com/api`).
    base_url: String,
    /// HTTP client implementation.
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport. A trailing slash on the base URL is ignored.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn post_json(&self, endpoint: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, body)
            .map_err(SyncError::transport_retryable)?;

        if !response.is_success() {
            let mut message = String::from_utf8_lossy(&response.body).into_owned();
            if message.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                message.truncate(end);
            }
            tracing::debug!(%url, status = response.status, "request rejected");
            return Err(SyncError::ServerError {
                status: response.status,
                message,
            });
        }

        Ok(response.body)
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let body = self.post_json("/sync/pull", request.encode()?)?;
        Ok(PullResponse::decode(&body)?)
    }

    fn push(&self, request: &PushRequest) -> SyncResult<()> {
        // Any 2xx is success; the body is not inspected.
        self.post_json("/sync/push", request.encode()?)?;
        Ok(())
    }
}

/// [`HttpClient`] on top of `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    auth_token: Option<String>,
}

impl ReqwestClient {
    /// Creates a client with a request timeout and an optional bearer token.
    pub fn new(timeout: Duration, auth_token: Option<String>) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, auth_token })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request to `path` (e.g. `/sync/pull`).
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        (**self).handle_post(path, body)
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        Ok(self.server.handle_post(path, &body))
    }
}
