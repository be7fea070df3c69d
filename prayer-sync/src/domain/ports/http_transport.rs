//! Driven port for issuing HTTP requests.
//!
//! The port carries raw status and body bytes; deciding what counts as a
//! failure (non-2xx, API-level error codes) belongs to the callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::define_port_error;

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Programmatic fetch (API calls, scripts, assets).
    Fetch,
    /// Top-level document navigation.
    Navigate,
}

/// Outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Fully qualified request URL.
    pub url: Url,
    /// Request initiation mode.
    pub mode: RequestMode,
}

impl HttpRequest {
    /// Build a programmatic GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            mode: RequestMode::Fetch,
        }
    }

    /// Build a document navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            url,
            mode: RequestMode::Navigate,
        }
    }
}

/// Response returned by a transport or replayed from a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Build a response from status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// Build a JSON response.
    pub fn json(status: u16, payload: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_owned()),
            body: payload.to_string().into_bytes(),
        }
    }

    /// Attach a content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

define_port_error! {
    /// Errors surfaced by HTTP transports.
    pub enum TransportError {
        /// The transport gave up waiting for a response.
        Timeout { message: String } => "request timed out: {message}",
        /// Connection, TLS, or body read failure.
        Transport { message: String } => "transport failed: {message}",
    }
}

/// Port for issuing HTTP GET requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request and return the response, whatever its status.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let response = transport
    ///     .send(&HttpRequest::get("https://api.aladhan.com/v1/timings/01-03-2026".parse()?))
    ///     .await?;
    /// assert!(response.is_success());
    /// ```
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}
