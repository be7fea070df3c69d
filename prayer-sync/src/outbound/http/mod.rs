//! Reqwest-backed HTTP transport.
//!
//! This adapter owns transport details only: timeouts, headers, and error
//! mapping. Any status is returned as a response; deciding what counts as a
//! failure belongs to the proxy and fetch layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

use crate::domain::ports::{HttpRequest, HttpResponse, HttpTransport, RequestMode, TransportError};

const DEFAULT_USER_AGENT: &str = concat!("prayer-sync/", env!("CARGO_PKG_VERSION"));

/// Transport performing real GET requests.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    user_agent: String,
}

impl ReqwestTransport {
    /// Build a transport whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Replace the `User-Agent` header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let accept = match request.mode {
            RequestMode::Navigate => "text/html,*/*;q=0.8",
            RequestMode::Fetch => "application/json,*/*;q=0.8",
        };
        let response = self
            .client
            .get(request.url.clone())
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(map_transport_error)?;
        Ok(HttpResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else {
        TransportError::transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn endpoint(server: &MockServer, suffix: &str) -> Url {
        Url::parse(&format!("{}{suffix}", server.uri())).expect("valid url")
    }

    #[rstest]
    #[tokio::test]
    async fn returns_status_content_type_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/timings/01-03-2026"))
            .and(query_param("latitude", "-6.2088"))
            .and(header_regex("accept", "^application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 200 })))
            .expect(1)
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).expect("client");

        let response = transport
            .send(&HttpRequest::get(endpoint(
                &server,
                "/v1/timings/01-03-2026?latitude=-6.2088",
            )))
            .await
            .expect("response");

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        let payload: serde_json::Value =
            serde_json::from_slice(&response.body).expect("json body");
        assert_eq!(payload["code"], 200);
    }

    #[rstest]
    #[tokio::test]
    async fn error_statuses_are_responses_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).expect("client");

        let response = transport
            .send(&HttpRequest::get(endpoint(&server, "/v1/timings/x")))
            .await
            .expect("response");

        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        assert_eq!(response.body, b"busy".to_vec());
    }

    #[rstest]
    #[tokio::test]
    async fn slow_servers_map_to_timeouts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new(Duration::from_millis(100)).expect("client");

        let err = transport
            .send(&HttpRequest::get(endpoint(&server, "/slow")))
            .await
            .expect_err("timed out");

        assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
    }

    #[rstest]
    #[tokio::test]
    async fn unreachable_hosts_map_to_transport_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let transport = ReqwestTransport::new(Duration::from_secs(5)).expect("client");

        let err = transport
            .send(&HttpRequest::get(
                Url::parse(&format!("http://{addr}/v1")).expect("valid url"),
            ))
            .await
            .expect_err("connection refused");

        assert!(matches!(err, TransportError::Transport { .. }), "{err:?}");
    }

    #[rstest]
    #[tokio::test]
    async fn navigations_ask_for_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_regex("accept", "^text/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).expect("client");

        let response = transport
            .send(&HttpRequest::navigate(endpoint(&server, "/")))
            .await
            .expect("response");
        assert!(response.is_success());
    }
}
