//! Shared helpers for integration tests against a local HTTP API.

use std::time::Duration;

use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Base URL of a mock server's `/v1` API root.
pub fn api_root(server: &MockServer) -> Url {
    Url::parse(&format!("{}/v1", server.uri())).expect("mock server uri is valid")
}

/// Answer every `timings/...` request with `payload`.
pub async fn serve_timings(server: &MockServer, status: u16, payload: Value) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/timings/\d{2}-\d{2}-\d{4}$"))
        .respond_with(ResponseTemplate::new(status).set_body_json(payload))
        .mount(server)
        .await;
}

/// Envelope the API sends for a logical failure.
pub fn failure_envelope() -> Value {
    json!({ "code": 400, "status": "BAD_REQUEST", "data": "Invalid date" })
}

/// Request deadline short enough to keep failing cases quick.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
