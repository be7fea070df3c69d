//! Failover, rotation, and timeout behaviour of the fetch layer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::domain::ports::HttpResponse;
use crate::test_support::{MutableClock, Scripted, ScriptedTransport, ok_json};

const EP0: &str = "https://ep0.test/v1";
const EP1: &str = "https://ep1.test/v1";
const EP2: &str = "https://ep2.test/v1";

fn config(retry_attempts: u32) -> FetchConfig {
    FetchConfig {
        endpoints: [EP0, EP1, EP2]
            .iter()
            .map(|raw| Url::parse(raw).expect("endpoint url"))
            .collect(),
        request_timeout: Duration::from_secs(8),
        retry_attempts,
        endpoints_per_attempt: 2,
    }
}

fn clock() -> Arc<MutableClock> {
    Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0)
            .single()
            .expect("valid instant"),
    ))
}

fn ok_payload(tag: &str) -> HttpResponse {
    ok_json(&json!({ "code": 200, "status": "OK", "data": { "from": tag } }))
}

#[fixture]
fn transport() -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new())
}

fn fetcher(transport: &Arc<ScriptedTransport>, retry_attempts: u32) -> ResilientFetcher {
    ResilientFetcher::new(transport.clone(), clock(), config(retry_attempts))
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn timed_out_endpoint_fails_over_to_next(transport: Arc<ScriptedTransport>) {
    transport
        .route(EP0, Scripted::Delay(Duration::from_secs(60), ok_payload("ep0")))
        .route(EP1, Scripted::Respond(ok_payload("ep1")))
        .route(EP2, Scripted::Respond(ok_payload("ep2")));
    let fetcher = fetcher(&transport, 3);

    let payload = fetcher
        .fetch_with_fallback("timings/01-03-2026", &[])
        .await
        .expect("failover succeeds");

    assert_eq!(payload["data"]["from"], "ep1");
    let health = fetcher.endpoint_health();
    assert_eq!(health[0].failure_count, 1);
    assert!(health[0].last_failure_at.is_some());
    assert_eq!(health[1], EndpointHealth::default());
}

#[rstest]
#[tokio::test]
async fn next_call_starts_at_last_successful_endpoint(transport: Arc<ScriptedTransport>) {
    transport
        .route(EP0, Scripted::Respond(HttpResponse::new(503, "down")))
        .route(EP1, Scripted::Respond(ok_payload("ep1")));
    let fetcher = fetcher(&transport, 3);

    fetcher.fetch_with_fallback("gToH/01-03-2026", &[]).await.expect("first call");
    fetcher.fetch_with_fallback("gToH/01-03-2026", &[]).await.expect("second call");

    assert_eq!(transport.count(EP0), 1);
    assert_eq!(transport.count(EP1), 2);
}

#[rstest]
#[tokio::test]
async fn api_level_error_codes_trigger_failover(transport: Arc<ScriptedTransport>) {
    transport
        .route(
            EP0,
            Scripted::Respond(ok_json(&json!({ "code": 400, "status": "BAD_REQUEST", "data": "Invalid date" }))),
        )
        .route(EP1, Scripted::Respond(ok_payload("ep1")));
    let fetcher = fetcher(&transport, 3);

    let payload = fetcher
        .fetch_with_fallback("timings/01-03-2026", &[])
        .await
        .expect("second endpoint answers");
    assert_eq!(payload["data"]["from"], "ep1");
}

#[rstest]
#[tokio::test]
async fn exhausting_candidates_reports_last_error(transport: Arc<ScriptedTransport>) {
    transport
        .route(EP0, Scripted::Respond(HttpResponse::new(500, "boom")))
        .route(EP1, Scripted::Respond(HttpResponse::new(200, "not json")))
        .route(EP2, Scripted::Respond(ok_payload("ep2")));
    let fetcher = fetcher(&transport, 3);

    let err = fetcher
        .fetch_with_fallback("timings/01-03-2026", &[])
        .await
        .expect_err("both candidates fail");

    match err {
        FetchError::AllEndpointsFailed { attempted, message } => {
            assert_eq!(attempted, 2);
            assert!(message.contains("invalid JSON"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(transport.count(EP2), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn all_timeouts_surface_as_timed_out(transport: Arc<ScriptedTransport>) {
    transport.route("https://", Scripted::Delay(Duration::from_secs(60), ok_payload("late")));
    let fetcher = fetcher(&transport, 3);

    let err = fetcher
        .fetch_with_fallback("timings/01-03-2026", &[])
        .await
        .expect_err("every attempt times out");
    assert!(matches!(err, FetchError::TimedOut { attempted: 2, .. }));
}

#[rstest]
#[tokio::test]
async fn unhealthy_endpoints_are_skipped(transport: Arc<ScriptedTransport>) {
    transport
        .route(EP0, Scripted::Fail(TransportError::transport("connection refused")))
        .route(EP1, Scripted::Fail(TransportError::transport("connection refused")))
        .route(EP2, Scripted::Respond(ok_payload("ep2")));
    let fetcher = fetcher(&transport, 1);

    let _ = fetcher.fetch_with_fallback("timings/01-03-2026", &[]).await;
    let payload = fetcher
        .fetch_with_fallback("timings/01-03-2026", &[])
        .await
        .expect("healthy endpoint answers");

    assert_eq!(payload["data"]["from"], "ep2");
    assert_eq!(transport.count(EP0), 1);
    assert!(!fetcher.endpoint_health()[0].healthy);
}

#[rstest]
#[tokio::test]
async fn query_parameters_keep_full_precision(transport: Arc<ScriptedTransport>) {
    transport.route(EP0, Scripted::Respond(ok_payload("ep0")));
    let fetcher = fetcher(&transport, 3);
    let query = ScheduleQuery::new("timings/01-03-2026")
        .param("latitude", -6.208_812_3)
        .param("longitude", 106.845_6)
        .param("method", 20);

    fetcher.fetch_json(&query).await.expect("fetch succeeds");

    let url = transport.requests()[0].url.to_string();
    assert_eq!(
        url,
        "https://ep0.test/v1/timings/01-03-2026?latitude=-6.2088123&longitude=106.8456&method=20"
    );
}

#[rstest]
#[tokio::test]
async fn empty_endpoint_list_is_invalid() {
    let fetcher = ResilientFetcher::new(
        Arc::new(ScriptedTransport::new()),
        clock(),
        FetchConfig {
            endpoints: Vec::new(),
            ..FetchConfig::default()
        },
    );
    let err = fetcher
        .fetch_with_fallback("timings/01-03-2026", &[])
        .await
        .expect_err("nothing to call");
    assert!(matches!(err, FetchError::InvalidRequest { .. }));
}
