//! Tests for domain error construction and conversions.

use rstest::rstest;
use serde_json::json;

use super::*;
use crate::domain::ports::TransportError;

#[rstest]
fn try_new_rejects_blank_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert!(matches!(result, Err(ErrorValidationError::EmptyMessage)));
}

#[rstest]
fn new_substitutes_code_for_blank_message() {
    let err = Error::new(ErrorCode::StorageUnavailable, "");
    assert_eq!(err.message(), "StorageUnavailable");
}

#[rstest]
fn serialises_with_camel_case_and_skips_missing_details() {
    let err = Error::region_not_found("regency 9999 not found");
    let value = serde_json::to_value(&err).expect("serialise");
    assert_eq!(
        value,
        json!({ "code": "region_not_found", "message": "regency 9999 not found" })
    );
}

#[rstest]
fn deserialisation_rejects_blank_message() {
    let result: Result<Error, _> =
        serde_json::from_value(json!({ "code": "internal_error", "message": " " }));
    assert!(result.is_err());
}

#[rstest]
#[case(FetchError::timed_out(2_usize, "8000ms"), ErrorCode::NetworkTimeout)]
#[case(FetchError::all_endpoints_failed(2_usize, "HTTP 502"), ErrorCode::AllEndpointsFailed)]
#[case(FetchError::invalid_request("bad path"), ErrorCode::InvalidRequest)]
fn fetch_errors_map_to_codes(#[case] source: FetchError, #[case] expected: ErrorCode) {
    assert_eq!(Error::from(source).code(), expected);
}

#[rstest]
fn region_not_found_carries_id() {
    let err = Error::from(LocationError::RegionNotFound {
        id: "9999".to_owned(),
    });
    assert_eq!(err.code(), ErrorCode::RegionNotFound);
    assert_eq!(err.details(), Some(&json!({ "id": "9999" })));
}

#[rstest]
#[case(LocationError::GeolocationUnavailable)]
#[case(LocationError::NoNearbyRegion)]
#[case(LocationError::LocationUnavailable)]
fn location_failures_map_to_location_unavailable(#[case] source: LocationError) {
    assert_eq!(Error::from(source).code(), ErrorCode::LocationUnavailable);
}

#[rstest]
fn schedule_api_errors_keep_their_category() {
    let err = Error::from(ScheduleError::ApiLogical {
        message: "code 400".to_owned(),
    });
    assert_eq!(err.code(), ErrorCode::ApiLogicalError);
}

#[rstest]
fn proxy_timeouts_are_network_timeouts() {
    let err = Error::from(ProxyError::Network(TransportError::timeout("slow")));
    assert_eq!(err.code(), ErrorCode::NetworkTimeout);
}

#[rstest]
fn storage_errors_map_to_storage_unavailable() {
    assert_eq!(
        Error::from(StorageError::unavailable()).code(),
        ErrorCode::StorageUnavailable
    );
}
