//! Priority-chain, manual override, and device-follow behaviour.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rstest::rstest;
use tokio::sync::mpsc::UnboundedSender;

use super::*;
use crate::domain::{SubscriberError, SyncEventKind};
use crate::domain::ports::MockGeolocationProvider;
use crate::outbound::geolocation::{FixedGeolocation, UnsupportedGeolocation};
use crate::outbound::region_catalogue::CatalogueRegions;
use crate::outbound::storage::MemoryStorage;
use crate::test_support::{MutableClock, SAMPLE_PROVINCES, sample_regions};

fn coordinate(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::new(latitude, longitude).expect("valid coordinate")
}

fn bandung_fix() -> GeoFix {
    GeoFix::new(coordinate(-6.915, 107.607))
}

fn config(default_region_id: &str) -> ResolverConfig {
    ResolverConfig {
        default_region_id: default_region_id.to_owned(),
        default_coordinate: coordinate(-6.2088, 106.8456),
        gps_timeout: Duration::from_secs(10),
    }
}

struct Harness {
    storage: Arc<MemoryStorage>,
    events: Arc<EventBus>,
    resolver: Arc<LocationResolver>,
}

fn harness_with(
    geolocation: Arc<dyn GeolocationProvider>,
    regions: Arc<dyn RegionLookup>,
    storage: Arc<MemoryStorage>,
    default_region_id: &str,
) -> Harness {
    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0)
            .single()
            .expect("valid instant"),
    ));
    let store = Arc::new(ExpiringStore::new(storage.clone(), clock.clone(), "prayer"));
    let events = Arc::new(EventBus::new());
    let resolver = Arc::new(LocationResolver::new(
        regions,
        geolocation,
        store,
        clock,
        events.clone(),
        config(default_region_id),
    ));
    Harness {
        storage,
        events,
        resolver,
    }
}

fn harness(geolocation: Arc<dyn GeolocationProvider>) -> Harness {
    harness_with(
        geolocation,
        Arc::new(sample_regions()),
        Arc::new(MemoryStorage::new()),
        "3171",
    )
}

struct HangingGeolocation;

#[async_trait]
impl GeolocationProvider for HangingGeolocation {
    fn is_supported(&self) -> bool {
        true
    }

    async fn current_position(&self, _timeout: Duration) -> Result<GeoFix, GeolocationError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(GeolocationError::timeout())
    }

    fn watch_position(&self, _sink: UnboundedSender<GeoFix>) -> Result<WatchId, GeolocationError> {
        Err(GeolocationError::unsupported())
    }

    fn clear_watch(&self, _id: WatchId) {}
}

#[rstest]
#[tokio::test]
async fn gps_fix_resolves_to_nearest_regency_and_its_province() {
    let h = harness(Arc::new(FixedGeolocation::new(bandung_fix())));

    let record = h.resolver.detect_location().await.expect("gps resolves");

    assert_eq!(record.regency().map(|r| r.id.as_str()), Some("3273"));
    assert_eq!(record.province().map(|r| r.id.as_str()), Some("32"));
    assert_eq!(record.source(), LocationSource::Gps);
    assert_eq!(record.coordinates(), bandung_fix().coordinate);
}

#[rstest]
#[case(
    Arc::new(UnsupportedGeolocation) as Arc<dyn GeolocationProvider>,
    LocationError::GeolocationUnavailable
)]
#[case(
    Arc::new(FixedGeolocation::failing(GeolocationError::permission_denied())) as Arc<dyn GeolocationProvider>,
    LocationError::GeolocationDeniedOrTimedOut { reason: "geolocation permission denied".to_owned() }
)]
#[tokio::test]
async fn detect_location_classifies_provider_failures(
    #[case] geolocation: Arc<dyn GeolocationProvider>,
    #[case] expected: LocationError,
) {
    let h = harness(geolocation);
    assert_eq!(h.resolver.detect_location().await, Err(expected));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn hung_provider_times_out() {
    let h = harness(Arc::new(HangingGeolocation));
    let err = h.resolver.detect_location().await.expect_err("times out");
    assert!(matches!(err, LocationError::GeolocationDeniedOrTimedOut { .. }));
}

#[rstest]
#[tokio::test]
async fn dataset_without_coordinates_reports_no_nearby_region() {
    let regions = CatalogueRegions::from_json(
        SAMPLE_PROVINCES,
        r#"[{"id": "3201", "provinceId": "32", "name": "KABUPATEN BOGOR"}]"#,
    )
    .expect("datasets parse");
    let h = harness_with(
        Arc::new(FixedGeolocation::new(bandung_fix())),
        Arc::new(regions),
        Arc::new(MemoryStorage::new()),
        "3201",
    );

    assert_eq!(
        h.resolver.detect_location().await,
        Err(LocationError::NoNearbyRegion)
    );
}

#[rstest]
#[tokio::test]
async fn failed_gps_falls_back_to_saved_record_as_cached() {
    let storage = Arc::new(MemoryStorage::new());
    let first = harness_with(
        Arc::new(FixedGeolocation::new(bandung_fix())),
        Arc::new(sample_regions()),
        storage.clone(),
        "3171",
    );
    first.resolver.get_location().await;

    let second = harness_with(
        Arc::new(FixedGeolocation::failing(GeolocationError::timeout())),
        Arc::new(sample_regions()),
        storage,
        "3171",
    );
    let record = second.resolver.get_location().await;

    assert_eq!(record.source(), LocationSource::Cached);
    assert_eq!(record.regency().map(|r| r.id.as_str()), Some("3273"));
    assert_eq!(second.resolver.status(), ResolverStatus::Resolved);
}

#[rstest]
#[tokio::test]
async fn nothing_saved_falls_back_to_default_region() {
    let h = harness(Arc::new(UnsupportedGeolocation));
    assert_eq!(h.resolver.status(), ResolverStatus::Unresolved);

    let record = h.resolver.get_location().await;

    assert_eq!(record.source(), LocationSource::Default);
    assert_eq!(record.regency().map(|r| r.id.as_str()), Some("3171"));
    assert_eq!(record.province().map(|r| r.id.as_str()), Some("31"));
}

#[rstest]
#[tokio::test]
async fn missing_default_region_still_yields_best_effort_record() {
    let h = harness_with(
        Arc::new(UnsupportedGeolocation),
        Arc::new(sample_regions()),
        Arc::new(MemoryStorage::new()),
        "0000",
    );

    let record = h.resolver.get_location().await;

    assert_eq!(record.source(), LocationSource::Default);
    assert_eq!(record.coordinates(), coordinate(-6.2088, 106.8456));
}

#[rstest]
fn fast_path_never_touches_geolocation() {
    let mut geolocation = MockGeolocationProvider::new();
    geolocation.expect_is_supported().never();
    geolocation.expect_current_position().never();
    let h = harness(Arc::new(geolocation));

    let record = h.resolver.get_location_fast();

    assert_eq!(record.source(), LocationSource::Default);
}

#[rstest]
#[tokio::test]
async fn manual_selection_wins_over_gps_and_survives_restart() {
    let storage = Arc::new(MemoryStorage::new());
    let first = harness_with(
        Arc::new(FixedGeolocation::new(bandung_fix())),
        Arc::new(sample_regions()),
        storage.clone(),
        "3171",
    );
    first.resolver.set_by_region_id("3173").expect("known regency");
    assert_eq!(
        first.resolver.get_location().await.source(),
        LocationSource::Manual
    );

    let mut geolocation = MockGeolocationProvider::new();
    geolocation.expect_is_supported().never();
    let second = harness_with(
        Arc::new(geolocation),
        Arc::new(sample_regions()),
        storage,
        "3171",
    );
    let record = second.resolver.get_location().await;
    assert_eq!(record.source(), LocationSource::Manual);
    assert_eq!(record.regency().map(|r| r.id.as_str()), Some("3173"));
    assert!(second.resolver.retry_gps().await.is_none());
}

#[rstest]
fn persisted_location_keeps_ids_only() {
    let h = harness(Arc::new(UnsupportedGeolocation));
    h.resolver.set_by_region_id("3273").expect("known regency");

    let raw = h.storage.raw("prayer:location").expect("persisted");
    assert!(raw.contains(r#""regencyId":"3273""#), "{raw}");
    assert!(raw.contains(r#""provinceId":"32""#), "{raw}");
    assert!(!raw.contains("BANDUNG"), "{raw}");
}

#[rstest]
fn manual_setters_validate_input() {
    let h = harness(Arc::new(UnsupportedGeolocation));

    assert_eq!(
        h.resolver.set_by_region_id("9999"),
        Err(LocationError::RegionNotFound {
            id: "9999".to_owned()
        })
    );
    assert!(matches!(
        h.resolver.set_by_coordinates(95.0, 0.0),
        Err(LocationError::InvalidCoordinate(_))
    ));
    let province = h.resolver.set_by_province_id("32").expect("known province");
    assert!(province.regency().is_none());
    assert_eq!(province.display_name(), "JAWA BARAT");
}

#[rstest]
fn province_without_own_point_is_selectable() {
    let regions = CatalogueRegions::from_json(
        r#"[{"id": "32", "name": "JAWA BARAT"}]"#,
        r#"[{"id": "3273", "provinceId": "32", "name": "KOTA BANDUNG", "latitude": -6.91, "longitude": 107.61}]"#,
    )
    .expect("datasets parse");
    let h = harness_with(
        Arc::new(UnsupportedGeolocation),
        Arc::new(regions),
        Arc::new(MemoryStorage::new()),
        "3273",
    );

    let record = h
        .resolver
        .set_by_province_id("32")
        .expect("province resolves through its regencies");

    assert_eq!(record.coordinates(), coordinate(-6.91, 107.61));
    assert_eq!(record.display_name(), "JAWA BARAT");
}

#[rstest]
fn set_by_coordinates_keeps_exact_point() {
    let h = harness(Arc::new(UnsupportedGeolocation));
    let record = h
        .resolver
        .set_by_coordinates(-6.181_234_5, 106.829_876)
        .expect("valid point");

    assert_eq!(record.regency().map(|r| r.id.as_str()), Some("3173"));
    assert_eq!(record.coordinates().latitude(), -6.181_234_5);
}

#[rstest]
fn location_changes_are_announced_after_initial_resolution() {
    let h = harness(Arc::new(UnsupportedGeolocation));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    h.events.subscribe(SyncEventKind::LocationChanged, move |event| {
        if let SyncEvent::LocationChanged(record) = event {
            sink.lock().expect("sink").push(record.display_name());
        }
        Ok(())
    });

    h.resolver.get_location_fast();
    h.resolver.set_by_region_id("3171").expect("same as default");
    h.resolver.set_by_region_id("3273").expect("bandung");

    assert_eq!(
        *seen.lock().expect("sink"),
        vec!["KOTA BANDUNG, JAWA BARAT".to_owned()]
    );
}

#[rstest]
#[tokio::test]
async fn clear_manual_re_runs_the_chain() {
    let h = harness(Arc::new(FixedGeolocation::new(bandung_fix())));
    h.resolver.set_by_region_id("3173").expect("known regency");

    let record = h.resolver.clear_manual().await;

    assert_eq!(record.source(), LocationSource::Gps);
    assert_eq!(record.regency().map(|r| r.id.as_str()), Some("3273"));
}

#[rstest]
#[tokio::test]
async fn clearing_manual_selection_announces_the_restored_location() {
    let h = harness(Arc::new(UnsupportedGeolocation));
    h.resolver.set_by_region_id("3273").expect("bandung");
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    h.events.subscribe(SyncEventKind::LocationChanged, move |event| {
        if let SyncEvent::LocationChanged(record) = event {
            sink.lock().expect("sink").push(record.clone());
        }
        Ok(())
    });

    let record = h.resolver.clear_manual().await;

    assert_eq!(record.source(), LocationSource::Default);
    let seen = seen.lock().expect("sink");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].regency().map(|r| r.id.as_str()), Some("3171"));
}

#[rstest]
#[tokio::test]
async fn clearing_manual_selection_of_the_same_place_stays_quiet() {
    let h = harness(Arc::new(UnsupportedGeolocation));
    h.resolver.set_by_region_id("3171").expect("default regency");
    let seen = Arc::new(std::sync::Mutex::new(0_usize));
    let sink = seen.clone();
    h.events.subscribe(SyncEventKind::LocationChanged, move |_| {
        *sink.lock().expect("sink") += 1;
        Ok(())
    });

    h.resolver.clear_manual().await;

    assert_eq!(*seen.lock().expect("sink"), 0);
}

#[rstest]
#[tokio::test]
async fn following_applies_fixes_until_released() {
    let geolocation = Arc::new(FixedGeolocation::new(bandung_fix()));
    let h = harness(geolocation.clone());
    h.resolver.get_location_fast();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    h.events.subscribe(SyncEventKind::LocationChanged, move |event| {
        tx.send(event.clone()).map_err(|_| SubscriberError::new("closed"))
    });

    let follow = h.resolver.follow_device().expect("watch starts");
    geolocation.move_to(bandung_fix());
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event arrives")
        .expect("channel open");
    assert!(matches!(event, SyncEvent::LocationChanged(ref record) if record.source() == LocationSource::Gps));

    assert_eq!(geolocation.active_watches(), 1);
    follow.release();
    assert_eq!(geolocation.active_watches(), 0);
}
