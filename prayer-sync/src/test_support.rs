//! Shared test doubles for unit and integration tests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use serde_json::{Value, json};

use crate::domain::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Clock whose instant only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    /// Start at a UTC instant.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Start at a local wall-clock time.
    pub fn at_local(local: NaiveDateTime) -> Self {
        Self::new(local_to_utc(local))
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    /// Jump to a local wall-clock time.
    pub fn set_local(&self, local: NaiveDateTime) {
        *self.lock_clock() = local_to_utc(local);
    }

    fn lock_clock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

fn local_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&local).earliest() {
        Some(instant) => instant.with_timezone(&Utc),
        None => panic!("{local} does not exist in the local timezone"),
    }
}

/// Build a local date-time from components.
pub fn local_datetime(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    match date.and_hms_opt(hour, minute, 0) {
        Some(value) => value,
        None => panic!("invalid time {hour}:{minute}"),
    }
}

/// Build a date from components.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(value) => value,
        None => panic!("invalid date {year}-{month}-{day}"),
    }
}

/// Behaviour scripted for URLs starting with a prefix.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer immediately.
    Respond(HttpResponse),
    /// Fail immediately.
    Fail(TransportError),
    /// Answer after sleeping on the tokio clock.
    Delay(Duration, HttpResponse),
}

/// Transport answering from a list of URL-prefix routes.
///
/// Later routes take precedence, so tests can override earlier behaviour.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, Scripted)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Empty transport; every request fails until routes are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script behaviour for URLs starting with `prefix`.
    pub fn route(&self, prefix: impl Into<String>, behaviour: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((prefix.into(), behaviour));
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.url.as_str().starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let behaviour = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(prefix, _)| request.url.as_str().starts_with(prefix.as_str()))
            .map(|(_, behaviour)| behaviour.clone());
        match behaviour {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(TransportError::transport(format!(
                "no scripted route for {}",
                request.url
            ))),
        }
    }
}

/// Timings used across scenarios.
pub const SAMPLE_TIMINGS: [(&str, &str); 5] = [
    ("Fajr", "04:30"),
    ("Dhuhr", "12:00"),
    ("Asr", "15:20"),
    ("Maghrib", "18:05"),
    ("Isha", "19:15"),
];

/// One day object as found inside timings and calendar responses.
pub fn day_payload(date: NaiveDate, timings: &[(&str, &str)]) -> Value {
    let timings: serde_json::Map<String, Value> = timings
        .iter()
        .map(|(name, time)| ((*name).to_owned(), Value::String(format!("{time} (WIB)"))))
        .collect();
    json!({
        "timings": timings,
        "date": {
            "readable": date.format("%d %b %Y").to_string(),
            "gregorian": { "date": date.format("%d-%m-%Y").to_string() },
            "hijri": hijri_payload(),
        },
        "meta": { "method": { "id": 20 } },
    })
}

/// Hijri block shared by the payload builders.
pub fn hijri_payload() -> Value {
    json!({
        "date": "12-09-1447",
        "day": "12",
        "month": { "number": 9, "en": "Ramaḍān", "ar": "رَمَضان" },
        "year": "1447",
    })
}

/// Successful `timings/{date}` envelope.
pub fn timings_payload(date: NaiveDate, timings: &[(&str, &str)]) -> Value {
    json!({ "code": 200, "status": "OK", "data": day_payload(date, timings) })
}

/// Successful `calendar/{year}/{month}` envelope.
pub fn calendar_payload(days: &[NaiveDate], timings: &[(&str, &str)]) -> Value {
    let data: Vec<Value> = days.iter().map(|day| day_payload(*day, timings)).collect();
    json!({ "code": 200, "status": "OK", "data": data })
}

/// Successful `gToH/{date}` envelope.
pub fn gtoh_payload(date: NaiveDate) -> Value {
    json!({
        "code": 200,
        "status": "OK",
        "data": {
            "gregorian": { "date": date.format("%d-%m-%Y").to_string() },
            "hijri": hijri_payload(),
        },
    })
}

/// JSON response wrapper for scripted routes.
pub fn ok_json(payload: &Value) -> HttpResponse {
    HttpResponse::json(200, payload)
}

/// Provinces used by the resolver and session tests.
pub const SAMPLE_PROVINCES: &str = r#"[
    {"id": "31", "name": "DKI JAKARTA", "latitude": -6.2, "longitude": 106.8},
    {"id": "32", "name": "JAWA BARAT", "latitude": -6.9, "longitude": 107.6}
]"#;

/// Regencies used by the resolver and session tests. Bogor lacks coordinates.
pub const SAMPLE_REGENCIES: &str = r#"[
    {"id": "3171", "provinceId": "31", "name": "KOTA JAKARTA SELATAN", "latitude": -6.26, "longitude": 106.81},
    {"id": "3173", "provinceId": "31", "name": "KOTA JAKARTA PUSAT", "latitude": "-6.18", "longitude": "106.83"},
    {"id": "3201", "provinceId": "32", "name": "KABUPATEN BOGOR", "latitude": null, "longitude": ""},
    {"id": "3273", "provinceId": "32", "name": "KOTA BANDUNG", "latitude": -6.91, "longitude": 107.61}
]"#;

/// Region lookups over the sample datasets.
pub fn sample_regions() -> crate::outbound::region_catalogue::CatalogueRegions {
    match crate::outbound::region_catalogue::CatalogueRegions::from_json(
        SAMPLE_PROVINCES,
        SAMPLE_REGENCIES,
    ) {
        Ok(regions) => regions,
        Err(error) => panic!("sample datasets must parse: {error}"),
    }
}
