//! Runtime settings loaded via OrthoConfig.
//!
//! Every field is optional; accessors supply defaults and the `to_*_config`
//! helpers turn the flat settings into typed component configs.

use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::fetch::DEFAULT_ENDPOINTS;
use crate::domain::{
    Coordinate, CoordinateError, FetchConfig, ProxyConfig, ResolverConfig, ScheduleConfig,
    SessionConfig,
};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_CALCULATION_METHOD: u32 = 20;
const DEFAULT_IMSAK_OFFSET_MINUTES: u32 = 10;
const DEFAULT_SCHEDULE_TTL_HOURS: u64 = 24;
const DEFAULT_REGION_ID: &str = "3171";
const DEFAULT_LATITUDE: f64 = -6.2088;
const DEFAULT_LONGITUDE: f64 = 106.8456;
const DEFAULT_GPS_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_COUNTDOWN_INTERVAL_MS: u64 = 1_000;
const DEFAULT_STORAGE_DIR: &str = "./.prayer-sync";
const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_CACHE_VERSION: &str = "v1";
const DEFAULT_REGION_DATA_DIR: &str = "./data";
const STORAGE_NAMESPACE: &str = "prayer";

/// Settings that cannot be turned into component configs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// An API endpoint is not an absolute URL.
    #[error("invalid API endpoint `{value}`: {message}")]
    InvalidEndpoint { value: String, message: String },
    /// The endpoint list is empty.
    #[error("at least one API endpoint is required")]
    NoEndpoints,
    /// Configured coordinates are out of range.
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
    /// Only one of `latitude`/`longitude` is set.
    #[error("latitude and longitude must be set together")]
    PartialCoordinate,
}

/// Settings for the prayer-time sync core.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PRAYER_SYNC")]
pub struct Settings {
    /// Comma-separated API base URLs in preference order.
    pub api_endpoints: Option<String>,
    /// Per-endpoint request deadline in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Consecutive failures before an endpoint is marked unhealthy.
    pub retry_attempts: Option<u32>,
    /// Calculation method id sent to the API.
    pub calculation_method: Option<u32>,
    /// Minutes before Fajr used when the API omits Imsak.
    pub imsak_offset_minutes: Option<u32>,
    /// Lifetime of cached schedules in hours.
    pub schedule_ttl_hours: Option<u64>,
    /// Region used when no other location is known.
    pub default_region_id: Option<String>,
    /// Latitude of the last-resort location.
    pub default_latitude: Option<f64>,
    /// Longitude of the last-resort location.
    pub default_longitude: Option<f64>,
    /// GPS wait in milliseconds.
    pub gps_timeout_ms: Option<u64>,
    /// Countdown period in milliseconds.
    pub countdown_interval_ms: Option<u64>,
    /// Directory holding persistent storage and response caches.
    pub storage_dir: Option<PathBuf>,
    /// Storage quota in bytes.
    pub storage_quota_bytes: Option<usize>,
    /// Offline cache version marker.
    pub cache_version: Option<String>,
    /// Directory containing `provinces.json` and `regencies.json`.
    pub region_data_dir: Option<PathBuf>,
    /// Device latitude; acts as the GPS fix when set.
    pub latitude: Option<f64>,
    /// Device longitude; acts as the GPS fix when set.
    pub longitude: Option<f64>,
}

impl Settings {
    /// Configured endpoints, or the public mirrors.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidEndpoint`] for unparsable entries and
    /// [`SettingsError::NoEndpoints`] when the list is blank.
    pub fn api_endpoints(&self) -> Result<Vec<Url>, SettingsError> {
        let raw: Vec<String> = match &self.api_endpoints {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_owned)
                .collect(),
            None => DEFAULT_ENDPOINTS.iter().map(|&entry| entry.to_owned()).collect(),
        };
        if raw.is_empty() {
            return Err(SettingsError::NoEndpoints);
        }
        raw.into_iter()
            .map(|value| {
                Url::parse(&value).map_err(|err| SettingsError::InvalidEndpoint {
                    message: err.to_string(),
                    value,
                })
            })
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS)
    }

    pub fn calculation_method(&self) -> u32 {
        self.calculation_method.unwrap_or(DEFAULT_CALCULATION_METHOD)
    }

    pub fn imsak_offset_minutes(&self) -> u32 {
        self.imsak_offset_minutes
            .unwrap_or(DEFAULT_IMSAK_OFFSET_MINUTES)
    }

    pub fn schedule_ttl(&self) -> Duration {
        let hours = self.schedule_ttl_hours.unwrap_or(DEFAULT_SCHEDULE_TTL_HOURS);
        Duration::from_secs(hours.saturating_mul(3600))
    }

    pub fn default_region_id(&self) -> &str {
        self.default_region_id
            .as_deref()
            .unwrap_or(DEFAULT_REGION_ID)
    }

    /// Last-resort coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Coordinate`] when out of range.
    pub fn default_coordinate(&self) -> Result<Coordinate, SettingsError> {
        Ok(Coordinate::new(
            self.default_latitude.unwrap_or(DEFAULT_LATITUDE),
            self.default_longitude.unwrap_or(DEFAULT_LONGITUDE),
        )?)
    }

    pub fn gps_timeout(&self) -> Duration {
        Duration::from_millis(self.gps_timeout_ms.unwrap_or(DEFAULT_GPS_TIMEOUT_MS))
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(
            self.countdown_interval_ms
                .unwrap_or(DEFAULT_COUNTDOWN_INTERVAL_MS),
        )
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR))
    }

    pub fn storage_quota_bytes(&self) -> usize {
        self.storage_quota_bytes
            .unwrap_or(DEFAULT_STORAGE_QUOTA_BYTES)
    }

    pub fn cache_version(&self) -> &str {
        self.cache_version
            .as_deref()
            .unwrap_or(DEFAULT_CACHE_VERSION)
    }

    pub fn region_data_dir(&self) -> PathBuf {
        self.region_data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGION_DATA_DIR))
    }

    /// Configured device position, if both halves are set.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::PartialCoordinate`] when only one half is
    /// set and [`SettingsError::Coordinate`] when out of range.
    pub fn device_coordinate(&self) -> Result<Option<Coordinate>, SettingsError> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Some(Coordinate::new(latitude, longitude)?)),
            (None, None) => Ok(None),
            _ => Err(SettingsError::PartialCoordinate),
        }
    }

    /// # Errors
    ///
    /// Propagates [`Settings::api_endpoints`] failures.
    pub fn to_fetch_config(&self) -> Result<FetchConfig, SettingsError> {
        Ok(FetchConfig {
            endpoints: self.api_endpoints()?,
            request_timeout: self.request_timeout(),
            retry_attempts: self.retry_attempts(),
            ..FetchConfig::default()
        })
    }

    pub fn to_schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            calculation_method: self.calculation_method(),
            imsak_offset_minutes: self.imsak_offset_minutes(),
            schedule_ttl: self.schedule_ttl(),
        }
    }

    /// # Errors
    ///
    /// Propagates [`Settings::default_coordinate`] failures.
    pub fn to_resolver_config(&self) -> Result<ResolverConfig, SettingsError> {
        Ok(ResolverConfig {
            default_region_id: self.default_region_id().to_owned(),
            default_coordinate: self.default_coordinate()?,
            gps_timeout: self.gps_timeout(),
        })
    }

    /// Proxy config treating every configured endpoint host as the API.
    ///
    /// # Errors
    ///
    /// Propagates [`Settings::api_endpoints`] failures.
    pub fn to_proxy_config(&self) -> Result<ProxyConfig, SettingsError> {
        let mut api_hosts: Vec<String> = self
            .api_endpoints()?
            .iter()
            .filter_map(|url| url.host_str().map(str::to_owned))
            .collect();
        api_hosts.dedup();
        Ok(ProxyConfig {
            version: self.cache_version().to_owned(),
            api_hosts,
            ..ProxyConfig::default()
        })
    }

    /// # Errors
    ///
    /// Returns the first component config failure.
    pub fn to_session_config(&self) -> Result<SessionConfig, SettingsError> {
        Ok(SessionConfig {
            fetch: self.to_fetch_config()?,
            schedule: self.to_schedule_config(),
            resolver: self.to_resolver_config()?,
            proxy: self.to_proxy_config()?,
            countdown_interval: self.countdown_interval(),
            storage_namespace: STORAGE_NAMESPACE.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing and defaults.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 6] = [
        "PRAYER_SYNC_API_ENDPOINTS",
        "PRAYER_SYNC_REQUEST_TIMEOUT_MS",
        "PRAYER_SYNC_CACHE_VERSION",
        "PRAYER_SYNC_LATITUDE",
        "PRAYER_SYNC_LONGITUDE",
        "PRAYER_SYNC_DEFAULT_REGION_ID",
    ];

    fn cleared() -> Vec<(&'static str, Option<String>)> {
        VARS.iter().map(|name| (*name, None::<String>)).collect()
    }

    fn from_fields(fields: serde_json::Value) -> Settings {
        serde_json::from_value(fields).expect("fields deserialize")
    }

    fn load_from_empty_args() -> Settings {
        Settings::load_from_iter([OsString::from("prayer-sync")]).expect("config should load")
    }

    #[rstest]
    fn defaults_are_used_when_missing() {
        let _guard = lock_env(cleared());

        let settings = load_from_empty_args();
        let config = settings.to_session_config().expect("valid defaults");

        assert_eq!(config.fetch.endpoints.len(), 3);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(8));
        assert_eq!(config.fetch.retry_attempts, 3);
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.resolver.default_region_id, "3171");
        assert_eq!(config.proxy.version, "v1");
        assert_eq!(config.proxy.api_hosts.len(), 3);
        assert_eq!(config.countdown_interval, Duration::from_secs(1));
        assert_eq!(settings.storage_quota_bytes(), 5 * 1024 * 1024);
        assert_eq!(settings.device_coordinate(), Ok(None));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let mut vars = cleared();
        vars.extend([
            (
                "PRAYER_SYNC_API_ENDPOINTS",
                Some("https://a.test/v1, https://b.test/v1".to_owned()),
            ),
            ("PRAYER_SYNC_REQUEST_TIMEOUT_MS", Some("2500".to_owned())),
            ("PRAYER_SYNC_CACHE_VERSION", Some("v7".to_owned())),
            ("PRAYER_SYNC_LATITUDE", Some("-6.9147".to_owned())),
            ("PRAYER_SYNC_LONGITUDE", Some("107.6098".to_owned())),
            ("PRAYER_SYNC_DEFAULT_REGION_ID", Some("3273".to_owned())),
        ]);
        let _guard = lock_env(vars);

        let settings = load_from_empty_args();
        let fetch = settings.to_fetch_config().expect("valid endpoints");
        let proxy = settings.to_proxy_config().expect("valid endpoints");

        assert_eq!(
            fetch
                .endpoints
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>(),
            vec!["https://a.test/v1", "https://b.test/v1"]
        );
        assert_eq!(fetch.request_timeout, Duration::from_millis(2500));
        assert_eq!(proxy.version, "v7");
        assert_eq!(proxy.api_hosts, vec!["a.test", "b.test"]);
        assert_eq!(settings.default_region_id(), "3273");
        assert!(settings.device_coordinate().expect("valid").is_some());
    }

    #[rstest]
    #[case(Some("not a url"))]
    #[case(Some(" , "))]
    fn unusable_endpoint_lists_are_rejected(#[case] endpoints: Option<&str>) {
        let settings = from_fields(serde_json::json!({ "api_endpoints": endpoints }));
        assert!(settings.to_fetch_config().is_err());
    }

    #[rstest]
    fn half_a_device_coordinate_is_rejected() {
        let settings = from_fields(serde_json::json!({ "latitude": -6.2 }));
        assert_eq!(
            settings.device_coordinate(),
            Err(SettingsError::PartialCoordinate)
        );
    }

    #[rstest]
    fn out_of_range_defaults_are_rejected() {
        let settings = from_fields(serde_json::json!({ "default_latitude": 123.0 }));
        assert!(matches!(
            settings.to_resolver_config(),
            Err(SettingsError::Coordinate(_))
        ));
    }
}
