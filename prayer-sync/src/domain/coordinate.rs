//! Validated WGS84 coordinate pair.
//!
//! Values keep full precision. Rounding to four decimal places (roughly
//! eleven metres) happens only where a coordinate becomes part of a cache key
//! or a cache comparison, never for the value sent to the prayer API.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decimal places kept when coordinates become cache keys.
pub const KEY_PRECISION: i32 = 4;

/// Validation failures for [`Coordinate`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude is not finite or outside `[-90, 90]`.
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    /// Longitude is not finite or outside `[-180, 180]`.
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// Latitude/longitude pair in decimal degrees.
///
/// # Examples
/// ```
/// use prayer_sync::domain::Coordinate;
///
/// let jakarta = Coordinate::new(-6.208_81, 106.845_63).expect("valid coordinate");
/// assert_eq!(jakarta.rounded().latitude(), -6.2088);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CoordinateDto", into = "CoordinateDto")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Validate and build a coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in decimal degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Copy rounded to cache-key precision.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            latitude: round_coordinate(self.latitude),
            longitude: round_coordinate(self.longitude),
        }
    }

    /// Whether both coordinates fall in the same cache cell.
    pub fn same_cell(&self, other: &Self) -> bool {
        self.rounded() == other.rounded()
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Self) -> f64 {
        region_data::haversine_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            format_coordinate(self.latitude),
            format_coordinate(self.longitude)
        )
    }
}

/// Round a degree value to cache-key precision, folding `-0.0` into `0.0`.
pub fn round_coordinate(value: f64) -> f64 {
    let scale = 10_f64.powi(KEY_PRECISION);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Render a degree value at cache-key precision.
///
/// ```
/// use prayer_sync::domain::format_coordinate;
///
/// assert_eq!(format_coordinate(10.000_04), "10.0000");
/// assert_eq!(format_coordinate(-0.000_01), "0.0000");
/// ```
pub fn format_coordinate(value: f64) -> String {
    format!("{:.4}", round_coordinate(value))
}

#[derive(Serialize, Deserialize)]
struct CoordinateDto {
    latitude: f64,
    longitude: f64,
}

impl From<Coordinate> for CoordinateDto {
    fn from(value: Coordinate) -> Self {
        Self {
            latitude: value.latitude,
            longitude: value.longitude,
        }
    }
}

impl TryFrom<CoordinateDto> for Coordinate {
    type Error = CoordinateError;

    fn try_from(value: CoordinateDto) -> Result<Self, Self::Error> {
        Self::new(value.latitude, value.longitude)
    }
}
