//! Dataset record types and raw JSON decoding.
//!
//! Raw rows are decoded leniently (coordinates may be numbers, numeric
//! strings, empty strings, or `null`) and then validated into [`Province`]
//! and [`Regency`] values.

use serde::{Deserialize, Deserializer};

use crate::error::RegionDataError;

/// First-level administrative division.
#[derive(Debug, Clone, PartialEq)]
pub struct Province {
    id: String,
    name: String,
    coordinates: Option<(f64, f64)>,
}

impl Province {
    /// Stable province identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(latitude, longitude)` when the dataset supplies both.
    #[must_use]
    pub const fn coordinates(&self) -> Option<(f64, f64)> {
        self.coordinates
    }
}

/// Second-level administrative division belonging to a [`Province`].
#[derive(Debug, Clone, PartialEq)]
pub struct Regency {
    id: String,
    province_id: String,
    name: String,
    coordinates: Option<(f64, f64)>,
}

impl Regency {
    /// Stable regency identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier of the owning province.
    #[must_use]
    pub fn province_id(&self) -> &str {
        &self.province_id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(latitude, longitude)` when the dataset supplies both.
    #[must_use]
    pub const fn coordinates(&self) -> Option<(f64, f64)> {
        self.coordinates
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProvince {
    id: IdValue,
    name: String,
    #[serde(default, deserialize_with = "deserialize_coordinate")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_coordinate")]
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawRegency {
    id: IdValue,
    #[serde(alias = "province_id")]
    province_id: IdValue,
    name: String,
    #[serde(default, deserialize_with = "deserialize_coordinate")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_coordinate")]
    longitude: Option<f64>,
}

/// Identifiers appear both as strings and as bare numbers in the wild.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(u64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_owned(),
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCoordinate {
    Number(f64),
    Text(String),
}

fn deserialize_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawCoordinate>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawCoordinate::Number(value)) => Ok(Some(value)),
        Some(RawCoordinate::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawCoordinate::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl RawProvince {
    pub(crate) fn into_province(self) -> Result<Province, RegionDataError> {
        let id = self.id.into_string();
        let coordinates = validate_pair("provinces", &id, self.latitude, self.longitude)?;
        Ok(Province {
            id,
            name: self.name.trim().to_owned(),
            coordinates,
        })
    }
}

impl RawRegency {
    pub(crate) fn into_regency(self) -> Result<Regency, RegionDataError> {
        let id = self.id.into_string();
        let coordinates = validate_pair("regencies", &id, self.latitude, self.longitude)?;
        Ok(Regency {
            id,
            province_id: self.province_id.into_string(),
            name: self.name.trim().to_owned(),
            coordinates,
        })
    }
}

/// Half-specified pairs are treated as missing rather than rejected.
fn validate_pair(
    dataset: &'static str,
    id: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<(f64, f64)>, RegionDataError> {
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Ok(None);
    };
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(RegionDataError::InvalidCoordinate {
            dataset,
            id: id.to_owned(),
            message: format!("latitude {latitude} outside [-90, 90]"),
        });
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(RegionDataError::InvalidCoordinate {
            dataset,
            id: id.to_owned(),
            message: format!("longitude {longitude} outside [-180, 180]"),
        });
    }
    Ok(Some((latitude, longitude)))
}
