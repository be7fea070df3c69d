//! Location value types and their persisted form.

use serde::{Deserialize, Serialize};

use super::LocationError;
use crate::domain::Coordinate;

/// Administrative region (province or regency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Dataset identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent province id for regencies.
    pub parent_id: Option<String>,
    /// Representative point.
    pub coordinates: Coordinate,
}

/// Which priority tier produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// Live device fix.
    Gps,
    /// User selection; wins until cleared.
    Manual,
    /// Configured fallback region.
    Default,
    /// Restored from storage.
    Cached,
}

/// Resolved location. Replaced wholesale on change, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    regency: Option<Region>,
    province: Option<Region>,
    coordinates: Coordinate,
    source: LocationSource,
    timestamp: i64,
}

impl LocationRecord {
    /// Build a record; at least one of `regency` and `province` is required.
    pub fn new(
        regency: Option<Region>,
        province: Option<Region>,
        coordinates: Coordinate,
        source: LocationSource,
        timestamp: i64,
    ) -> Result<Self, LocationError> {
        if regency.is_none() && province.is_none() {
            return Err(LocationError::LocationUnavailable);
        }
        Ok(Self {
            regency,
            province,
            coordinates,
            source,
            timestamp,
        })
    }

    /// Record for a lone regency, positioned at its coordinates.
    pub fn from_regency(regency: Region, source: LocationSource, timestamp: i64) -> Self {
        Self {
            coordinates: regency.coordinates,
            regency: Some(regency),
            province: None,
            source,
            timestamp,
        }
    }

    pub fn regency(&self) -> Option<&Region> {
        self.regency.as_ref()
    }

    pub fn province(&self) -> Option<&Region> {
        self.province.as_ref()
    }

    /// Full-precision coordinates used for API requests.
    pub fn coordinates(&self) -> Coordinate {
        self.coordinates
    }

    pub fn source(&self) -> LocationSource {
        self.source
    }

    /// Resolution time in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Most specific region name, e.g. `"KOTA JAKARTA PUSAT, DKI JAKARTA"`.
    pub fn display_name(&self) -> String {
        match (&self.regency, &self.province) {
            (Some(regency), Some(province)) => format!("{}, {}", regency.name, province.name),
            (Some(region), None) | (None, Some(region)) => region.name.clone(),
            (None, None) => self.coordinates.to_string(),
        }
    }

    /// Same regions and same cache cell, regardless of source or time.
    pub fn same_place(&self, other: &Self) -> bool {
        region_id(self.regency.as_ref()) == region_id(other.regency.as_ref())
            && region_id(self.province.as_ref()) == region_id(other.province.as_ref())
            && self.coordinates.same_cell(&other.coordinates)
    }

    /// Copy relabelled with a different source.
    #[must_use]
    pub fn with_source(&self, source: LocationSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub(super) fn to_persisted(&self) -> PersistedLocation {
        PersistedLocation {
            regency_id: region_id(self.regency.as_ref()).map(str::to_owned),
            province_id: region_id(self.province.as_ref()).map(str::to_owned),
            coordinates: self.coordinates,
            source: self.source,
            timestamp: self.timestamp,
        }
    }
}

fn region_id(region: Option<&Region>) -> Option<&str> {
    region.map(|region| region.id.as_str())
}

/// Stored shape: region ids only, re-joined against the dataset on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PersistedLocation {
    pub(super) regency_id: Option<String>,
    pub(super) province_id: Option<String>,
    pub(super) coordinates: Coordinate,
    pub(super) source: LocationSource,
    pub(super) timestamp: i64,
}
