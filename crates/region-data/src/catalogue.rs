//! Indexed province/regency catalogue.

use std::collections::HashMap;
use std::path::Path;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs::Dir};
use serde::de::DeserializeOwned;

use crate::dataset::{Province, RawProvince, RawRegency, Regency};
use crate::error::RegionDataError;
use crate::geo::haversine_km;

const PROVINCES_FILE: &str = "provinces.json";
const REGENCIES_FILE: &str = "regencies.json";

/// Result of a nearest-regency search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestRegency<'a> {
    /// Closest regency with coordinates.
    pub regency: &'a Regency,
    /// Great-circle distance from the query point.
    pub distance_km: f64,
}

/// Validated, id-indexed view over both datasets.
///
/// Iteration order is the dataset order; nearest-neighbour ties resolve to
/// the entry that appears first.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalogue {
    provinces: Vec<Province>,
    regencies: Vec<Regency>,
    province_index: HashMap<String, usize>,
    regency_index: HashMap<String, usize>,
}

impl RegionCatalogue {
    /// Parses both datasets from JSON strings.
    ///
    /// # Errors
    ///
    /// Returns [`RegionDataError`] when either document is malformed, an id
    /// repeats, a coordinate is out of range, or a regency references an
    /// unknown province.
    pub fn from_json(provinces_json: &str, regencies_json: &str) -> Result<Self, RegionDataError> {
        let raw_provinces: Vec<RawProvince> = parse("provinces", provinces_json)?;
        let raw_regencies: Vec<RawRegency> = parse("regencies", regencies_json)?;

        let provinces = raw_provinces
            .into_iter()
            .map(RawProvince::into_province)
            .collect::<Result<Vec<_>, _>>()?;
        let regencies = raw_regencies
            .into_iter()
            .map(RawRegency::into_regency)
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_parts(provinces, regencies)
    }

    /// Loads `provinces.json` and `regencies.json` from a directory.
    ///
    /// # Errors
    ///
    /// Returns [`RegionDataError::Io`] when a file cannot be read, otherwise
    /// the same errors as [`RegionCatalogue::from_json`].
    pub fn from_dir(dir: &Utf8Path) -> Result<Self, RegionDataError> {
        let directory =
            Dir::open_ambient_dir(dir, ambient_authority()).map_err(|err| RegionDataError::Io {
                path: dir.as_std_path().to_path_buf(),
                message: err.to_string(),
            })?;
        let provinces = read_file(&directory, dir, PROVINCES_FILE)?;
        let regencies = read_file(&directory, dir, REGENCIES_FILE)?;
        Self::from_json(&provinces, &regencies)
    }

    fn from_parts(
        provinces: Vec<Province>,
        regencies: Vec<Regency>,
    ) -> Result<Self, RegionDataError> {
        let mut province_index = HashMap::with_capacity(provinces.len());
        for (position, province) in provinces.iter().enumerate() {
            if province_index
                .insert(province.id().to_owned(), position)
                .is_some()
            {
                return Err(RegionDataError::DuplicateId {
                    dataset: "provinces",
                    id: province.id().to_owned(),
                });
            }
        }

        let mut regency_index = HashMap::with_capacity(regencies.len());
        for (position, regency) in regencies.iter().enumerate() {
            if !province_index.contains_key(regency.province_id()) {
                return Err(RegionDataError::UnknownProvince {
                    regency_id: regency.id().to_owned(),
                    province_id: regency.province_id().to_owned(),
                });
            }
            if regency_index
                .insert(regency.id().to_owned(), position)
                .is_some()
            {
                return Err(RegionDataError::DuplicateId {
                    dataset: "regencies",
                    id: regency.id().to_owned(),
                });
            }
        }

        Ok(Self {
            provinces,
            regencies,
            province_index,
            regency_index,
        })
    }

    /// All provinces in dataset order.
    #[must_use]
    pub fn provinces(&self) -> &[Province] {
        &self.provinces
    }

    /// All regencies in dataset order.
    #[must_use]
    pub fn regencies(&self) -> &[Regency] {
        &self.regencies
    }

    /// Looks up a province by id.
    #[must_use]
    pub fn province(&self, id: &str) -> Option<&Province> {
        self.province_index
            .get(id)
            .and_then(|position| self.provinces.get(*position))
    }

    /// Looks up a regency by id.
    #[must_use]
    pub fn regency(&self, id: &str) -> Option<&Regency> {
        self.regency_index
            .get(id)
            .and_then(|position| self.regencies.get(*position))
    }

    /// Regencies belonging to `province_id`, in dataset order.
    pub fn regencies_in<'a>(&'a self, province_id: &'a str) -> impl Iterator<Item = &'a Regency> {
        self.regencies
            .iter()
            .filter(move |regency| regency.province_id() == province_id)
    }

    /// Finds the regency closest to the given point.
    ///
    /// Entries without coordinates are skipped. Returns `None` when no
    /// regency has coordinates.
    #[must_use]
    pub fn nearest_regency(&self, latitude: f64, longitude: f64) -> Option<NearestRegency<'_>> {
        let mut best: Option<NearestRegency<'_>> = None;
        for regency in &self.regencies {
            let Some((lat, lng)) = regency.coordinates() else {
                continue;
            };
            let distance_km = haversine_km(latitude, longitude, lat, lng);
            // Strictly smaller wins so earlier entries keep ties.
            let closer = best
                .as_ref()
                .is_none_or(|current| distance_km < current.distance_km);
            if closer {
                best = Some(NearestRegency {
                    regency,
                    distance_km,
                });
            }
        }
        best
    }
}

fn parse<T: DeserializeOwned>(dataset: &'static str, json: &str) -> Result<T, RegionDataError> {
    serde_json::from_str(json).map_err(|err| RegionDataError::Parse {
        dataset,
        message: err.to_string(),
    })
}

fn read_file(directory: &Dir, dir: &Utf8Path, name: &str) -> Result<String, RegionDataError> {
    directory
        .read_to_string(Path::new(name))
        .map_err(|err| RegionDataError::Io {
            path: dir.as_std_path().join(name),
            message: err.to_string(),
        })
}
