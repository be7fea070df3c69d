//! [`RegionLookup`] over the `region-data` catalogue.

use camino::Utf8Path;
use region_data::{Province, RegionCatalogue, RegionDataError, Regency};

use crate::domain::ports::RegionLookup;
use crate::domain::{Coordinate, Region};

/// Region lookups backed by the province/regency datasets.
///
/// Regencies without their own coordinates borrow their province's point so
/// that a manual selection of such a regency can still be fetched. A province
/// without a point uses the centroid of its located regencies.
#[derive(Debug, Clone)]
pub struct CatalogueRegions {
    catalogue: RegionCatalogue,
}

impl CatalogueRegions {
    /// Wrap an already loaded catalogue.
    pub fn new(catalogue: RegionCatalogue) -> Self {
        Self { catalogue }
    }

    /// Load `provinces.json` and `regencies.json` from `dir`.
    pub fn from_dir(dir: &Utf8Path) -> Result<Self, RegionDataError> {
        RegionCatalogue::from_dir(dir).map(Self::new)
    }

    /// Parse the two datasets from strings.
    pub fn from_json(provinces: &str, regencies: &str) -> Result<Self, RegionDataError> {
        RegionCatalogue::from_json(provinces, regencies).map(Self::new)
    }

    fn province_region(&self, province: &Province) -> Option<Region> {
        let coordinates = self.province_point(province)?;
        Some(Region {
            id: province.id().to_owned(),
            name: province.name().to_owned(),
            parent_id: None,
            coordinates,
        })
    }

    fn regency_region(&self, regency: &Regency) -> Option<Region> {
        let coordinates = to_coordinate(regency.coordinates()).or_else(|| {
            self.catalogue
                .province(regency.province_id())
                .and_then(|province| self.province_point(province))
        })?;
        Some(Region {
            id: regency.id().to_owned(),
            name: regency.name().to_owned(),
            parent_id: Some(regency.province_id().to_owned()),
            coordinates,
        })
    }

    fn province_point(&self, province: &Province) -> Option<Coordinate> {
        to_coordinate(province.coordinates()).or_else(|| self.regency_centroid(province.id()))
    }

    /// Mean position of the province's regencies that carry coordinates.
    fn regency_centroid(&self, province_id: &str) -> Option<Coordinate> {
        let (count, latitude, longitude) = self
            .catalogue
            .regencies_in(province_id)
            .filter_map(Regency::coordinates)
            .fold((0_u32, 0.0, 0.0), |(count, lat, lng), (latitude, longitude)| {
                (count + 1, lat + latitude, lng + longitude)
            });
        if count == 0 {
            return None;
        }
        let count = f64::from(count);
        Coordinate::new(latitude / count, longitude / count).ok()
    }
}

impl RegionLookup for CatalogueRegions {
    fn regency(&self, id: &str) -> Option<Region> {
        self.regency_region(self.catalogue.regency(id)?)
    }

    fn province(&self, id: &str) -> Option<Region> {
        self.province_region(self.catalogue.province(id)?)
    }

    fn nearest_regency(&self, coordinate: Coordinate) -> Option<Region> {
        let nearest = self
            .catalogue
            .nearest_regency(coordinate.latitude(), coordinate.longitude())?;
        self.regency_region(nearest.regency)
    }
}

fn to_coordinate(pair: Option<(f64, f64)>) -> Option<Coordinate> {
    let (latitude, longitude) = pair?;
    Coordinate::new(latitude, longitude).ok()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_support::sample_regions;

    #[rstest]
    fn regency_without_coordinates_borrows_province_point() {
        let regions = sample_regions();
        let bogor = regions.regency("3201").expect("bogor present");
        assert_eq!(bogor.coordinates.latitude(), -6.9);
        assert_eq!(bogor.parent_id.as_deref(), Some("32"));
    }

    #[rstest]
    fn nearest_regency_skips_entries_without_coordinates() {
        let regions = sample_regions();
        let point = Coordinate::new(-6.9, 107.6).expect("valid");
        let nearest = regions.nearest_regency(point).expect("some regency");
        assert_eq!(nearest.id, "3273");
    }

    const UNLOCATED_PROVINCES: &str = r#"[
        {"id": "32", "name": "JAWA BARAT", "latitude": null, "longitude": null},
        {"id": "33", "name": "JAWA TENGAH"}
    ]"#;

    const UNLOCATED_REGENCIES: &str = r#"[
        {"id": "3201", "provinceId": "32", "name": "KABUPATEN BOGOR", "latitude": -6.6, "longitude": 106.8},
        {"id": "3204", "provinceId": "32", "name": "KABUPATEN BANDUNG", "latitude": -7.0, "longitude": 107.6},
        {"id": "3273", "provinceId": "32", "name": "KOTA BANDUNG", "latitude": null, "longitude": null},
        {"id": "3301", "provinceId": "33", "name": "KABUPATEN CILACAP", "latitude": "", "longitude": ""}
    ]"#;

    fn unlocated() -> CatalogueRegions {
        CatalogueRegions::from_json(UNLOCATED_PROVINCES, UNLOCATED_REGENCIES)
            .expect("datasets parse")
    }

    #[rstest]
    fn province_without_point_uses_regency_centroid() {
        let province = unlocated().province("32").expect("province located");
        assert!((province.coordinates.latitude() - -6.8).abs() < 1e-9);
        assert!((province.coordinates.longitude() - 107.2).abs() < 1e-9);
    }

    #[rstest]
    fn regency_without_point_borrows_the_centroid() {
        let regency = unlocated().regency("3273").expect("regency located");
        assert!((regency.coordinates.latitude() - -6.8).abs() < 1e-9);
    }

    #[rstest]
    fn province_with_no_located_regencies_is_none() {
        assert!(unlocated().province("33").is_none());
    }

    #[rstest]
    fn unknown_ids_are_none() {
        let regions = sample_regions();
        assert!(regions.regency("9999").is_none());
        assert!(regions.province("99").is_none());
    }
}
