//! Province and regency reference data for location resolution.
//!
//! The datasets are externally supplied JSON arrays. Provinces carry
//! `{id, name, latitude, longitude}` and regencies carry
//! `{id, provinceId, name, latitude, longitude}`; `provinceId` joins the two.
//! Coordinates may be missing or encoded as numeric strings; entries without
//! coordinates stay addressable by id but never take part in nearest-region
//! search.
//!
//! # Example
//!
//! ```
//! use region_data::RegionCatalogue;
//!
//! let provinces = r#"[{"id": "31", "name": "DKI Jakarta", "latitude": -6.2, "longitude": 106.8}]"#;
//! let regencies = r#"[
//!     {"id": "3171", "provinceId": "31", "name": "Jakarta Selatan", "latitude": -6.26, "longitude": 106.81},
//!     {"id": "3173", "provinceId": "31", "name": "Jakarta Pusat", "latitude": "-6.18", "longitude": "106.83"}
//! ]"#;
//!
//! let catalogue = RegionCatalogue::from_json(provinces, regencies).expect("valid datasets");
//! let nearest = catalogue.nearest_regency(-6.17, 106.82).expect("a regency has coordinates");
//!
//! assert_eq!(nearest.regency.id(), "3173");
//! ```

mod catalogue;
mod dataset;
mod error;
mod geo;

pub use catalogue::{NearestRegency, RegionCatalogue};
pub use dataset::{Province, Regency};
pub use error::RegionDataError;
pub use geo::{EARTH_RADIUS_KM, haversine_km};
