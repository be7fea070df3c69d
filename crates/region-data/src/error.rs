//! Error types for the region-data crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the reference datasets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionDataError {
    /// A dataset file could not be read.
    #[error("failed to read dataset file at '{path}': {message}")]
    Io {
        /// Path to the dataset file.
        path: PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// A dataset is not valid JSON or misses required fields.
    #[error("invalid {dataset} JSON: {message}")]
    Parse {
        /// Dataset name (`provinces` or `regencies`).
        dataset: &'static str,
        /// Description of the parse error.
        message: String,
    },

    /// Two entries of the same dataset share an identifier.
    #[error("duplicate {dataset} id '{id}'")]
    DuplicateId {
        /// Dataset name (`provinces` or `regencies`).
        dataset: &'static str,
        /// The repeated identifier.
        id: String,
    },

    /// A regency references a province that is not in the province dataset.
    #[error("regency '{regency_id}' references unknown province '{province_id}'")]
    UnknownProvince {
        /// Offending regency identifier.
        regency_id: String,
        /// Province identifier that could not be resolved.
        province_id: String,
    },

    /// A coordinate value is outside WGS84 bounds or not a number.
    #[error("{dataset} entry '{id}' has an invalid coordinate: {message}")]
    InvalidCoordinate {
        /// Dataset name (`provinces` or `regencies`).
        dataset: &'static str,
        /// Offending entry identifier.
        id: String,
        /// Description of the problem.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_formats_path() {
        let err = RegionDataError::Io {
            path: PathBuf::from("/tmp/provinces.json"),
            message: "file not found".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "failed to read dataset file at '/tmp/provinces.json': file not found"
        );
    }

    #[test]
    fn unknown_province_formats_both_ids() {
        let err = RegionDataError::UnknownProvince {
            regency_id: "9901".to_owned(),
            province_id: "99".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "regency '9901' references unknown province '99'"
        );
    }
}
