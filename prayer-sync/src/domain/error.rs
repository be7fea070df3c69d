//! Domain-level error types.
//!
//! Every component error (fetch, location, schedule, proxy) converts into
//! [`Error`] so callers such as the CLI can report one stable code.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::ports::{FetchError, StorageError};
use crate::domain::{LocationError, ProxyError, ScheduleError};

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Every endpoint attempt exceeded the request timeout.
    NetworkTimeout,
    /// Every attempted endpoint failed.
    AllEndpointsFailed,
    /// The API answered HTTP 200 with a failure payload.
    ApiLogicalError,
    /// No location tier produced a record.
    LocationUnavailable,
    /// Persistent storage is disabled or full.
    StorageUnavailable,
    /// A manual selection referenced an unknown region id.
    RegionNotFound,
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` must be non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use prayer_sync::domain::{Error, ErrorCode};
///
/// let err = Error::new(ErrorCode::RegionNotFound, "regency 9999 not found");
/// assert_eq!(err.code(), ErrorCode::RegionNotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
#[serde(try_from = "ErrorDto", into = "ErrorDto")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Validation errors emitted by the constructors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorValidationError {
    /// The message was blank.
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl Error {
    /// Create a new error, substituting a generic message when `message` is blank.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        match Self::try_new(code, message) {
            Ok(value) => value,
            Err(ErrorValidationError::EmptyMessage) => Self {
                code,
                message: format!("{code:?}"),
                details: None,
            },
        }
    }

    /// Fallible constructor that validates the message content.
    pub fn try_new(
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self {
            code,
            message,
            details: None,
        })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary error details.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::RegionNotFound`].
    pub fn region_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RegionNotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::LocationUnavailable`].
    pub fn location_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LocationUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::StorageUnavailable`].
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl From<FetchError> for Error {
    fn from(value: FetchError) -> Self {
        let message = value.to_string();
        match value {
            FetchError::TimedOut { attempted, .. } => {
                Self::new(ErrorCode::NetworkTimeout, message)
                    .with_details(json!({ "attempted": attempted }))
            }
            FetchError::AllEndpointsFailed { attempted, .. } => {
                Self::new(ErrorCode::AllEndpointsFailed, message)
                    .with_details(json!({ "attempted": attempted }))
            }
            FetchError::InvalidRequest { .. } => Self::invalid_request(message),
        }
    }
}

impl From<StorageError> for Error {
    fn from(value: StorageError) -> Self {
        Self::storage_unavailable(value.to_string())
    }
}

impl From<LocationError> for Error {
    fn from(value: LocationError) -> Self {
        let message = value.to_string();
        match value {
            LocationError::RegionNotFound { id } => {
                Self::region_not_found(message).with_details(json!({ "id": id }))
            }
            LocationError::InvalidCoordinate { .. } => Self::invalid_request(message),
            LocationError::GeolocationUnavailable
            | LocationError::GeolocationDeniedOrTimedOut { .. }
            | LocationError::NoNearbyRegion
            | LocationError::LocationUnavailable => Self::location_unavailable(message),
        }
    }
}

impl From<ScheduleError> for Error {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::Fetch(inner) => inner.into(),
            ScheduleError::Location(inner) => inner.into(),
            ScheduleError::ApiLogical { .. } => {
                Self::new(ErrorCode::ApiLogicalError, value.to_string())
            }
            ScheduleError::Decode { .. } => Self::internal(value.to_string()),
            ScheduleError::InvalidRequest { .. } => Self::invalid_request(value.to_string()),
        }
    }
}

impl From<ProxyError> for Error {
    fn from(value: ProxyError) -> Self {
        match value {
            ProxyError::Network(inner) => match inner {
                crate::domain::ports::TransportError::Timeout { message } => {
                    Self::new(ErrorCode::NetworkTimeout, message)
                }
                crate::domain::ports::TransportError::Transport { message } => {
                    Self::new(ErrorCode::AllEndpointsFailed, message)
                }
            },
            ProxyError::Cache(inner) => Self::storage_unavailable(inner.to_string()),
            ProxyError::InvalidCommand { .. } => Self::invalid_request(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<Error> for ErrorDto {
    fn from(value: Error) -> Self {
        Self {
            code: value.code,
            message: value.message,
            details: value.details,
        }
    }
}

impl TryFrom<ErrorDto> for Error {
    type Error = ErrorValidationError;

    fn try_from(value: ErrorDto) -> Result<Self, Self::Error> {
        let ErrorDto {
            code,
            message,
            details,
        } = value;

        let mut error = Error::try_new(code, message)?;
        error.details = details;
        Ok(error)
    }
}

#[cfg(test)]
mod tests;
