// ABOUTME: The engine's operation-level error type.
// ABOUTME: Uses snafu with a kind() accessor for programmatic handling.

use snafu::Snafu;

use crate::progress::StreamError;
use crate::runtime::ApiError;
use crate::spec::ConfigError;

/// Categories of engine errors.
///
/// Use `ServiceError::kind()` to get this value for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceErrorKind {
    Config,
    Build,
    NeedsBuild,
    CannotBeScaled,
    Api,
}

/// Errors surfaced by service operations. Variants carry the offending
/// service name where that is meaningful.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ServiceError {
    #[snafu(display("{source}"), context(false))]
    Config { source: ConfigError },

    #[snafu(display("building image for service {service} failed: {reason}"))]
    Build {
        service: String,
        reason: String,
        /// The final event on the build stream, when one was seen.
        last_event: Option<serde_json::Value>,
    },

    #[snafu(display(
        "service {service} has no image to run and building it was not allowed"
    ))]
    NeedsBuild { service: String },

    #[snafu(display(
        "service {service} specifies a port on the host - if multiple containers \
         for this service were run, the port would clash"
    ))]
    CannotBeScaled { service: String },

    #[snafu(display("{source}"), context(false))]
    Api { source: ApiError },
}

impl ServiceError {
    /// Returns the kind of this error for programmatic handling.
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            ServiceError::Config { .. } => ServiceErrorKind::Config,
            ServiceError::Build { .. } => ServiceErrorKind::Build,
            ServiceError::NeedsBuild { .. } => ServiceErrorKind::NeedsBuild,
            ServiceError::CannotBeScaled { .. } => ServiceErrorKind::CannotBeScaled,
            ServiceError::Api { .. } => ServiceErrorKind::Api,
        }
    }

    /// Returns the service name the error is about, when it carries one.
    pub fn service_name(&self) -> Option<&str> {
        match self {
            ServiceError::Build { service, .. }
            | ServiceError::NeedsBuild { service }
            | ServiceError::CannotBeScaled { service } => Some(service),
            _ => None,
        }
    }

    pub(crate) fn build_failed(
        service: impl Into<String>,
        stream_error: StreamError,
    ) -> Self {
        ServiceError::Build {
            service: service.into(),
            reason: stream_error.to_string(),
            last_event: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
