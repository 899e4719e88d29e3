//! Errors returned by the AWS API seams

use aws_sdk_evidently::error::ProvideErrorMetadata;
use keel_core::provider::{ProviderError, ProviderErrorKind};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single remote call
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The addressed resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other failure, kept as the original error
    #[error(transparent)]
    Service(BoxError),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Classify an SDK error by its error code
    ///
    /// Only not-found, validation and conflict errors are recognised; the
    /// original error is kept unmodified for everything else.
    pub fn from_sdk<E>(err: E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let message = err.message().unwrap_or_default().to_string();
        match err.code() {
            Some("ResourceNotFoundException") => ApiError::NotFound(message),
            Some("ValidationException" | "InvalidParameterValueException") => {
                ApiError::Validation(message)
            }
            Some("ConflictException" | "ResourceConflictException") => ApiError::Conflict(message),
            _ => ApiError::Service(Box::new(err)),
        }
    }

    /// Wrap into a ProviderError, keeping this error as the source
    pub fn into_provider_error(self, message: impl Into<String>) -> ProviderError {
        let kind = match &self {
            ApiError::NotFound(_) => ProviderErrorKind::NotFound,
            ApiError::Validation(_) => ProviderErrorKind::Validation,
            ApiError::Conflict(_) | ApiError::Service(_) => ProviderErrorKind::Api,
        };
        ProviderError::new(message).with_kind(kind).with_cause(self)
    }
}
