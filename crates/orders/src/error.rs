//! Unified error handling with Sentry integration.
//!
//! Every service call returns `Result<T, ServiceError>`. Callers turn an
//! error into an [`ErrorBody`] (a kind plus a human message) for their
//! clients; internal errors are captured to Sentry at that point and their
//! details are not exposed.

use serde::Serialize;
use thiserror::Error;

use grocer_core::{ImageError, TransitionError, ValidationError};

use crate::db::RepositoryError;
use crate::db::images::ImageStoreError;
use crate::services::files::FileStoreError;

/// Error kinds exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Locked,
    CapacityExceeded,
    Conflict,
    InvalidTransition,
    Internal,
}

/// Structured error result returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Application-level error type for the order engine.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request is malformed; nothing was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown order, item, image or address.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Wrong owner, or a customer attempting an admin operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Customer edit attempted on a locked order.
    #[error("Locked: {0}")]
    Locked(String),

    /// Too many images on one item.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Concurrent write collided, e.g. on an order number.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Event not allowed in the order's current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Locked(_) => ErrorKind::Locked,
            Self::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The client-facing result. Internal details are replaced by a generic
    /// message.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            Self::Database(_) | Self::Internal(_) => "Internal error".to_string(),
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::Forbidden(m)
            | Self::Locked(m)
            | Self::CapacityExceeded(m)
            | Self::Conflict(m)
            | Self::InvalidTransition(m) => m.clone(),
        };
        ErrorBody {
            kind: self.kind(),
            message,
        }
    }

    /// Log the error, capturing internal errors to Sentry, and return the
    /// client-facing result.
    #[must_use]
    pub fn report(&self) -> ErrorBody {
        if self.kind() == ErrorKind::Internal {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Service error"
            );
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        self.body()
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Database(other),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(RepositoryError::Database(e))
    }
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<ImageError> for ServiceError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::CapacityExceeded { .. } => Self::CapacityExceeded(e.to_string()),
            ImageError::NotFound(_) => Self::NotFound(e.to_string()),
        }
    }
}

impl From<ImageStoreError> for ServiceError {
    fn from(e: ImageStoreError) -> Self {
        match e {
            ImageStoreError::Image(e) => e.into(),
            ImageStoreError::Repository(e) => e.into(),
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        let message = e.to_string();
        match e {
            TransitionError::NotFound => Self::NotFound(message),
            TransitionError::Forbidden { .. } => Self::Forbidden(message),
            TransitionError::Locked => Self::Locked(message),
            TransitionError::InvalidTransition { .. }
            | TransitionError::Deleted { .. }
            | TransitionError::NotDeleted { .. } => Self::InvalidTransition(message),
            TransitionError::Validation(_) => Self::Validation(message),
        }
    }
}

impl From<FileStoreError> for ServiceError {
    fn from(e: FileStoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Result type alias for `ServiceError`.
pub type Result<T> = std::result::Result<T, ServiceError>;
