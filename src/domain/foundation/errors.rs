//! Error types for the domain layer.

use std::fmt;
use thiserror::Error;

use super::CallSessionId;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' exceeds maximum length of {max}, got {actual}")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates a too-long validation error.
    pub fn too_long(field: impl Into<String>, max: usize, actual: usize) -> Self {
        ValidationError::TooLong {
            field: field.into(),
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Stable wire codes for rejected requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotAuthorized,
    AlreadyInProgress,
    InvalidState,
    QuotaExceeded,
    NotFound,
    TransportUnavailable,
    ValidationFailed,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NotAuthorized => "NOT_AUTHORIZED",
            ErrorCode::AlreadyInProgress => "ALREADY_IN_PROGRESS",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Typed result of every signaling operation.
///
/// Rejections are reported to the requesting connection only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The relationship service does not authorize this user for the target.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// A non-terminal invitation already exists for the pair.
    #[error("A call between this pair is already in progress ({0})")]
    AlreadyInProgress(CallSessionId),

    /// The target is not in a state that allows the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The pair has used its monthly call budget.
    #[error("Monthly call quota exhausted for this pair")]
    QuotaExceeded,

    /// The referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target has no live connection; the invitation stays recorded.
    #[error("Recipient has no live connection (session {0})")]
    TransportUnavailable(CallSessionId),

    /// Malformed client input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A collaborator failed.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl SignalError {
    pub fn not_authorized(message: impl Into<String>) -> Self {
        SignalError::NotAuthorized(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        SignalError::InvalidState(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SignalError::NotFound(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SignalError::Infrastructure(message.into())
    }

    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SignalError::NotAuthorized(_) => ErrorCode::NotAuthorized,
            SignalError::AlreadyInProgress(_) => ErrorCode::AlreadyInProgress,
            SignalError::InvalidState(_) => ErrorCode::InvalidState,
            SignalError::QuotaExceeded => ErrorCode::QuotaExceeded,
            SignalError::NotFound(_) => ErrorCode::NotFound,
            SignalError::TransportUnavailable(_) => ErrorCode::TransportUnavailable,
            SignalError::Validation(_) => ErrorCode::ValidationFailed,
            SignalError::Infrastructure(_) => ErrorCode::InternalError,
        }
    }

    /// Returns true for rejections caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SignalError::Infrastructure(_))
    }
}
