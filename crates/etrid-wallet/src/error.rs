//! Errors raised by the wallet services

use etrid_core::EtridError;
use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Input rejected before any state changed
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller is not allowed to act on the record
    #[error("{0}")]
    NotPermitted(String),

    /// Record is in the wrong lifecycle state for the operation
    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0} already exists")]
    AlreadyExists(String),
}

impl ServiceError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Stable code shown next to the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotPermitted(_) => "NOT_PERMITTED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
        }
    }

    /// Services are in-memory; nothing succeeds on retry without new input
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

impl From<ServiceError> for EtridError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(what) => EtridError::not_found(what),
            ServiceError::InvalidInput(reason) => EtridError::validation("input", reason),
            other => EtridError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_conversion() {
        let err = ServiceError::NotFound("Goal");
        assert_eq!(err.to_string(), "Goal not found");
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(!err.is_recoverable());

        let sdk: EtridError = err.into();
        assert!(sdk.is_not_found());

        let sdk: EtridError = ServiceError::invalid("Bill name is required").into();
        assert_eq!(sdk, EtridError::validation("input", "Bill name is required"));
    }
}
