//! Error types shared by every Ëtrid SDK crate

use thiserror::Error;

/// Result type alias for Ëtrid operations
pub type Result<T> = std::result::Result<T, EtridError>;

/// Errors surfaced by SDK operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EtridError {
    // === Validation (raised before any network call) ===
    /// Generic validation failure on a named field
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Address is malformed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Amount is zero, negative or out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Account cannot cover the requested amount
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    // === Remote dispatch ===
    /// Chain rejected the extrinsic; holds "section.name: docs" or the raw error
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Finalized successfully but the expected event was not emitted
    #[error("Expected event {0} not found")]
    MissingEvent(String),

    /// Remote optional value was absent
    #[error("{0} not found")]
    NotFound(String),

    // === Domain ===
    /// Staking operation failed
    #[error("Staking error: {0}")]
    Staking(String),

    /// Governance operation failed
    #[error("Governance error: {0}")]
    Governance(String),

    /// Lightning-Bloc channel operation failed
    #[error("Channel error: {0}")]
    Channel(String),

    /// Cross-chain bridge operation failed
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// Smart contract operation failed
    #[error("Contract error: {0}")]
    Contract(String),

    // === Network ===
    /// Transport failure talking to a node
    #[error("Network error: {0}")]
    Network(String),

    /// No live connection to a node
    #[error("Not connected to node")]
    NotConnected,

    // === General ===
    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EtridError {
    /// Shorthand for a field validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable numeric code for API responses and logs
    pub fn code(&self) -> u32 {
        match self {
            Self::Transaction(_) | Self::MissingEvent(_) => 1001,
            Self::Validation { .. } => 1002,
            Self::InsufficientBalance { .. } => 1003,
            Self::InvalidAddress(_) => 1004,
            Self::InvalidAmount(_) => 1005,
            Self::NotFound(_) => 1006,
            Self::Staking(_) => 2001,
            Self::Governance(_) => 2002,
            Self::Channel(_) => 2003,
            Self::Bridge(_) => 2004,
            Self::Contract(_) => 2005,
            Self::Network(_) => 3001,
            Self::NotConnected => 3002,
            Self::Serialization(_) | Self::Internal(_) => 9999,
        }
    }

    /// Coarse category used when grouping errors for display
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transaction(_) | Self::MissingEvent(_) => "transaction",
            Self::Validation { .. }
            | Self::InvalidAddress(_)
            | Self::InvalidAmount(_)
            | Self::InsufficientBalance { .. } => "validation",
            Self::Network(_) | Self::NotConnected => "network",
            Self::Staking(_) => "staking",
            Self::Governance(_) => "governance",
            Self::Channel(_) => "channel",
            Self::Bridge(_) => "bridge",
            Self::Contract(_) => "contract",
            Self::NotFound(_) => "query",
            Self::Serialization(_) | Self::Internal(_) => "internal",
        }
    }

    /// Check if retrying the same call may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::NotConnected)
    }

    /// Whether this error is the consistent not-found outcome of a lookup
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Amount missing for an `InsufficientBalance` error
    pub fn shortage(&self) -> Option<u128> {
        match self {
            Self::InsufficientBalance {
                required,
                available,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EtridError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EtridError::Transaction("x".into()).code(), 1001);
        assert_eq!(EtridError::NotConnected.code(), 3002);
        assert_eq!(EtridError::Channel("x".into()).code(), 2003);
    }

    #[test]
    fn test_error_display() {
        let err = EtridError::validation("amount", "must be positive");
        assert_eq!(
            err.to_string(),
            "Validation failed for amount: must be positive"
        );

        let err = EtridError::not_found("Bridge transaction");
        assert_eq!(err.to_string(), "Bridge transaction not found");
    }

    #[test]
    fn test_shortage() {
        let err = EtridError::InsufficientBalance {
            required: 1000,
            available: 500,
        };
        assert_eq!(err.shortage(), Some(500));
        assert_eq!(EtridError::NotConnected.shortage(), None);
    }

    #[test]
    fn test_categories_and_recoverable() {
        assert_eq!(EtridError::Transaction("x".into()).category(), "transaction");
        assert_eq!(EtridError::InvalidAmount("x".into()).category(), "validation");
        assert_eq!(EtridError::Network("x".into()).category(), "network");
        assert_eq!(EtridError::Governance("x".into()).category(), "governance");

        assert!(EtridError::Network("timeout".into()).is_recoverable());
        assert!(!EtridError::InvalidAddress("x".into()).is_recoverable());
    }
}
