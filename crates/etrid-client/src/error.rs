//! Client error types

use etrid_core::EtridError;
use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors raised by transports and the submission protocol
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Status stream ended before the extrinsic was finalized
    #[error("Status subscription closed before finality")]
    SubscriptionClosed,

    /// Extrinsic left the pool without being finalized
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::NotConnected | Self::Transport(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<ClientError> for EtridError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotConnected => EtridError::NotConnected,
            ClientError::Rejected(reason) => EtridError::Transaction(reason),
            ClientError::Serialization(msg) => EtridError::Serialization(msg),
            ClientError::Signing(msg) | ClientError::Config(msg) => EtridError::Internal(msg),
            other => EtridError::Network(other.to_string()),
        }
    }
}
