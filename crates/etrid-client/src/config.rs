//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the chain and EVM endpoints
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket JSON-RPC endpoints, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// HTTP JSON-RPC endpoint of the ETH partition burst chain
    #[serde(default = "default_evm_endpoint")]
    pub evm_endpoint: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for finality; unbounded when unset
    #[serde(default)]
    pub finality_timeout_secs: Option<u64>,

    /// Capacity of per-subscription status channels
    #[serde(default = "default_status_buffer")]
    pub status_buffer: usize,
}

fn default_endpoints() -> Vec<String> {
    vec!["ws://127.0.0.1:9944".to_string()]
}

fn default_evm_endpoint() -> String {
    "http://127.0.0.1:9545".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_status_buffer() -> usize {
    32
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            evm_endpoint: default_evm_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            finality_timeout_secs: None,
            status_buffer: default_status_buffer(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn finality_timeout(&self) -> Option<Duration> {
        self.finality_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "endpoints": ["ws://node:9944"] }"#).unwrap();
        assert_eq!(config.endpoints, vec!["ws://node:9944"]);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.finality_timeout(), None);
        assert_eq!(config.evm_endpoint, ClientConfig::default().evm_endpoint);
    }
}
