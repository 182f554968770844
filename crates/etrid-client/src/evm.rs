//! EVM JSON-RPC over HTTP (`eth_call`, `eth_sendTransaction`)

use crate::error::{ClientError, ClientResult};
use crate::rpc::{RpcRequest, RpcResponse};
use async_trait::async_trait;
use etrid_core::Balance;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Transaction sent from an unlocked node account
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvmTransaction {
    pub from: String,
    pub to: String,
    pub data: Vec<u8>,
    pub value: Balance,
}

impl EvmTransaction {
    fn to_json(&self) -> Value {
        json!({
            "from": self.from,
            "to": self.to,
            "data": format!("0x{}", hex::encode(&self.data)),
            "value": format!("0x{:x}", self.value),
        })
    }
}

/// EVM endpoint surface used by the precompile wrapper
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// Read-only call returning the raw ABI output
    async fn eth_call(&self, to: &str, data: &[u8]) -> ClientResult<Vec<u8>>;

    /// Submit a transaction, returning its hash
    async fn eth_send_transaction(&self, tx: EvmTransaction) -> ClientResult<String>;
}

/// HTTP JSON-RPC client
pub struct EvmRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl EvmRpcClient {
    pub fn new(url: &str, timeout: Duration) -> ClientResult<Self> {
        url::Url::parse(url).map_err(|e| ClientError::Config(format!("{}: {}", url, e)))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(id, method, url = %self.url, "EVM RPC request");

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_result()
    }
}

fn decode_hex_result(value: Value) -> ClientResult<Vec<u8>> {
    let text = value
        .as_str()
        .ok_or_else(|| ClientError::Serialization(format!("expected hex string, got {}", value)))?;
    hex::decode(text.trim_start_matches("0x")).map_err(|e| ClientError::Serialization(e.to_string()))
}

#[async_trait]
impl EvmRpc for EvmRpcClient {
    async fn eth_call(&self, to: &str, data: &[u8]) -> ClientResult<Vec<u8>> {
        let call = json!({ "to": to, "data": format!("0x{}", hex::encode(data)) });
        let result = self.request("eth_call", vec![call, json!("latest")]).await?;
        decode_hex_result(result)
    }

    async fn eth_send_transaction(&self, tx: EvmTransaction) -> ClientResult<String> {
        let result = self.request("eth_sendTransaction", vec![tx.to_json()]).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Serialization(format!("expected tx hash, got {}", result)))
    }
}
