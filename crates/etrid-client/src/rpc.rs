//! Chain RPC abstraction and JSON-RPC 2.0 framing

use crate::error::{ClientError, ClientResult};
use crate::extrinsic::{ModuleErrorInfo, SignedCall, TxStatus};
use async_trait::async_trait;
use etrid_core::Lookup;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Remote ledger surface consumed by the SDK
///
/// Implemented by [`crate::WsRpcClient`] for live nodes and by
/// `mock::MockChain` in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Submit a signed call and stream its status updates
    async fn submit_and_watch(&self, xt: SignedCall) -> ClientResult<mpsc::Receiver<TxStatus>>;

    /// Read a storage item; absence is `Lookup::NotFound`
    async fn query_storage(
        &self,
        pallet: &str,
        item: &str,
        keys: Vec<Value>,
    ) -> ClientResult<Lookup<Value>>;

    /// Every `(keys, value)` pair stored under a map item
    async fn query_entries(&self, pallet: &str, item: &str) -> ClientResult<Vec<(Vec<Value>, Value)>>;

    /// Raw RPC method call
    async fn rpc_call(&self, method: &str, params: Vec<Value>) -> ClientResult<Value>;

    /// Next usable nonce for `account`
    async fn account_nonce(&self, account: &str) -> ClientResult<u64>;

    /// Metadata for a pallet error, if the runtime knows it
    async fn module_error(&self, index: u8, error: u8) -> ClientResult<Option<ModuleErrorInfo>>;
}

/// Method names served by an Ëtrid node
pub mod methods {
    pub const SUBMIT_AND_WATCH: &str = "author_submitAndWatchCall";
    pub const UNWATCH: &str = "author_unwatchCall";
    pub const QUERY_STORAGE: &str = "etrid_queryStorage";
    pub const QUERY_ENTRIES: &str = "etrid_queryStorageEntries";
    pub const ACCOUNT_NEXT_INDEX: &str = "system_accountNextIndex";
    pub const MODULE_ERROR: &str = "etrid_moduleError";
}

// ============================================================================
// JSON-RPC 2.0 FRAMES
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Result value or the server's error; a missing result reads as `null`
    pub fn into_result(self) -> ClientResult<Value> {
        match self.error {
            Some(err) => Err(ClientError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: String,
    pub result: Value,
}

/// Server push for an active subscription
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    pub method: String,
    pub params: SubscriptionParams,
}

/// Any frame a node may send
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingFrame {
    Response(RpcResponse),
    Notification(RpcNotification),
}
