//! High-level client: signed submission with finality tracking, typed queries

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::extrinsic::{Call, DispatchError, FinalizedBlock, TxOutcome, TxStatus};
use crate::rpc::ChainRpc;
use crate::signer::Signer;
use crate::ws::WsRpcClient;
use etrid_core::{balance_from_value, Balance, BlockNumber, EtridError, Lookup, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cheaply cloneable handle shared by all wrappers
#[derive(Clone)]
pub struct Client {
    rpc: Arc<dyn ChainRpc>,
    config: ClientConfig,
}

impl Client {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self::with_config(rpc, ClientConfig::default())
    }

    pub fn with_config(rpc: Arc<dyn ChainRpc>, config: ClientConfig) -> Self {
        Self { rpc, config }
    }

    /// Open a WebSocket connection using `config`
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let ws = WsRpcClient::connect(&config).await?;
        Ok(Self::with_config(Arc::new(ws), config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Sign, submit and wait for `call` to be finalized
    ///
    /// Intermediate statuses are ignored. A dispatch error in the finalized
    /// block becomes [`EtridError::Transaction`] carrying
    /// `"section.name: docs"` when the runtime can describe it, and the raw
    /// error text otherwise.
    pub async fn submit(&self, signer: &Signer, call: Call) -> Result<TxOutcome> {
        let label = call.label();
        let nonce = self.rpc.account_nonce(&signer.address()).await?;
        let xt = signer.sign_call(call, nonce)?;

        tracing::info!(call = %label, signer = %xt.signer, nonce, "Submitting extrinsic");
        let statuses = self.rpc.submit_and_watch(xt).await?;

        let block = match self.config.finality_timeout() {
            Some(limit) => tokio::time::timeout(limit, wait_for_finality(statuses))
                .await
                .map_err(|_| ClientError::Timeout(limit.as_secs()))??,
            None => wait_for_finality(statuses).await?,
        };

        if let Some(err) = block.dispatch_error {
            let reason = self.describe_dispatch_error(&err).await;
            tracing::warn!(call = %label, block = %block.block_hash, "Extrinsic failed: {}", reason);
            return Err(EtridError::Transaction(reason));
        }

        tracing::info!(call = %label, block = %block.block_hash, "Extrinsic finalized");
        Ok(TxOutcome {
            block_hash: block.block_hash,
            events: block.events,
        })
    }

    /// Human-readable form of a dispatch error
    pub async fn describe_dispatch_error(&self, err: &DispatchError) -> String {
        if let DispatchError::Module { index, error } = err {
            match self.rpc.module_error(*index, *error).await {
                Ok(Some(info)) => return info.to_string(),
                Ok(None) => {}
                Err(e) => tracing::debug!("Module error lookup failed: {}", e),
            }
        }
        err.to_string()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Raw storage value
    pub async fn query_raw(&self, pallet: &str, item: &str, keys: Vec<Value>) -> Result<Lookup<Value>> {
        tracing::debug!(pallet, item, "Storage query");
        Ok(self.rpc.query_storage(pallet, item, keys).await?)
    }

    /// Typed storage value
    pub async fn query<T: DeserializeOwned>(
        &self,
        pallet: &str,
        item: &str,
        keys: Vec<Value>,
    ) -> Result<Lookup<T>> {
        match self.query_raw(pallet, item, keys).await? {
            Lookup::Found(value) => Ok(Lookup::Found(serde_json::from_value(value).map_err(
                |e| EtridError::Serialization(format!("{}.{}: {}", pallet, item, e)),
            )?)),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    /// Storage value holding a balance
    pub async fn query_balance(
        &self,
        pallet: &str,
        item: &str,
        keys: Vec<Value>,
    ) -> Result<Lookup<Balance>> {
        match self.query_raw(pallet, item, keys).await? {
            Lookup::Found(value) => Ok(Lookup::Found(balance_from_value(&value)?)),
            Lookup::NotFound => Ok(Lookup::NotFound),
        }
    }

    /// All entries of a storage map as `(keys, value)` pairs
    pub async fn query_entries(&self, pallet: &str, item: &str) -> Result<Vec<(Vec<Value>, Value)>> {
        tracing::debug!(pallet, item, "Storage entries query");
        Ok(self.rpc.query_entries(pallet, item).await?)
    }

    /// Typed RPC method call
    pub async fn rpc_call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        tracing::debug!(method, "RPC call");
        let value = self.rpc.rpc_call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Current best block height
    pub async fn block_number(&self) -> Result<BlockNumber> {
        self.query::<BlockNumber>("system", "number", vec![])
            .await?
            .require("Block number")
    }

    /// Free balance of `account`; unknown accounts hold nothing
    pub async fn free_balance(&self, account: &str) -> Result<Balance> {
        let info = self
            .query_raw("system", "account", vec![Value::String(account.to_string())])
            .await?;
        match info {
            Lookup::Found(value) => balance_from_value(&value["data"]["free"]),
            Lookup::NotFound => Ok(0),
        }
    }
}

/// Drain `statuses` until a terminal status arrives
pub async fn wait_for_finality(mut statuses: mpsc::Receiver<TxStatus>) -> ClientResult<FinalizedBlock> {
    while let Some(status) = statuses.recv().await {
        match status {
            TxStatus::Finalized(block) => return Ok(block),
            TxStatus::Dropped => return Err(ClientError::Rejected("dropped from pool".into())),
            TxStatus::Usurped { by } => {
                return Err(ClientError::Rejected(format!("usurped by {}", by)))
            }
            TxStatus::Invalid { reason } => return Err(ClientError::Rejected(reason)),
            other => tracing::debug!("Ignoring intermediate status {:?}", other),
        }
    }
    Err(ClientError::SubscriptionClosed)
}
