//! In-memory doubles of a node and an EVM endpoint
//!
//! Storage answers come from a key/value map, submissions replay scripted
//! status sequences, and everything submitted is recorded for assertions.

use crate::error::{ClientError, ClientResult};
use crate::evm::{EvmRpc, EvmTransaction};
use crate::extrinsic::{ChainEvent, DispatchError, FinalizedBlock, ModuleErrorInfo, SignedCall, TxStatus};
use crate::rpc::ChainRpc;
use async_trait::async_trait;
use etrid_core::Lookup;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;

fn item_prefix(pallet: &str, item: &str) -> String {
    format!("{}.{}", pallet, item)
}

fn storage_key(pallet: &str, item: &str, keys: &[Value]) -> String {
    format!("{}{}", item_prefix(pallet, item), Value::Array(keys.to_vec()))
}

#[derive(Default)]
struct ChainState {
    storage: HashMap<String, (Vec<Value>, Value)>,
    rpc: HashMap<String, Value>,
    scripts: VecDeque<Vec<TxStatus>>,
    submitted: Vec<SignedCall>,
    module_errors: HashMap<(u8, u8), ModuleErrorInfo>,
    nonces: HashMap<String, u64>,
    hold_open: bool,
    held: Vec<mpsc::Sender<TxStatus>>,
    block_counter: u64,
}

/// Scripted chain
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_storage(&self, pallet: &str, item: &str, keys: Vec<Value>, value: Value) {
        self.state
            .lock()
            .storage
            .insert(storage_key(pallet, item, &keys), (keys, value));
    }

    pub fn remove_storage(&self, pallet: &str, item: &str, keys: Vec<Value>) {
        self.state.lock().storage.remove(&storage_key(pallet, item, &keys));
    }

    pub fn set_rpc(&self, method: &str, result: Value) {
        self.state.lock().rpc.insert(method.to_string(), result);
    }

    /// Queue the statuses for the next submission
    pub fn push_statuses(&self, statuses: Vec<TxStatus>) {
        self.state.lock().scripts.push_back(statuses);
    }

    /// Next submission finalizes successfully with `events`
    pub fn finalize_with(&self, events: Vec<ChainEvent>) {
        let hash = self.next_block_hash();
        self.push_statuses(vec![
            TxStatus::Ready,
            TxStatus::InBlock { block_hash: hash.clone() },
            TxStatus::Finalized(FinalizedBlock {
                block_hash: hash,
                events,
                dispatch_error: None,
            }),
        ]);
    }

    /// Next submission finalizes with a dispatch error
    pub fn fail_with(&self, error: DispatchError) {
        let hash = self.next_block_hash();
        self.push_statuses(vec![
            TxStatus::Ready,
            TxStatus::Finalized(FinalizedBlock {
                block_hash: hash,
                events: vec![],
                dispatch_error: Some(error),
            }),
        ]);
    }

    /// Keep status streams open after their script runs out
    ///
    /// Submissions without a queued script then never finalize.
    pub fn hold_open(&self) {
        self.state.lock().hold_open = true;
    }

    pub fn register_module_error(&self, index: u8, error: u8, info: ModuleErrorInfo) {
        self.state.lock().module_errors.insert((index, error), info);
    }

    /// Every call submitted so far
    pub fn submitted(&self) -> Vec<SignedCall> {
        self.state.lock().submitted.clone()
    }

    /// Most recent submission
    pub fn last_submitted(&self) -> Option<SignedCall> {
        self.state.lock().submitted.last().cloned()
    }

    fn next_block_hash(&self) -> String {
        let mut state = self.state.lock();
        state.block_counter += 1;
        format!("0x{:064x}", state.block_counter)
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn submit_and_watch(&self, xt: SignedCall) -> ClientResult<mpsc::Receiver<TxStatus>> {
        let mut state = self.state.lock();
        *state.nonces.entry(xt.signer.clone()).or_default() += 1;
        state.submitted.push(xt);

        let hold_open = state.hold_open;
        let script = state.scripts.pop_front().unwrap_or_else(|| {
            if hold_open {
                return Vec::new();
            }
            vec![TxStatus::Finalized(FinalizedBlock {
                block_hash: "0x00".to_string(),
                events: vec![],
                dispatch_error: None,
            })]
        });
        let (tx, rx) = mpsc::channel(script.len() + 1);
        for status in script {
            tx.try_send(status)
                .map_err(|e| ClientError::Transport(e.to_string()))?;
        }
        if state.hold_open {
            state.held.push(tx);
        }
        Ok(rx)
    }

    async fn query_storage(
        &self,
        pallet: &str,
        item: &str,
        keys: Vec<Value>,
    ) -> ClientResult<Lookup<Value>> {
        let state = self.state.lock();
        Ok(state
            .storage
            .get(&storage_key(pallet, item, &keys))
            .map(|(_, value)| value.clone())
            .into())
    }

    async fn query_entries(&self, pallet: &str, item: &str) -> ClientResult<Vec<(Vec<Value>, Value)>> {
        let prefix = format!("{}[", item_prefix(pallet, item));
        let state = self.state.lock();
        let mut entries: Vec<(String, (Vec<Value>, Value))> = state
            .storage
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn rpc_call(&self, method: &str, _params: Vec<Value>) -> ClientResult<Value> {
        self.state
            .lock()
            .rpc
            .get(method)
            .cloned()
            .ok_or_else(|| ClientError::Rpc {
                code: -32601,
                message: format!("Method not found: {}", method),
            })
    }

    async fn account_nonce(&self, account: &str) -> ClientResult<u64> {
        Ok(self.state.lock().nonces.get(account).copied().unwrap_or(0))
    }

    async fn module_error(&self, index: u8, error: u8) -> ClientResult<Option<ModuleErrorInfo>> {
        Ok(self.state.lock().module_errors.get(&(index, error)).cloned())
    }
}

// ============================================================================
// EVM
// ============================================================================

#[derive(Default)]
struct EvmState {
    responses: HashMap<(String, String), Vec<u8>>,
    calls: Vec<(String, Vec<u8>)>,
    sent: Vec<EvmTransaction>,
}

/// Scripted EVM endpoint keyed by `(to, selector)`
#[derive(Default)]
pub struct MockEvm {
    state: Mutex<EvmState>,
}

impl MockEvm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `eth_call`s to `to` whose data starts with `selector`
    pub fn respond(&self, to: &str, selector: [u8; 4], output: Vec<u8>) {
        self.state
            .lock()
            .responses
            .insert((to.to_lowercase(), hex::encode(selector)), output);
    }

    pub fn calls(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().calls.clone()
    }

    pub fn sent(&self) -> Vec<EvmTransaction> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl EvmRpc for MockEvm {
    async fn eth_call(&self, to: &str, data: &[u8]) -> ClientResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.calls.push((to.to_string(), data.to_vec()));
        let selector = hex::encode(data.get(..4).unwrap_or_default());
        state
            .responses
            .get(&(to.to_lowercase(), selector))
            .cloned()
            .ok_or_else(|| ClientError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
            })
    }

    async fn eth_send_transaction(&self, tx: EvmTransaction) -> ClientResult<String> {
        let mut state = self.state.lock();
        state.sent.push(tx);
        Ok(format!("0x{:064x}", state.sent.len()))
    }
}
