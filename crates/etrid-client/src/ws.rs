//! WebSocket JSON-RPC transport
//!
//! One reader task routes responses to waiting callers by request id and
//! subscription pushes to per-subscription channels. One writer task drains
//! the outgoing queue.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::extrinsic::{ModuleErrorInfo, SignedCall, TxStatus};
use crate::rpc::{methods, ChainRpc, IncomingFrame, RpcRequest, RpcResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use etrid_core::Lookup;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Unknown subscription ids held at once
const MAX_PARKED_IDS: usize = 32;

/// Pushes held per unknown subscription id
const MAX_PARKED_PER_ID: usize = 64;

/// Recently closed ids whose late pushes are dropped outright
const RETIRED_IDS: usize = 256;

/// Subscription routing; pushes that race ahead of registration are parked
#[derive(Default)]
struct SubscriptionTable {
    active: HashMap<String, mpsc::UnboundedSender<Value>>,
    parked: HashMap<String, Vec<Value>>,
    retired: VecDeque<String>,
}

impl SubscriptionTable {
    fn deliver(&mut self, id: String, value: Value) {
        if let Some(tx) = self.active.get(&id) {
            let _ = tx.send(value);
            return;
        }
        if self.retired.contains(&id) {
            tracing::trace!(subscription = %id, "Dropping push for closed subscription");
            return;
        }
        if !self.parked.contains_key(&id) && self.parked.len() >= MAX_PARKED_IDS {
            tracing::debug!(subscription = %id, "Dropping push for unknown subscription");
            return;
        }
        let queue = self.parked.entry(id).or_default();
        if queue.len() < MAX_PARKED_PER_ID {
            queue.push(value);
        }
    }

    fn register(&mut self, id: String) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        for value in self.parked.remove(&id).unwrap_or_default() {
            let _ = tx.send(value);
        }
        self.active.insert(id, tx);
        rx
    }

    fn unsubscribe(&mut self, id: &str) {
        self.active.remove(id);
        self.parked.remove(id);
        if self.retired.len() >= RETIRED_IDS {
            self.retired.pop_front();
        }
        self.retired.push_back(id.to_string());
    }

    fn clear(&mut self) {
        self.active.clear();
        self.parked.clear();
    }
}

/// JSON-RPC client over a single WebSocket connection
pub struct WsRpcClient {
    endpoint: String,
    next_id: AtomicU64,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Arc<DashMap<u64, oneshot::Sender<RpcResponse>>>,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
    status_buffer: usize,
}

impl WsRpcClient {
    /// Connect to the first reachable endpoint
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        if config.endpoints.is_empty() {
            return Err(ClientError::Config("No endpoints configured".to_string()));
        }

        for endpoint in &config.endpoints {
            if let Err(e) = url::Url::parse(endpoint) {
                tracing::warn!("Skipping malformed endpoint {}: {}", endpoint, e);
                continue;
            }
            match connect_async(endpoint.as_str()).await {
                Ok((stream, _)) => {
                    tracing::info!("Connected to node at {}", endpoint);
                    return Ok(Self::spawn(endpoint.clone(), stream, config));
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", endpoint, e);
                }
            }
        }

        Err(ClientError::Connection(
            "Failed to connect to any endpoint".to_string(),
        ))
    }

    fn spawn<S>(endpoint: String, stream: S, config: &ClientConfig) -> Self
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Send
            + Unpin
            + 'static,
    {
        let (mut write, mut read) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Arc<DashMap<u64, oneshot::Sender<RpcResponse>>> = Arc::new(DashMap::new());
        let subscriptions = Arc::new(Mutex::new(SubscriptionTable::default()));
        let connected = Arc::new(AtomicBool::new(true));

        // Writer
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Reader
        {
            let pending = pending.clone();
            let subscriptions = subscriptions.clone();
            let connected = connected.clone();
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match serde_json::from_str::<IncomingFrame>(&text) {
                            Ok(IncomingFrame::Response(resp)) => {
                                if let Some((_, tx)) = pending.remove(&resp.id) {
                                    let _ = tx.send(resp);
                                }
                            }
                            Ok(IncomingFrame::Notification(note)) => {
                                subscriptions
                                    .lock()
                                    .deliver(note.params.subscription, note.params.result);
                            }
                            Err(e) => tracing::debug!("Ignoring unparseable frame: {}", e),
                        },
                        Ok(Message::Close(_)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                connected.store(false, Ordering::SeqCst);
                // Dropping the senders wakes every waiter with an error
                pending.clear();
                subscriptions.lock().clear();
                tracing::warn!("Connection to {} closed", endpoint);
            });
        }

        Self {
            endpoint,
            next_id: AtomicU64::new(1),
            outgoing,
            pending,
            subscriptions,
            connected,
            request_timeout: config.request_timeout(),
            status_buffer: config.status_buffer,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response
    pub async fn request(&self, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = serde_json::to_string(&RpcRequest::new(id, method, params))?;
        tracing::debug!(id, method, "RPC request");
        if self.outgoing.send(Message::Text(frame)).is_err() {
            self.pending.remove(&id);
            return Err(ClientError::NotConnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => resp.into_result(),
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_) => {
                self.pending.remove(&id);
                Err(ClientError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }

    /// Open a subscription; the result of `method` must be the subscription id
    pub async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> ClientResult<(String, mpsc::UnboundedReceiver<Value>)> {
        let result = self.request(method, params).await?;
        let id = match result {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(ClientError::Serialization(format!(
                    "expected subscription id, got {}",
                    other
                )))
            }
        };
        let rx = self.subscriptions.lock().register(id.clone());
        Ok((id, rx))
    }
}

#[async_trait]
impl ChainRpc for WsRpcClient {
    async fn submit_and_watch(&self, xt: SignedCall) -> ClientResult<mpsc::Receiver<TxStatus>> {
        let (sub_id, mut raw) = self
            .subscribe(methods::SUBMIT_AND_WATCH, vec![serde_json::to_value(&xt)?])
            .await?;
        let (tx, rx) = mpsc::channel(self.status_buffer);
        let subscriptions = self.subscriptions.clone();
        let outgoing = self.outgoing.clone();
        let unwatch_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            while let Some(value) = raw.recv().await {
                let status: TxStatus = match serde_json::from_value(value) {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!("Undecodable status on {}: {}", sub_id, e);
                        continue;
                    }
                };
                let terminal = status.is_terminal();
                if tx.send(status).await.is_err() || terminal {
                    break;
                }
            }
            subscriptions.lock().unsubscribe(&sub_id);
            // Best effort; the node drops finished watches on its own
            if let Ok(frame) = serde_json::to_string(&RpcRequest::new(
                unwatch_id,
                methods::UNWATCH,
                vec![Value::String(sub_id)],
            )) {
                let _ = outgoing.send(Message::Text(frame));
            }
        });

        Ok(rx)
    }

    async fn query_storage(
        &self,
        pallet: &str,
        item: &str,
        keys: Vec<Value>,
    ) -> ClientResult<Lookup<Value>> {
        let params = vec![
            Value::String(pallet.to_string()),
            Value::String(item.to_string()),
            Value::Array(keys),
        ];
        match self.request(methods::QUERY_STORAGE, params).await? {
            Value::Null => Ok(Lookup::NotFound),
            value => Ok(Lookup::Found(value)),
        }
    }

    async fn query_entries(&self, pallet: &str, item: &str) -> ClientResult<Vec<(Vec<Value>, Value)>> {
        let params = vec![
            Value::String(pallet.to_string()),
            Value::String(item.to_string()),
        ];
        let value = self.request(methods::QUERY_ENTRIES, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn rpc_call(&self, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        self.request(method, params).await
    }

    async fn account_nonce(&self, account: &str) -> ClientResult<u64> {
        let value = self
            .request(
                methods::ACCOUNT_NEXT_INDEX,
                vec![Value::String(account.to_string())],
            )
            .await?;
        value
            .as_u64()
            .ok_or_else(|| ClientError::Serialization(format!("invalid nonce: {}", value)))
    }

    async fn module_error(&self, index: u8, error: u8) -> ClientResult<Option<ModuleErrorInfo>> {
        let value = self
            .request(methods::MODULE_ERROR, vec![index.into(), error.into()])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.outgoing.send(Message::Close(None));
    }
}
