//! # Cross-chain Bridge
//!
//! Token transfers between Ëtrid and 13 external chains through Partition
//! Burst Chains (PBCs), backed by the `xcmBridge` pallet.
//!
//! ```text
//!   bridge_tokens(ETH → BTC)
//!        │ validate: chains differ, amount > 0, recipient set
//!        │ limits:   min ≤ amount ≤ max, amount ≤ daily remaining
//!        ▼
//!   xcmBridge.bridgeTokens ──finalized──► BridgeInitiated[id, src, dst, amount, recipient, fee]
//!        │
//!        ▼
//!   BridgeTransaction { status: Pending, estimated_completion = target block time × confirmations }
//! ```

use chrono::{DateTime, Utc};
use etrid_client::{Client, Signer};
use etrid_core::types::balance_serde;
use etrid_core::{AccountId, Balance, BlockNumber, EtridError, HashHex, Lookup, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const PALLET: &str = "xcmBridge";

// ============================================================================
// CHAINS
// ============================================================================

/// External chains reachable through a PBC
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    BTC,
    ETH,
    SOL,
    XRP,
    BNB,
    TRX,
    ADA,
    MATIC,
    LINK,
    DOGE,
    XLM,
    USDT,
    EDSC,
}

impl Chain {
    pub const ALL: [Chain; 13] = [
        Chain::BTC,
        Chain::ETH,
        Chain::SOL,
        Chain::XRP,
        Chain::BNB,
        Chain::TRX,
        Chain::ADA,
        Chain::MATIC,
        Chain::LINK,
        Chain::DOGE,
        Chain::XLM,
        Chain::USDT,
        Chain::EDSC,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::BTC => "BTC",
            Chain::ETH => "ETH",
            Chain::SOL => "SOL",
            Chain::XRP => "XRP",
            Chain::BNB => "BNB",
            Chain::TRX => "TRX",
            Chain::ADA => "ADA",
            Chain::MATIC => "MATIC",
            Chain::LINK => "LINK",
            Chain::DOGE => "DOGE",
            Chain::XLM => "XLM",
            Chain::USDT => "USDT",
            Chain::EDSC => "EDSC",
        }
    }

    /// Static network parameters
    pub fn metadata(&self) -> ChainMetadata {
        let (name, decimals, block_time_ms, required_confirmations) = match self {
            Chain::BTC => ("Bitcoin", 8, 600_000, 6),
            Chain::ETH => ("Ethereum", 18, 12_000, 12),
            Chain::SOL => ("Solana", 9, 400, 32),
            Chain::XRP => ("Ripple", 6, 4_000, 1),
            Chain::BNB => ("Binance Smart Chain", 18, 3_000, 15),
            Chain::TRX => ("Tron", 6, 3_000, 19),
            Chain::ADA => ("Cardano", 6, 20_000, 15),
            Chain::MATIC => ("Polygon", 18, 2_000, 128),
            Chain::LINK => ("Chainlink", 18, 12_000, 12),
            Chain::DOGE => ("Dogecoin", 8, 60_000, 6),
            Chain::XLM => ("Stellar", 7, 5_000, 1),
            Chain::USDT => ("Tether USD", 6, 12_000, 12),
            Chain::EDSC => ("EDSC Stablecoin", 18, 5_000, 3),
        };
        ChainMetadata {
            chain: *self,
            name,
            symbol: self.symbol(),
            decimals,
            block_time_ms,
            required_confirmations,
            enabled: true,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Chain {
    type Err = EtridError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_uppercase();
        Chain::ALL
            .iter()
            .copied()
            .find(|c| c.symbol() == wanted)
            .ok_or_else(|| EtridError::validation("chain", format!("Unsupported chain: {}", s)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    pub chain: Chain,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
    pub block_time_ms: u64,
    pub required_confirmations: u32,
    pub enabled: bool,
}

impl ChainMetadata {
    /// Block time × required confirmations
    pub fn finality_estimate(&self) -> Duration {
        Duration::from_millis(self.block_time_ms * self.required_confirmations as u64)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeStatus {
    Pending,
    Confirming,
    Confirmed,
    Finalized,
    Failed,
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeHealth {
    Healthy,
    Degraded,
    Critical,
    Offline,
}

/// A transfer as stored in `xcmBridge.bridgeTransactions`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTransaction {
    /// Map key; filled in from the storage key when absent from the value
    #[serde(default)]
    pub id: String,
    pub source_chain: Chain,
    pub target_chain: Chain,
    pub sender: AccountId,
    pub recipient: String,
    #[serde(with = "balance_serde")]
    pub amount: Balance,
    pub status: BridgeStatus,
    #[serde(default)]
    pub source_tx_hash: Option<HashHex>,
    #[serde(default)]
    pub target_tx_hash: Option<HashHex>,
    #[serde(default)]
    pub confirmations: u32,
    pub required_confirmations: u32,
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(with = "balance_serde")]
    pub fee: Balance,
    pub initiated_at: BlockNumber,
    #[serde(default)]
    pub completed_at: Option<BlockNumber>,
}

/// PBC state from `xcmBridge.pbcInfo`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbcInfo {
    #[serde(default = "default_pbc_chain")]
    pub chain: Chain,
    pub pbc_id: u32,
    pub collator: AccountId,
    #[serde(with = "balance_serde")]
    pub total_value_locked: Balance,
    pub active_bridges: u32,
    pub health: BridgeHealth,
    pub last_checkpoint: BlockNumber,
    /// Seconds
    pub finality_time: u64,
}

fn default_pbc_chain() -> Chain {
    Chain::ETH
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BridgeFee {
    pub base_fee: Balance,
    pub gas_fee: Balance,
    pub liquidity_fee: Balance,
    pub total_fee: Balance,
    /// Total fee as a percentage of the amount, two decimal places
    pub fee_percentage: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeQuote {
    #[serde(with = "balance_serde")]
    base_fee: Balance,
    #[serde(with = "balance_serde")]
    gas_fee: Balance,
    #[serde(with = "balance_serde")]
    liquidity_fee: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeLimits {
    #[serde(with = "balance_serde")]
    pub min_amount: Balance,
    #[serde(with = "balance_serde")]
    pub max_amount: Balance,
    #[serde(with = "balance_serde")]
    pub daily_limit: Balance,
    #[serde(with = "balance_serde")]
    pub daily_used: Balance,
    #[serde(skip_deserializing, serialize_with = "balance_serde::serialize")]
    pub daily_remaining: Balance,
}

impl BridgeLimits {
    /// First limit `amount` violates, if any
    fn check(&self, amount: Balance) -> Result<()> {
        if amount < self.min_amount {
            return Err(EtridError::InvalidAmount(format!(
                "Amount below minimum: {}",
                self.min_amount
            )));
        }
        if amount > self.max_amount {
            return Err(EtridError::InvalidAmount(format!(
                "Amount exceeds maximum: {}",
                self.max_amount
            )));
        }
        if amount > self.daily_remaining {
            return Err(EtridError::InvalidAmount(format!(
                "Amount exceeds daily limit remaining: {}",
                self.daily_remaining
            )));
        }
        Ok(())
    }
}

// ============================================================================
// WRAPPER
// ============================================================================

/// Read-through/write-through proxy to the `xcmBridge` pallet
#[derive(Clone)]
pub struct Bridge {
    client: Client,
}

impl Bridge {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Start a cross-chain transfer
    pub async fn bridge_tokens(
        &self,
        signer: &Signer,
        source: Chain,
        target: Chain,
        amount: Balance,
        recipient: &str,
    ) -> Result<BridgeTransaction> {
        if source == target {
            return Err(EtridError::validation(
                "target_chain",
                "Source and target chains must be different",
            ));
        }
        if amount == 0 {
            return Err(EtridError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }
        if recipient.trim().is_empty() {
            return Err(EtridError::validation("recipient", "Recipient address is required"));
        }

        // No configured limits for the pair means unrestricted
        if let Lookup::Found(limits) = self.query_limits(source, target).await? {
            limits.check(amount)?;
        }

        let call = etrid_client::Call::new(PALLET, "bridgeTokens")
            .arg(source.symbol())
            .arg(target.symbol())
            .balance(amount)
            .arg(recipient);
        let outcome = self.client.submit(signer, call).await?;
        let event = outcome.expect_event(PALLET, "BridgeInitiated")?;

        let metadata = target.metadata();
        let eta = chrono::Duration::from_std(metadata.finality_estimate())
            .map_err(|e| EtridError::Internal(e.to_string()))?;
        let initiated_at = match self.client.block_number().await {
            Ok(number) => number,
            Err(e) => {
                tracing::warn!("Block number unavailable after bridge submission: {}", e);
                0
            }
        };

        let tx = BridgeTransaction {
            id: event.text(0)?,
            source_chain: source,
            target_chain: target,
            sender: signer.address(),
            recipient: recipient.to_string(),
            amount: event.balance(3)?,
            status: BridgeStatus::Pending,
            source_tx_hash: Some(outcome.block_hash.clone()),
            target_tx_hash: None,
            confirmations: 0,
            required_confirmations: metadata.required_confirmations,
            estimated_completion: Some(Utc::now() + eta),
            fee: event.balance(5)?,
            initiated_at,
            completed_at: None,
        };
        tracing::info!(id = %tx.id, %source, %target, amount = %amount, "Bridge transfer initiated");
        Ok(tx)
    }

    /// Current record of a transfer
    pub async fn get_bridge_status(&self, id: &str) -> Result<BridgeTransaction> {
        let mut tx = self
            .client
            .query::<BridgeTransaction>(PALLET, "bridgeTransactions", vec![id.into()])
            .await?
            .require("Bridge transaction")?;
        if tx.id.is_empty() {
            tx.id = id.to_string();
        }
        Ok(tx)
    }

    pub async fn get_pbc_info(&self, chain: Chain) -> Result<PbcInfo> {
        let mut info = self
            .client
            .query::<PbcInfo>(PALLET, "pbcInfo", vec![chain.symbol().into()])
            .await?
            .require(&format!("PBC for chain {}", chain))?;
        info.chain = chain;
        Ok(info)
    }

    /// Fee breakdown quoted by the node
    pub async fn estimate_bridge_fee(
        &self,
        source: Chain,
        target: Chain,
        amount: Balance,
    ) -> Result<BridgeFee> {
        let quote: FeeQuote = self
            .client
            .rpc_call(
                "xcmBridge_estimateFee",
                vec![
                    source.symbol().into(),
                    target.symbol().into(),
                    Value::String(amount.to_string()),
                ],
            )
            .await?;

        let total_fee = quote.base_fee + quote.gas_fee + quote.liquidity_fee;
        let fee_percentage = if amount > 0 {
            (total_fee.saturating_mul(10_000) / amount) as f64 / 100.0
        } else {
            0.0
        };
        Ok(BridgeFee {
            base_fee: quote.base_fee,
            gas_fee: quote.gas_fee,
            liquidity_fee: quote.liquidity_fee,
            total_fee,
            fee_percentage,
        })
    }

    /// Transfers sent by `address`, optionally touching `chain`, newest first
    pub async fn get_bridge_history(
        &self,
        address: &str,
        chain: Option<Chain>,
        limit: usize,
    ) -> Result<Vec<BridgeTransaction>> {
        let entries = self.client.query_entries(PALLET, "bridgeTransactions").await?;
        let mut history = Vec::new();

        for (keys, value) in entries {
            if value.is_null() {
                continue;
            }
            let mut tx: BridgeTransaction = serde_json::from_value(value)?;
            if tx.sender != address {
                continue;
            }
            if let Some(chain) = chain {
                if tx.source_chain != chain && tx.target_chain != chain {
                    continue;
                }
            }
            if tx.id.is_empty() {
                if let Some(key) = keys.first() {
                    tx.id = key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string());
                }
            }
            history.push(tx);
        }

        history.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at));
        history.truncate(limit);
        Ok(history)
    }

    pub fn get_supported_chains(&self) -> Vec<ChainMetadata> {
        Chain::ALL.iter().map(Chain::metadata).collect()
    }

    /// Limits configured for a chain pair
    pub async fn get_bridge_limits(&self, source: Chain, target: Chain) -> Result<BridgeLimits> {
        self.query_limits(source, target)
            .await?
            .require(&format!("Bridge limits for {} → {}", source, target))
    }

    async fn query_limits(&self, source: Chain, target: Chain) -> Result<Lookup<BridgeLimits>> {
        let limits = self
            .client
            .query::<BridgeLimits>(
                PALLET,
                "bridgeLimits",
                vec![source.symbol().into(), target.symbol().into()],
            )
            .await?;
        Ok(limits.map(|mut l| {
            l.daily_remaining = l.daily_limit.saturating_sub(l.daily_used);
            l
        }))
    }

    /// Whether transfers to or from `chain` are currently accepted
    pub async fn is_chain_enabled(&self, chain: Chain) -> Result<bool> {
        Ok(self
            .client
            .query::<bool>(PALLET, "enabledChains", vec![chain.symbol().into()])
            .await?
            .found()
            .unwrap_or(false))
    }
}
