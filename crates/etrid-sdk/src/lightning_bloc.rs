//! # Lightning-Bloc payment channels
//!
//! Channels are opened and closed on chain; balance updates between the two
//! parties happen off chain as co-signed states with increasing nonces.
//!
//! ```text
//!   open_channel ──► ChannelOpened[id]
//!        │
//!        ▼
//!   update_channel (off chain)          amount > 0 : A → B
//!     nonce' > nonce                    amount < 0 : B → A
//!     balances stay ≥ 0
//!     sign blake3(id, balance_a, balance_b, nonce)
//!        │
//!        ▼
//!   close_channel / force_close(latest state, counterparty signature)
//! ```

use etrid_client::signer;
use etrid_client::{Call, Client, Signer};
use etrid_core::types::balance_serde;
use etrid_core::{AccountId, Balance, BlockNumber, EtridError, HashHex, Result, SignedBalance};
use serde::{Deserialize, Serialize};

const PALLET: &str = "lightningBloc";

/// Rough per-hop settlement latency used for route estimates
pub const HOP_LATENCY_MS: u64 = 100;

/// Default hop budget for routed payments
pub const DEFAULT_MAX_HOPS: u32 = 20;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelStatus {
    #[default]
    Open,
    Closing,
    Closed,
    Disputed,
}

/// Channel record from `lightningBloc.channels`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(default)]
    pub id: String,
    pub party_a: AccountId,
    pub party_b: AccountId,
    #[serde(with = "balance_serde")]
    pub balance_a: Balance,
    #[serde(with = "balance_serde")]
    pub balance_b: Balance,
    pub nonce: u64,
    pub expires_at: BlockNumber,
    #[serde(default)]
    pub status: ChannelStatus,
}

impl Channel {
    pub fn capacity(&self) -> Balance {
        self.balance_a + self.balance_b
    }

    /// `true` for party A, `false` for party B; outsiders are rejected
    pub fn is_party_a(&self, address: &str) -> Result<bool> {
        if self.party_a == address {
            Ok(true)
        } else if self.party_b == address {
            Ok(false)
        } else {
            Err(EtridError::Channel(format!(
                "{} is not a party to channel {}",
                address, self.id
            )))
        }
    }
}

/// Off-chain channel state co-signed by both parties
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel_id: String,
    pub balance_a: Balance,
    pub balance_b: Balance,
    pub nonce: u64,
    /// Hex ed25519 signature of party A
    pub signature_a: Option<String>,
    /// Hex ed25519 signature of party B
    pub signature_b: Option<String>,
}

impl ChannelState {
    /// blake3 of the length-prefixed id followed by little-endian balances and nonce
    pub fn hash(&self) -> [u8; 32] {
        let id = self.channel_id.as_bytes();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(id.len() as u32).to_le_bytes());
        hasher.update(id);
        hasher.update(&self.balance_a.to_le_bytes());
        hasher.update(&self.balance_b.to_le_bytes());
        hasher.update(&self.nonce.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Whether `signature` over this state was produced by `address`
    pub fn verify(&self, address: &str, signature: &str) -> bool {
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        match <[u8; 64]>::try_from(bytes.as_slice()) {
            Ok(sig) => signer::verify(address, &self.hash(), &sig),
            Err(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentRoute {
    pub path: Vec<AccountId>,
    pub total_fee: Balance,
    pub hop_count: u32,
    pub estimated_time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelBalance {
    pub is_party_a: bool,
    pub your_balance: Balance,
    pub their_balance: Balance,
    pub total_capacity: Balance,
    pub your_percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingFeeEstimate {
    pub base_fee: Balance,
    pub per_hop_fee: Balance,
    pub total_fee: Balance,
    pub fee_percentage: f64,
}

fn percentage_of(part: Balance, whole: Balance) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part.saturating_mul(10_000) / whole) as f64 / 100.0
}

// ============================================================================
// WRAPPER
// ============================================================================

#[derive(Clone)]
pub struct LightningBloc {
    client: Client,
}

impl LightningBloc {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Open a channel with `counterparty`; returns the channel id
    pub async fn open_channel(
        &self,
        signer: &Signer,
        counterparty: &str,
        my_deposit: Balance,
        their_deposit: Balance,
        duration: BlockNumber,
    ) -> Result<String> {
        if counterparty.trim().is_empty() {
            return Err(EtridError::validation("counterparty", "Counterparty address is required"));
        }
        if counterparty == signer.address() {
            return Err(EtridError::Channel("Cannot open a channel with yourself".to_string()));
        }
        if my_deposit == 0 && their_deposit == 0 {
            return Err(EtridError::InvalidAmount(
                "Channel must be funded by at least one party".to_string(),
            ));
        }
        if duration == 0 {
            return Err(EtridError::validation("duration", "Duration must be greater than 0"));
        }

        let call = Call::new(PALLET, "openChannel")
            .arg(counterparty)
            .balance(my_deposit)
            .balance(their_deposit)
            .arg(duration);
        let outcome = self.client.submit(signer, call).await?;
        let id = outcome.expect_event(PALLET, "ChannelOpened")?.text(0)?;
        tracing::info!(channel = %id, counterparty, "Channel opened");
        Ok(id)
    }

    /// Cooperative close; returns the finalized block hash
    pub async fn close_channel(&self, signer: &Signer, channel_id: &str) -> Result<HashHex> {
        let call = Call::new(PALLET, "closeChannel").arg(channel_id);
        Ok(self.client.submit(signer, call).await?.block_hash)
    }

    /// Unilateral close with the latest co-signed state
    pub async fn force_close(
        &self,
        signer: &Signer,
        channel_id: &str,
        latest: &ChannelState,
        signature: &[u8; 64],
    ) -> Result<HashHex> {
        let call = Call::new(PALLET, "forceClose")
            .arg(channel_id)
            .arg(latest.nonce)
            .balance(latest.balance_a)
            .balance(latest.balance_b)
            .arg(hex::encode(signature));
        let outcome = self.client.submit(signer, call).await?;
        tracing::warn!(channel = %channel_id, nonce = latest.nonce, "Channel force-closed");
        Ok(outcome.block_hash)
    }

    /// Build and sign the next off-chain state
    ///
    /// A positive `amount` moves funds from party A to party B, a negative one
    /// from B to A. `nonce` must be greater than the channel's current nonce.
    /// The signer must be one of the two parties; its signature lands in that
    /// party's slot and `their_signature` in the other.
    pub async fn update_channel(
        &self,
        signer: &Signer,
        channel_id: &str,
        amount: SignedBalance,
        nonce: u64,
        their_signature: Option<&[u8; 64]>,
    ) -> Result<ChannelState> {
        let channel = self.get_channel(channel_id).await?;
        let signer_is_a = channel.is_party_a(&signer.address())?;
        if nonce <= channel.nonce {
            return Err(EtridError::Channel(format!(
                "Invalid nonce: must be > {}",
                channel.nonce
            )));
        }

        let moved = amount.unsigned_abs();
        let balances = if amount >= 0 {
            channel
                .balance_a
                .checked_sub(moved)
                .zip(channel.balance_b.checked_add(moved))
        } else {
            channel
                .balance_a
                .checked_add(moved)
                .zip(channel.balance_b.checked_sub(moved))
        };
        let (balance_a, balance_b) =
            balances.ok_or_else(|| EtridError::Channel("Insufficient channel balance".to_string()))?;

        let mut state = ChannelState {
            channel_id: channel_id.to_string(),
            balance_a,
            balance_b,
            nonce,
            signature_a: None,
            signature_b: None,
        };
        let own = Some(hex::encode(signer.sign(&state.hash())));
        let theirs = their_signature.map(hex::encode);
        if signer_is_a {
            state.signature_a = own;
            state.signature_b = theirs;
        } else {
            state.signature_a = theirs;
            state.signature_b = own;
        }
        tracing::debug!(channel = %channel_id, nonce, "Signed channel state");
        Ok(state)
    }

    /// Pay `recipient` through a path of open channels
    pub async fn route_payment(
        &self,
        signer: &Signer,
        recipient: &str,
        amount: Balance,
        max_hops: u32,
    ) -> Result<PaymentRoute> {
        if amount == 0 {
            return Err(EtridError::InvalidAmount("Amount must be greater than 0".to_string()));
        }
        let call = Call::new(PALLET, "routePayment")
            .arg(recipient)
            .balance(amount)
            .arg(max_hops);
        let outcome = self.client.submit(signer, call).await?;
        let event = outcome.expect_event(PALLET, "PaymentRouted")?;
        let hop_count: u32 = event.field(2)?;
        Ok(PaymentRoute {
            path: event.field(0)?,
            total_fee: event.balance(1)?,
            hop_count,
            estimated_time_ms: hop_count as u64 * HOP_LATENCY_MS,
        })
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel> {
        let mut channel = self
            .client
            .query::<Channel>(PALLET, "channels", vec![channel_id.into()])
            .await?
            .require("Channel")?;
        channel.id = channel_id.to_string();
        Ok(channel)
    }

    /// Channels `address` takes part in; dangling ids are skipped
    pub async fn get_my_channels(&self, address: &str) -> Result<Vec<Channel>> {
        let ids = self
            .client
            .query::<Vec<String>>(PALLET, "accountChannels", vec![address.into()])
            .await?
            .or_default();

        let mut channels = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_channel(&id).await {
                Ok(channel) => channels.push(channel),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(channel = %id, "Listed channel no longer exists");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(channels)
    }

    /// Balances from the point of view of `my_address`
    pub async fn get_channel_balance(&self, channel_id: &str, my_address: &str) -> Result<ChannelBalance> {
        let channel = self.get_channel(channel_id).await?;
        let is_party_a = channel.is_party_a(my_address)?;
        let (your_balance, their_balance) = if is_party_a {
            (channel.balance_a, channel.balance_b)
        } else {
            (channel.balance_b, channel.balance_a)
        };
        let total_capacity = channel.capacity();
        Ok(ChannelBalance {
            is_party_a,
            your_balance,
            their_balance,
            total_capacity,
            your_percentage: percentage_of(your_balance, total_capacity),
        })
    }

    /// Base fee plus a per-hop fee for each hop
    pub async fn estimate_routing_fee(&self, amount: Balance, hops: u32) -> Result<RoutingFeeEstimate> {
        let base_fee = self.client.query_balance(PALLET, "baseFee", vec![]).await?.or_default();
        let per_hop_fee = self
            .client
            .query_balance(PALLET, "perHopFee", vec![])
            .await?
            .or_default();
        let total_fee = base_fee + per_hop_fee * hops as u128;
        Ok(RoutingFeeEstimate {
            base_fee,
            per_hop_fee,
            total_fee,
            fee_percentage: percentage_of(total_fee, amount),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etrid_client::mock::MockChain;
    use etrid_client::ChainEvent;
    use serde_json::json;
    use std::sync::Arc;

    fn bob() -> Signer {
        Signer::from_seed([4u8; 32])
    }

    fn setup() -> (Arc<MockChain>, LightningBloc, Signer) {
        let chain = Arc::new(MockChain::new());
        let alice = Signer::from_seed([9u8; 32]);
        chain.set_storage(
            PALLET,
            "channels",
            vec![json!("ch-1")],
            json!({
                "partyA": alice.address(),
                "partyB": bob().address(),
                "balanceA": "700",
                "balanceB": "300",
                "nonce": 4,
                "expiresAt": 99_999,
                "status": "Open",
            }),
        );
        let bloc = LightningBloc::new(Client::new(chain.clone()));
        (chain, bloc, alice)
    }

    #[tokio::test]
    async fn test_open_channel() {
        let (chain, bloc, signer) = setup();
        chain.finalize_with(vec![ChainEvent::new(PALLET, "ChannelOpened", vec![json!("ch-7")])]);

        let id = bloc.open_channel(&signer, "bob", 1_000, 500, 14_400).await.unwrap();
        assert_eq!(id, "ch-7");
        let call = chain.last_submitted().unwrap().call;
        assert_eq!(call.args, vec![json!("bob"), json!("1000"), json!("500"), json!(14_400)]);

        let err = bloc.open_channel(&signer, "", 1, 1, 1).await.unwrap_err();
        assert!(matches!(err, EtridError::Validation { .. }));
        let err = bloc.open_channel(&signer, "bob", 0, 0, 1).await.unwrap_err();
        assert!(matches!(err, EtridError::InvalidAmount(_)));
        let err = bloc
            .open_channel(&signer, &signer.address(), 1, 1, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EtridError::Channel(_)));
    }

    #[tokio::test]
    async fn test_update_channel_moves_balance() {
        let (_, bloc, signer) = setup();

        let state = bloc.update_channel(&signer, "ch-1", 200, 5, None).await.unwrap();
        assert_eq!((state.balance_a, state.balance_b), (500, 500));
        let sig = state.signature_a.clone().unwrap();
        assert!(state.verify(&signer.address(), &sig));

        let state = bloc.update_channel(&signer, "ch-1", -300, 6, Some(&[7u8; 64])).await.unwrap();
        assert_eq!((state.balance_a, state.balance_b), (1_000, 0));
        assert_eq!(state.signature_b, Some(hex::encode([7u8; 64])));
    }

    #[tokio::test]
    async fn test_update_channel_signature_slots() {
        let (_, bloc, alice) = setup();
        let bob = bob();

        let state = bloc
            .update_channel(&bob, "ch-1", -100, 5, Some(&[7u8; 64]))
            .await
            .unwrap();
        assert_eq!((state.balance_a, state.balance_b), (800, 200));
        assert_eq!(state.signature_a, Some(hex::encode([7u8; 64])));
        let sig = state.signature_b.clone().unwrap();
        assert!(state.verify(&bob.address(), &sig));
        assert!(!state.verify(&alice.address(), &sig));

        let mallory = Signer::from_seed([1u8; 32]);
        let err = bloc.update_channel(&mallory, "ch-1", 1, 5, None).await.unwrap_err();
        assert_eq!(
            err,
            EtridError::Channel(format!("{} is not a party to channel ch-1", mallory.address()))
        );
    }

    #[tokio::test]
    async fn test_update_channel_rejections() {
        let (_, bloc, signer) = setup();

        let err = bloc.update_channel(&signer, "ch-1", 10, 4, None).await.unwrap_err();
        assert_eq!(err, EtridError::Channel("Invalid nonce: must be > 4".into()));

        let err = bloc.update_channel(&signer, "ch-1", 701, 5, None).await.unwrap_err();
        assert_eq!(err, EtridError::Channel("Insufficient channel balance".into()));

        let err = bloc.update_channel(&signer, "ch-1", -301, 5, None).await.unwrap_err();
        assert_eq!(err, EtridError::Channel("Insufficient channel balance".into()));

        let err = bloc.update_channel(&signer, "nope", 1, 5, None).await.unwrap_err();
        assert_eq!(err, EtridError::NotFound("Channel".into()));
    }

    #[test]
    fn test_state_hash_binds_every_field() {
        let base = ChannelState {
            channel_id: "ch-1".into(),
            balance_a: 1,
            balance_b: 2,
            nonce: 3,
            signature_a: None,
            signature_b: None,
        };
        let mut other = base.clone();
        other.nonce = 4;
        assert_ne!(base.hash(), other.hash());
        other = base.clone();
        other.signature_a = Some("ff".into());
        assert_eq!(base.hash(), other.hash());
        assert!(!base.verify("0x00", "zz"));
    }

    #[tokio::test]
    async fn test_route_payment() {
        let (chain, bloc, signer) = setup();
        chain.finalize_with(vec![ChainEvent::new(
            PALLET,
            "PaymentRouted",
            vec![json!(["alice", "carol", "bob"]), json!("12"), json!(2)],
        )]);
        let route = bloc
            .route_payment(&signer, "bob", 1_000, DEFAULT_MAX_HOPS)
            .await
            .unwrap();
        assert_eq!(route.path.len(), 3);
        assert_eq!(route.total_fee, 12);
        assert_eq!(route.estimated_time_ms, 200);
    }

    #[tokio::test]
    async fn test_close_paths() {
        let (chain, bloc, signer) = setup();
        chain.finalize_with(vec![]);
        let hash = bloc.close_channel(&signer, "ch-1").await.unwrap();
        assert!(hash.starts_with("0x"));

        let state = bloc.update_channel(&signer, "ch-1", 100, 5, None).await.unwrap();
        bloc.force_close(&signer, "ch-1", &state, &[1u8; 64]).await.unwrap();
        let call = chain.last_submitted().unwrap().call;
        assert_eq!(call.label(), "lightningBloc.forceClose");
        assert_eq!(call.args[1], json!(5));
        assert_eq!(call.args[2], json!("600"));
    }

    #[tokio::test]
    async fn test_balance_views() {
        let (chain, bloc, _) = setup();
        let bob = bob().address();
        chain.set_storage(PALLET, "accountChannels", vec![json!(bob)], json!(["ch-1", "ch-gone"]));
        chain.set_storage(PALLET, "baseFee", vec![], json!("10"));
        chain.set_storage(PALLET, "perHopFee", vec![], json!("5"));

        let mine = bloc.get_my_channels(&bob).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "ch-1");

        let view = bloc.get_channel_balance("ch-1", &bob).await.unwrap();
        assert!(!view.is_party_a);
        assert_eq!(view.your_balance, 300);
        assert_eq!(view.your_percentage, 30.0);

        let err = bloc.get_channel_balance("ch-1", "carol").await.unwrap_err();
        assert!(matches!(err, EtridError::Channel(_)));

        let fee = bloc.estimate_routing_fee(1_000, 3).await.unwrap();
        assert_eq!(fee.total_fee, 25);
        assert_eq!(fee.fee_percentage, 2.5);
    }
}
