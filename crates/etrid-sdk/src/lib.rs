//! # Ëtrid SDK
//!
//! Typed wrappers over the FlareChain pallets and the ETH PBC precompiles.
//!
//! ```text
//!                      ┌──────────────┐
//!   Bridge ───────────►│              │
//!   DistributionPay ──►│    Client    │──► WebSocket JSON-RPC (FlareChain)
//!   LightningBloc ────►│  (etrid-     │
//!   EtwasmVm ─────────►│   client)    │
//!                      └──────────────┘
//!
//!   EthPbcPrecompile ──► abi ──► EvmRpc ──► HTTP JSON-RPC (ETH PBC)
//! ```
//!
//! Every state-changing operation signs a call, waits for finality and reads
//! its result from the expected event. Queries return
//! [`etrid_core::Lookup`]-backed values; a required value that is absent
//! surfaces as [`etrid_core::EtridError::NotFound`].

pub mod abi;
pub mod bridge;
pub mod distribution_pay;
pub mod eth_pbc_precompile;
pub mod etwasm_vm;
pub mod lightning_bloc;

pub use bridge::{Bridge, BridgeStatus, BridgeTransaction, Chain};
pub use distribution_pay::{DistributionCategory, DistributionPay};
pub use eth_pbc_precompile::{EthPbcPrecompile, ProposalStatus};
pub use etwasm_vm::EtwasmVm;
pub use lightning_bloc::{Channel, ChannelState, ChannelStatus, LightningBloc};

use etrid_client::{Client, EvmRpc};
use std::sync::Arc;

/// Every wrapper over one shared connection
#[derive(Clone)]
pub struct EtridSdk {
    pub bridge: Bridge,
    pub distribution: DistributionPay,
    pub channels: LightningBloc,
    pub contracts: EtwasmVm,
    /// Present when an EVM endpoint was supplied
    pub precompiles: Option<EthPbcPrecompile>,
}

impl EtridSdk {
    pub fn new(client: Client) -> Self {
        Self {
            bridge: Bridge::new(client.clone()),
            distribution: DistributionPay::new(client.clone()),
            channels: LightningBloc::new(client.clone()),
            contracts: EtwasmVm::new(client),
            precompiles: None,
        }
    }

    pub fn with_evm(mut self, evm: Arc<dyn EvmRpc>) -> Self {
        self.precompiles = Some(EthPbcPrecompile::new(evm));
        self
    }
}
