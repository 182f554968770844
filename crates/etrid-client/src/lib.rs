//! # Ëtrid Client
//!
//! Transport and transaction plumbing shared by every SDK wrapper.
//!
//! ```text
//!   wrapper ──Call──► Client::submit ──sign──► ChainRpc::submit_and_watch
//!                         │                          │
//!                         │      ready / broadcast / in-block (ignored)
//!                         │                          │
//!                         ◄────── finalized ─────────┘
//!                         │
//!             dispatch error? ──► "section.name: docs"
//!             events ─────────► TxOutcome::expect_event(pallet, name)
//! ```
//!
//! Read-only storage queries decode into [`etrid_core::Lookup`].

pub mod client;
pub mod config;
pub mod error;
pub mod evm;
pub mod extrinsic;
pub mod rpc;
pub mod signer;
pub mod ws;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use evm::{EvmRpc, EvmRpcClient, EvmTransaction};
pub use extrinsic::{
    Call, ChainEvent, DispatchError, FinalizedBlock, ModuleErrorInfo, SignedCall, TxOutcome,
    TxStatus,
};
pub use rpc::ChainRpc;
pub use signer::Signer;
pub use ws::WsRpcClient;
