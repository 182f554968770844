//! # ETH PBC precompiles
//!
//! FlareChain features exposed to EVM contracts on the ETH partition burst
//! chain. Every precompile lives at a fixed low address and is reached with
//! plain `eth_call` / `eth_sendTransaction`.
//!
//! ```text
//!   0x…0800  Oracle           prices by bytes32 symbol
//!   0x…0801  Governance       proposals and votes
//!   0x…0802  Staking          validator stake and status
//!   0x…0803  NativeEthWrap    ETH <-> wETH
//!   0x…0804  XcmBridge        cross-chain messages
//!   0x…0805  TokenRegistry    bridged ERC-20 tokens
//!   0x…0806  StateProof       latest Ethereum block
//! ```

use crate::abi::{self, AbiDecoder, AbiEncoder};
use etrid_client::{EvmRpc, EvmTransaction};
use etrid_core::{Balance, EtridError, HashHex, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub mod addresses {
    pub const ORACLE: &str = "0x0000000000000000000000000000000000000800";
    pub const GOVERNANCE: &str = "0x0000000000000000000000000000000000000801";
    pub const STAKING: &str = "0x0000000000000000000000000000000000000802";
    pub const NATIVE_ETH_WRAP: &str = "0x0000000000000000000000000000000000000803";
    pub const XCM_BRIDGE: &str = "0x0000000000000000000000000000000000000804";
    pub const TOKEN_REGISTRY: &str = "0x0000000000000000000000000000000000000805";
    pub const STATE_PROOF: &str = "0x0000000000000000000000000000000000000806";
}

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;

/// Quote currency used when none is given
pub const DEFAULT_QUOTE: &str = "USD";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ProposalStatus {
    Pending,
    Active,
    Passed,
    Failed,
}

impl TryFrom<u8> for ProposalStatus {
    type Error = EtridError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Active),
            2 => Ok(Self::Passed),
            3 => Ok(Self::Failed),
            other => Err(EtridError::Governance(format!("Unknown proposal status {}", other))),
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_bridged_supply: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EthBlockInfo {
    pub block_number: u64,
    pub block_hash: HashHex,
    pub state_root: HashHex,
    pub timestamp: u64,
}

fn word_hex(word: &abi::Word) -> HashHex {
    format!("0x{}", hex::encode(word))
}

// ============================================================================
// WRAPPER
// ============================================================================

#[derive(Clone)]
pub struct EthPbcPrecompile {
    evm: Arc<dyn EvmRpc>,
    /// Account that sends transactions; reads work without one
    sender: Option<String>,
}

impl EthPbcPrecompile {
    pub fn new(evm: Arc<dyn EvmRpc>) -> Self {
        Self { evm, sender: None }
    }

    pub fn with_sender(mut self, sender: &str) -> Result<Self> {
        abi::parse_address(sender)?;
        self.sender = Some(sender.to_string());
        Ok(self)
    }

    async fn call(&self, to: &str, data: Vec<u8>) -> Result<Vec<u8>> {
        tracing::debug!(to, selector = %hex::encode(&data[..data.len().min(4)]), "eth_call");
        Ok(self.evm.eth_call(to, &data).await?)
    }

    async fn send(&self, to: &str, data: Vec<u8>, value: Balance) -> Result<String> {
        let from = self
            .sender
            .clone()
            .ok_or_else(|| EtridError::validation("signer", "Signer required for transactions"))?;
        let hash = self
            .evm
            .eth_send_transaction(EvmTransaction {
                from,
                to: to.to_string(),
                data,
                value,
            })
            .await?;
        tracing::info!(to, tx = %hash, "Precompile transaction sent");
        Ok(hash)
    }

    async fn call_uint(&self, to: &str, data: Vec<u8>) -> Result<u128> {
        let output = self.call(to, data).await?;
        Ok(AbiDecoder::new(&output).uint(0)?)
    }

    // ========================================================================
    // ORACLE
    // ========================================================================

    /// Price of `symbol` in `quote`, 18 decimals
    pub async fn get_oracle_price(&self, symbol: &str, quote: Option<&str>) -> Result<u128> {
        let data = AbiEncoder::new("getPrice(bytes32,bytes32)")?
            .bytes32(abi::bytes32_from_str(symbol)?)
            .bytes32(abi::bytes32_from_str(quote.unwrap_or(DEFAULT_QUOTE))?)
            .finish();
        self.call_uint(addresses::ORACLE, data).await
    }

    pub async fn get_oracle_price_in_eth(&self, symbol: &str) -> Result<u128> {
        let data = AbiEncoder::new("getPriceInETH(bytes32)")?
            .bytes32(abi::bytes32_from_str(symbol)?)
            .finish();
        self.call_uint(addresses::ORACLE, data).await
    }

    /// Unix timestamp of the last price update for `symbol`
    pub async fn get_oracle_last_update(&self, symbol: &str) -> Result<u64> {
        let data = AbiEncoder::new("getLastUpdate(bytes32)")?
            .bytes32(abi::bytes32_from_str(symbol)?)
            .finish();
        let output = self.call(addresses::ORACLE, data).await?;
        Ok(AbiDecoder::new(&output).uint64(0)?)
    }

    // ========================================================================
    // GOVERNANCE
    // ========================================================================

    pub async fn governance_create_proposal(&self, title: &str, description: &str) -> Result<String> {
        if title.trim().is_empty() {
            return Err(EtridError::validation("title", "Title is required"));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(EtridError::validation(
                "title",
                format!("Title exceeds {} bytes", MAX_TITLE_LEN),
            ));
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(EtridError::validation(
                "description",
                format!("Description exceeds {} bytes", MAX_DESCRIPTION_LEN),
            ));
        }
        let data = AbiEncoder::new("submitProposal(string,string)")?
            .string(title)
            .string(description)
            .finish();
        self.send(addresses::GOVERNANCE, data, 0).await
    }

    pub async fn governance_vote(&self, proposal_id: u64, support: bool) -> Result<String> {
        let data = AbiEncoder::new("voteOnProposal(uint256,bool)")?
            .uint(proposal_id as u128)
            .boolean(support)
            .finish();
        self.send(addresses::GOVERNANCE, data, 0).await
    }

    pub async fn get_proposal_status(&self, proposal_id: u64) -> Result<ProposalStatus> {
        let data = AbiEncoder::new("getProposalStatus(uint256)")?
            .uint(proposal_id as u128)
            .finish();
        let output = self.call(addresses::GOVERNANCE, data).await?;
        ProposalStatus::try_from(AbiDecoder::new(&output).uint8(0)?)
    }

    // ========================================================================
    // STAKING
    // ========================================================================

    pub async fn get_validator_stake(&self, validator_id: &str) -> Result<Balance> {
        let data = AbiEncoder::new("getValidatorStake(bytes32)")?
            .bytes32(abi::bytes32_from_hex(validator_id)?)
            .finish();
        self.call_uint(addresses::STAKING, data).await
    }

    pub async fn is_validator_active(&self, validator_id: &str) -> Result<bool> {
        let data = AbiEncoder::new("isValidatorActive(bytes32)")?
            .bytes32(abi::bytes32_from_hex(validator_id)?)
            .finish();
        let output = self.call(addresses::STAKING, data).await?;
        Ok(AbiDecoder::new(&output).boolean(0)?)
    }

    pub async fn get_total_staked(&self) -> Result<Balance> {
        let data = AbiEncoder::new("getTotalStaked()")?.finish();
        self.call_uint(addresses::STAKING, data).await
    }

    pub async fn get_validator_count(&self) -> Result<u64> {
        let data = AbiEncoder::new("getValidatorCount()")?.finish();
        let output = self.call(addresses::STAKING, data).await?;
        Ok(AbiDecoder::new(&output).uint64(0)?)
    }

    // ========================================================================
    // NATIVE ETH WRAPPING
    // ========================================================================

    /// Wrap `amount` wei of ETH; the amount travels as the call value
    pub async fn wrap_eth(&self, amount: Balance) -> Result<String> {
        if amount == 0 {
            return Err(EtridError::InvalidAmount("Amount must be positive".into()));
        }
        let data = AbiEncoder::new("wrap()")?.finish();
        self.send(addresses::NATIVE_ETH_WRAP, data, amount).await
    }

    pub async fn unwrap_eth(&self, amount: Balance) -> Result<String> {
        if amount == 0 {
            return Err(EtridError::InvalidAmount("Amount must be positive".into()));
        }
        let data = AbiEncoder::new("unwrap(uint256)")?.uint(amount).finish();
        self.send(addresses::NATIVE_ETH_WRAP, data, 0).await
    }

    /// wETH per ETH, 18 decimals
    pub async fn get_wrap_rate(&self) -> Result<u128> {
        let data = AbiEncoder::new("getWrapRate()")?.finish();
        self.call_uint(addresses::NATIVE_ETH_WRAP, data).await
    }

    // ========================================================================
    // TOKEN REGISTRY
    // ========================================================================

    pub async fn get_token_info(&self, token: &str) -> Result<TokenInfo> {
        let data = AbiEncoder::new("getTokenInfo(address)")?
            .address(abi::parse_address(token)?)
            .finish();
        let output = self.call(addresses::TOKEN_REGISTRY, data).await?;
        let decoder = AbiDecoder::new(&output);
        Ok(TokenInfo {
            name: decoder.string(0)?,
            symbol: decoder.string(1)?,
            decimals: decoder.uint8(2)?,
            total_bridged_supply: decoder.uint(3)?,
        })
    }

    pub async fn register_token(&self, token: &str) -> Result<String> {
        let data = AbiEncoder::new("registerToken(address)")?
            .address(abi::parse_address(token)?)
            .finish();
        self.send(addresses::TOKEN_REGISTRY, data, 0).await
    }

    pub async fn get_bridged_tokens(&self) -> Result<Vec<String>> {
        let data = AbiEncoder::new("getBridgedTokens()")?.finish();
        let output = self.call(addresses::TOKEN_REGISTRY, data).await?;
        Ok(AbiDecoder::new(&output)
            .address_array(0)?
            .iter()
            .map(abi::format_address)
            .collect())
    }

    // ========================================================================
    // STATE PROOF
    // ========================================================================

    pub async fn get_latest_eth_block(&self) -> Result<EthBlockInfo> {
        let data = AbiEncoder::new("getLatestEthBlock()")?.finish();
        let output = self.call(addresses::STATE_PROOF, data).await?;
        let decoder = AbiDecoder::new(&output);
        Ok(EthBlockInfo {
            block_number: decoder.uint64(0)?,
            block_hash: word_hex(&decoder.bytes32(1)?),
            state_root: word_hex(&decoder.bytes32(2)?),
            timestamp: decoder.uint64(3)?,
        })
    }
}
