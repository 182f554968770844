//! # ËtwasmVM contracts
//!
//! Upload, instantiate, call and inspect WASM contracts through the
//! `contracts` pallet. Gas is metered in VMw; 1,000,000 VMw = 1 ÉTR.

use etrid_client::{Call, Client, Signer};
use etrid_core::constants::ONE_ETR;
use etrid_core::{AccountId, Balance, EtridError, HashHex, Lookup, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PALLET: &str = "contracts";

/// Caller used for dry runs when none is given
const ZERO_CALLER: &str = "0x0000000000000000000000000000000000000000";

/// VMw metering limits
pub mod gas {
    /// Per-block gas budget
    pub const BLOCK_LIMIT: u64 = 10_000_000;
    /// Per-transaction gas budget
    pub const TX_LIMIT: u64 = 1_000_000;
    /// VMw bought by one ÉTR
    pub const VMW_PER_ETR: u64 = 1_000_000;
    /// Gas limit used when the caller gives none
    pub const DEFAULT_GAS: u64 = 500_000;
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CodeUploadResult {
    pub code_hash: HashHex,
    /// Hash of the block the upload was finalized in
    pub tx_hash: HashHex,
    pub storage_deposit: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstantiateResult {
    pub address: AccountId,
    pub deployer: AccountId,
    pub tx_hash: HashHex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContractDeployment {
    pub address: AccountId,
    pub code_hash: HashHex,
    pub tx_hash: HashHex,
    pub gas_used: u64,
    pub storage_deposit: Balance,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContractEvent {
    pub contract: AccountId,
    pub data: Value,
}

/// Outcome of a state-changing call; dispatch failures are reported here
/// rather than as errors
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CallResult {
    pub success: bool,
    pub tx_hash: Option<HashHex>,
    pub gas_used: u64,
    pub events: Vec<ContractEvent>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GasEstimate {
    pub gas_required: u64,
    pub storage_deposit: Balance,
    /// Execution cost in planck
    pub cost: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContractInfo {
    pub address: AccountId,
    pub code_hash: HashHex,
    pub deployer: AccountId,
    pub balance: Balance,
    pub storage_bytes: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredContractInfo {
    code_hash: HashHex,
    deposit_account: AccountId,
    #[serde(default)]
    storage_bytes: u64,
}

/// `contracts_call` dry-run response
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DryRun {
    #[serde(default)]
    gas_required: u64,
    result: DryRunResult,
}

#[derive(Deserialize)]
enum DryRunResult {
    Ok {
        #[serde(default)]
        data: Value,
    },
    Err(Value),
}

fn check_gas_limit(gas_limit: u64) -> Result<()> {
    if gas_limit == 0 || gas_limit > gas::TX_LIMIT {
        return Err(EtridError::Contract(format!(
            "Gas limit {} outside 1..={}",
            gas_limit,
            gas::TX_LIMIT
        )));
    }
    Ok(())
}

/// Planck cost of `gas` VMw
pub fn gas_cost(gas: u64) -> Balance {
    gas as u128 * ONE_ETR / gas::VMW_PER_ETR as u128
}

fn message(method: &str, args: Vec<Value>) -> Value {
    let mut msg = Vec::with_capacity(args.len() + 1);
    msg.push(Value::String(method.to_string()));
    msg.extend(args);
    Value::Array(msg)
}

// ============================================================================
// WRAPPER
// ============================================================================

#[derive(Clone)]
pub struct EtwasmVm {
    client: Client,
}

impl EtwasmVm {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Store contract code on chain
    pub async fn upload_code(&self, signer: &Signer, wasm: &[u8]) -> Result<CodeUploadResult> {
        if wasm.is_empty() {
            return Err(EtridError::validation("wasm", "Contract code is empty"));
        }
        let call = Call::new(PALLET, "uploadCode")
            .arg(format!("0x{}", hex::encode(wasm)))
            .arg(Value::Null)
            .arg("Deterministic");
        let outcome = self.client.submit(signer, call).await?;
        let code_hash = outcome.expect_event(PALLET, "CodeStored")?.text(0)?;
        tracing::info!(code_hash = %code_hash, size = wasm.len(), "Contract code uploaded");
        Ok(CodeUploadResult {
            code_hash,
            tx_hash: outcome.block_hash,
            storage_deposit: 0,
        })
    }

    /// Create a contract instance from uploaded code
    pub async fn instantiate(
        &self,
        signer: &Signer,
        code_hash: &str,
        args: Vec<Value>,
        value: Balance,
        gas_limit: Option<u64>,
        salt: Option<&[u8]>,
    ) -> Result<InstantiateResult> {
        let gas_limit = gas_limit.unwrap_or(gas::DEFAULT_GAS);
        check_gas_limit(gas_limit)?;

        let salt = salt.map(|s| Value::String(format!("0x{}", hex::encode(s))));
        let call = Call::new(PALLET, "instantiate")
            .balance(value)
            .arg(gas_limit)
            .arg(Value::Null)
            .arg(code_hash)
            .arg(Value::Array(args))
            .arg(salt.unwrap_or(Value::Null));
        let outcome = self.client.submit(signer, call).await?;
        let event = outcome.expect_event(PALLET, "Instantiated")?;
        Ok(InstantiateResult {
            deployer: event.text(0)?,
            address: event.text(1)?,
            tx_hash: outcome.block_hash.clone(),
        })
    }

    /// Upload then instantiate in one go
    pub async fn deploy_contract(
        &self,
        signer: &Signer,
        wasm: &[u8],
        args: Vec<Value>,
        value: Balance,
        gas_limit: Option<u64>,
    ) -> Result<ContractDeployment> {
        let gas_used = gas_limit.unwrap_or(gas::DEFAULT_GAS);
        check_gas_limit(gas_used)?;

        let upload = self.upload_code(signer, wasm).await?;
        let instance = self
            .instantiate(signer, &upload.code_hash, args, value, Some(gas_used), None)
            .await?;
        tracing::info!(address = %instance.address, "Contract deployed");
        Ok(ContractDeployment {
            address: instance.address,
            code_hash: upload.code_hash,
            tx_hash: instance.tx_hash,
            gas_used,
            storage_deposit: upload.storage_deposit,
        })
    }

    /// Execute a contract message in a transaction
    pub async fn call_contract(
        &self,
        signer: &Signer,
        contract: &str,
        method: &str,
        args: Vec<Value>,
        value: Balance,
        gas_limit: Option<u64>,
    ) -> Result<CallResult> {
        let gas_limit = gas_limit.unwrap_or(gas::DEFAULT_GAS);
        check_gas_limit(gas_limit)?;

        let call = Call::new(PALLET, "call")
            .arg(contract)
            .balance(value)
            .arg(gas_limit)
            .arg(Value::Null)
            .arg(message(method, args));

        match self.client.submit(signer, call).await {
            Ok(outcome) => Ok(CallResult {
                success: true,
                tx_hash: Some(outcome.block_hash.clone()),
                gas_used: gas_limit,
                events: outcome
                    .events_named(PALLET, "ContractEmitted")
                    .map(|e| -> Result<ContractEvent> {
                        Ok(ContractEvent {
                            contract: e.text(0)?,
                            data: e.field(1)?,
                        })
                    })
                    .collect::<Result<_>>()?,
                error: None,
            }),
            Err(EtridError::Transaction(reason)) => {
                tracing::warn!(contract, method, "Contract call failed: {}", reason);
                Ok(CallResult {
                    success: false,
                    tx_hash: None,
                    gas_used: 0,
                    events: vec![],
                    error: Some(reason),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn dry_run(
        &self,
        contract: &str,
        method: &str,
        args: Vec<Value>,
        value: Balance,
        caller: Option<&str>,
    ) -> Result<DryRun> {
        self.client
            .rpc_call(
                "contracts_call",
                vec![
                    Value::from(caller.unwrap_or(ZERO_CALLER)),
                    Value::from(contract),
                    Value::String(value.to_string()),
                    Value::Null,
                    Value::Null,
                    message(method, args),
                ],
            )
            .await
    }

    /// Read-only call; returns the decoded output
    pub async fn query_contract(
        &self,
        contract: &str,
        method: &str,
        args: Vec<Value>,
        caller: Option<&str>,
    ) -> Result<Value> {
        match self.dry_run(contract, method, args, 0, caller).await?.result {
            DryRunResult::Ok { data } => Ok(data),
            DryRunResult::Err(err) => Err(EtridError::Contract(format!("Query failed: {}", err))),
        }
    }

    pub async fn estimate_gas(
        &self,
        contract: &str,
        method: &str,
        args: Vec<Value>,
        value: Balance,
        caller: Option<&str>,
    ) -> Result<GasEstimate> {
        let dry_run = self.dry_run(contract, method, args, value, caller).await?;
        if let DryRunResult::Err(err) = dry_run.result {
            return Err(EtridError::Contract(format!("Gas estimation failed: {}", err)));
        }
        Ok(GasEstimate {
            gas_required: dry_run.gas_required,
            storage_deposit: 0,
            cost: gas_cost(dry_run.gas_required),
        })
    }

    pub async fn get_contract_info(&self, address: &str) -> Result<ContractInfo> {
        let info = self
            .client
            .query::<StoredContractInfo>(PALLET, "contractInfoOf", vec![address.into()])
            .await?
            .require("Contract")?;
        let balance = self.client.free_balance(address).await?;
        Ok(ContractInfo {
            address: address.to_string(),
            code_hash: info.code_hash,
            deployer: info.deposit_account,
            balance,
            storage_bytes: info.storage_bytes,
        })
    }

    pub async fn get_code_hash(&self, address: &str) -> Result<HashHex> {
        Ok(self.get_contract_info(address).await?.code_hash)
    }

    pub async fn is_contract(&self, address: &str) -> Result<bool> {
        let info = self
            .client
            .query_raw(PALLET, "contractInfoOf", vec![address.into()])
            .await?;
        Ok(matches!(info, Lookup::Found(_)))
    }
}
