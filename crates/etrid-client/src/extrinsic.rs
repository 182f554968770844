//! Extrinsic calls, status updates and emitted events

use etrid_core::{balance_from_value, AccountId, Balance, EtridError, HashHex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// CALLS
// ============================================================================

/// A pallet call with positional arguments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub pallet: String,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Call {
    pub fn new(pallet: &str, name: &str) -> Self {
        Self {
            pallet: pallet.to_string(),
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Append a JSON argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append a balance argument, encoded as a decimal string
    pub fn balance(mut self, amount: Balance) -> Self {
        self.args.push(Value::String(amount.to_string()));
        self
    }

    /// `pallet.name`
    pub fn label(&self) -> String {
        format!("{}.{}", self.pallet, self.name)
    }
}

/// A call signed by an account at a given nonce
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedCall {
    pub call: Call,
    pub signer: AccountId,
    pub nonce: u64,
    /// Hex ed25519 signature over the canonical payload
    pub signature: String,
}

// ============================================================================
// STATUS STREAM
// ============================================================================

/// Lifecycle updates of a submitted extrinsic
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TxStatus {
    Ready,
    Broadcast,
    InBlock { block_hash: HashHex },
    Finalized(FinalizedBlock),
    Dropped,
    Usurped { by: HashHex },
    Invalid { reason: String },
}

impl TxStatus {
    /// Statuses after which no further update arrives
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized(_) | Self::Dropped | Self::Usurped { .. } | Self::Invalid { .. }
        )
    }
}

/// Block in which the extrinsic was finalized, with its outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizedBlock {
    pub block_hash: HashHex,
    #[serde(default)]
    pub events: Vec<ChainEvent>,
    #[serde(default)]
    pub dispatch_error: Option<DispatchError>,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Event emitted by a pallet, fields in declaration order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub pallet: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Value>,
}

impl ChainEvent {
    pub fn new(pallet: &str, name: &str, fields: Vec<Value>) -> Self {
        Self {
            pallet: pallet.to_string(),
            name: name.to_string(),
            fields,
        }
    }

    pub fn is(&self, pallet: &str, name: &str) -> bool {
        self.pallet == pallet && self.name == name
    }

    fn raw(&self, index: usize) -> etrid_core::Result<&Value> {
        self.fields.get(index).ok_or_else(|| {
            EtridError::Serialization(format!(
                "{}.{} has no field at position {}",
                self.pallet, self.name, index
            ))
        })
    }

    /// Decode the field at `index`
    pub fn field<T: DeserializeOwned>(&self, index: usize) -> etrid_core::Result<T> {
        let raw = self.raw(index)?;
        serde_json::from_value(raw.clone()).map_err(|e| {
            EtridError::Serialization(format!(
                "{}.{} field {}: {}",
                self.pallet, self.name, index, e
            ))
        })
    }

    /// Decode the balance at `index`
    pub fn balance(&self, index: usize) -> etrid_core::Result<Balance> {
        balance_from_value(self.raw(index)?)
    }

    /// Field at `index` rendered as text, whatever its JSON type
    pub fn text(&self, index: usize) -> etrid_core::Result<String> {
        Ok(match self.raw(index)? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Successful finalized outcome of a submitted call
#[derive(Clone, Debug, PartialEq)]
pub struct TxOutcome {
    pub block_hash: HashHex,
    pub events: Vec<ChainEvent>,
}

impl TxOutcome {
    /// First event matching `pallet.name`
    ///
    /// When a call emits several events of the same type only the first one
    /// is returned; use [`TxOutcome::events_named`] to see all of them.
    pub fn find_event(&self, pallet: &str, name: &str) -> Option<&ChainEvent> {
        self.events.iter().find(|e| e.is(pallet, name))
    }

    /// Like [`TxOutcome::find_event`] but absence is an error
    pub fn expect_event(&self, pallet: &str, name: &str) -> etrid_core::Result<&ChainEvent> {
        self.find_event(pallet, name)
            .ok_or_else(|| EtridError::MissingEvent(format!("{}.{}", pallet, name)))
    }

    /// Every event matching `pallet.name`, in emission order
    pub fn events_named<'a>(
        &'a self,
        pallet: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ChainEvent> + 'a {
        self.events.iter().filter(move |e| e.is(pallet, name))
    }
}

// ============================================================================
// DISPATCH ERRORS
// ============================================================================

/// Why a finalized extrinsic failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DispatchError {
    /// Error declared by a pallet, identified by module and error index
    Module { index: u8, error: u8 },
    BadOrigin,
    CannotLookup,
    Other { message: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Module { index, error } => {
                write!(f, "{{\"module\":{{\"index\":{},\"error\":{}}}}}", index, error)
            }
            Self::BadOrigin => write!(f, "BadOrigin"),
            Self::CannotLookup => write!(f, "CannotLookup"),
            Self::Other { message } => write!(f, "{}", message),
        }
    }
}

/// Metadata describing a pallet error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleErrorInfo {
    pub section: String,
    pub name: String,
    #[serde(default)]
    pub docs: Vec<String>,
}

impl fmt::Display for ModuleErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}: {}", self.section, self.name, self.docs.join(" "))
    }
}
