//! Scalar aliases and decoding helpers for on-chain values

use crate::error::{EtridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token amount in the smallest unit (planck)
pub type Balance = u128;

/// Signed token delta
pub type SignedBalance = i128;

/// Block height
pub type BlockNumber = u64;

/// Account address (SS58 or 0x-hex), treated as opaque
pub type AccountId = String;

/// 0x-prefixed hex hash
pub type HashHex = String;

// ============================================================================
// LOOKUP (remote optional values)
// ============================================================================

/// Decoded remote optional value
///
/// Chain storage returns either a value or nothing; every query in the SDK
/// decodes into this sum type before converting absence into
/// [`EtridError::NotFound`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Whether the value is present
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Convert into an `Option`
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }

    /// Map the inner value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Self::Found(v) => Lookup::Found(f(v)),
            Self::NotFound => Lookup::NotFound,
        }
    }

    /// Convert absence into `EtridError::NotFound(what)`
    pub fn require(self, what: &str) -> Result<T> {
        match self {
            Self::Found(v) => Ok(v),
            Self::NotFound => Err(EtridError::not_found(what)),
        }
    }
}

impl<T: Default> Lookup<T> {
    /// Inner value, or the type's default when absent
    pub fn or_default(self) -> T {
        self.found().unwrap_or_default()
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::NotFound,
        }
    }
}

// ============================================================================
// BALANCE DECODING
// ============================================================================

/// Decode a balance from a JSON number, decimal string or 0x-hex string
pub fn balance_from_value(value: &Value) -> Result<Balance> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| EtridError::InvalidAmount(format!("not an unsigned integer: {}", n))),
        Value::String(s) => parse_balance_str(s),
        other => Err(EtridError::Serialization(format!(
            "expected balance, got {}",
            other
        ))),
    }
}

fn parse_balance_str(s: &str) -> Result<Balance> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) if hex_digits.is_empty() => Ok(0),
        Some(hex_digits) => u128::from_str_radix(hex_digits, 16),
        None => s.replace(',', "").parse::<u128>(),
    };
    parsed.map_err(|_| EtridError::InvalidAmount(s.to_string()))
}

/// Serde adapter for `u128` balances
///
/// Serializes as a decimal string (JSON numbers cannot hold 128 bits) and
/// accepts numbers, decimal strings and hex strings on input.
pub mod balance_serde {
    use super::Balance;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Balance, D::Error> {
        deserializer.deserialize_any(BalanceVisitor)
    }

    struct BalanceVisitor;

    impl<'de> Visitor<'de> for BalanceVisitor {
        type Value = Balance;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an unsigned integer, decimal string or 0x-hex string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Balance, E> {
            Ok(v as Balance)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Balance, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Balance, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative balance: {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Balance, E> {
            super::parse_balance_str(v).map_err(E::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "balance_serde")]
        amount: Balance,
    }

    #[test]
    fn test_lookup_require() {
        let found: Lookup<u32> = Some(7).into();
        assert_eq!(found.require("value"), Ok(7));

        let missing: Lookup<u32> = None.into();
        assert_eq!(
            missing.require("Channel"),
            Err(EtridError::NotFound("Channel".into()))
        );
    }

    #[test]
    fn test_lookup_or_default() {
        assert_eq!(Lookup::<u128>::NotFound.or_default(), 0);
        assert_eq!(Lookup::Found(5u128).or_default(), 5);
    }

    #[test]
    fn test_balance_from_value() {
        assert_eq!(balance_from_value(&json!(42)).unwrap(), 42);
        assert_eq!(
            balance_from_value(&json!("1000000000000000000000")).unwrap(),
            1_000 * crate::constants::ONE_ETR
        );
        assert_eq!(balance_from_value(&json!("0xff")).unwrap(), 255);
        assert!(balance_from_value(&json!(-1)).is_err());
        assert!(balance_from_value(&json!(null)).is_err());
    }

    #[test]
    fn test_balance_serde() {
        let h: Holder = serde_json::from_value(json!({ "amount": "0x10" })).unwrap();
        assert_eq!(h.amount, 16);

        let h: Holder = serde_json::from_value(json!({ "amount": 12 })).unwrap();
        assert_eq!(serde_json::to_value(&h).unwrap(), json!({ "amount": "12" }));
    }
}
