//! # Ëtrid Core
//!
//! Shared building blocks for the Ëtrid SDK crates:
//! - `format` - display helpers for token amounts, addresses, hashes and durations
//! - `types` - on-chain scalar aliases and the `Lookup` decoding of remote optionals
//! - `error` - the SDK-wide error taxonomy
//! - `constants` - native token units and chain timing
//!
//! ## Amounts
//!
//! ```text
//!   1 ETR = 10^18 planck
//!
//!   u128 planck ──format_balance──► "1,234.5 ETR"
//!        ▲                               │
//!        └──────────parse_balance────────┘
//! ```

pub mod constants;
pub mod error;
pub mod format;
pub mod types;

pub use error::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::constants::{DECIMALS, ONE_ETR};
    pub use crate::error::{EtridError, Result};
    pub use crate::format::{format_balance, parse_balance, BalanceFormat};
    pub use crate::types::*;
}
