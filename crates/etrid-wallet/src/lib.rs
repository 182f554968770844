//! # Ëtrid Wallet Services
//!
//! Financial and social features a wallet builds on top of the chain SDK.
//! Every service keeps its state in memory and takes its time from an
//! injected [`Clock`], so behaviour is reproducible under test.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        ETRID WALLET SERVICES                         │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  Calculators     lending (health factor)     collateral (liq. price) │
//! │  Savings         savings_goal ◄──────────── auto_save (rules)        │
//! │  Credit          p2p_lending (offers, loans, PriceFeed)              │
//! │  Social          bill_split   contacts ──► username   social_recovery│
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money
//!
//! | Service                          | Unit                   |
//! |----------------------------------|------------------------|
//! | savings, auto-save, bill split   | [`Cents`] (exact)      |
//! | lending and collateral math      | `f64` value            |
//! | P2P lending                      | `f64` asset quantity   |

pub mod auto_save;
pub mod bill_split;
pub mod clock;
pub mod collateral;
pub mod contacts;
pub mod error;
pub mod lending;
pub mod p2p_lending;
pub mod savings_goal;
pub mod social_recovery;
pub mod username;

pub use auto_save::{AutoSave, AutoSaveRule, Direction, Frequency, RuleExecution, RuleKind};
pub use bill_split::{BillSplit, BillSplitInput, BillSplits, ParticipantInput, SplitKind, SplitStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use contacts::{avatar_color, Contact, ContactInput, Contacts};
pub use error::{ServiceError, ServiceResult};
pub use lending::{health_factor, position_health, HealthStatus, PositionHealth};
pub use p2p_lending::{LoanOffer, OfferInput, P2pLending, P2pLoan, PriceFeed, StaticPrices};
pub use savings_goal::{GoalInput, SavingsGoal, SavingsGoals};
pub use social_recovery::{recommended_threshold, SocialRecovery};
pub use username::{validate_username, UsernameRegistry};

/// Fiat amount in hundredths
pub type Cents = u64;

/// Reject anything that is not an Ëtrid account address
pub(crate) fn check_address(address: &str) -> ServiceResult<()> {
    etrid_core::format::validate_address(address)
        .map_err(|e| ServiceError::invalid(e.to_string()))
}
