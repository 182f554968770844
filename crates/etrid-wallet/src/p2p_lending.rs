//! # Peer-to-peer lending
//!
//! Lenders post offers; borrowers accept them by pledging collateral worth at
//! least the offer's minimum ratio. Interest is simple and accrues by the
//! second from the loan start.
//!
//! ```text
//!   Offer: Active ──accept──► Accepted
//!            └────cancel────► Cancelled
//!
//!   Loan:  Active ──repay in full──► Repaid
//! ```

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Duration, Utc};
use etrid_core::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Slack for float comparisons on repayment totals
const REPAY_EPSILON: f64 = 1e-9;

/// Finite and strictly positive; rejects NaN
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// USD prices for collateral valuation
pub trait PriceFeed: Send + Sync {
    fn price(&self, asset: &str) -> Option<f64>;
}

/// Fixed price table
#[derive(Clone, Debug)]
pub struct StaticPrices(HashMap<String, f64>);

impl StaticPrices {
    pub fn new(prices: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self(prices.into_iter().collect())
    }
}

impl Default for StaticPrices {
    fn default() -> Self {
        Self::new(
            [("ÉTR", 8.0), ("BTC", 45_000.0), ("ETH", 2_500.0), ("USDT", 1.0), ("USDC", 1.0)]
                .into_iter()
                .map(|(asset, price)| (asset.to_string(), price)),
        )
    }
}

impl PriceFeed for StaticPrices {
    fn price(&self, asset: &str) -> Option<f64> {
        self.0.get(asset).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Active,
    Accepted,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Repaid,
    Defaulted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanRole {
    Lender,
    Borrower,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferInput {
    pub asset: String,
    pub amount: f64,
    pub apy: f64,
    pub duration_days: u32,
    /// Percent, e.g. 150.0
    pub min_collateral_ratio: f64,
    /// Restrict the offer to one borrower
    pub borrower: Option<AccountId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoanOffer {
    pub id: Uuid,
    pub lender: AccountId,
    pub asset: String,
    pub amount: f64,
    pub apy: f64,
    pub duration_days: u32,
    pub min_collateral_ratio: f64,
    pub borrower: Option<AccountId>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub asset: String,
    pub amount: f64,
    pub value_usd: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct P2pLoan {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub lender: AccountId,
    pub borrower: AccountId,
    pub asset: String,
    pub amount: f64,
    pub apy: f64,
    pub collateral_ratio: f64,
    pub collateral: Vec<Collateral>,
    pub status: LoanStatus,
    pub start: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub amount_repaid: f64,
}

impl P2pLoan {
    pub fn interest_at(&self, now: DateTime<Utc>) -> f64 {
        let years = (now - self.start).num_seconds().max(0) as f64 / SECONDS_PER_YEAR;
        self.amount * (self.apy / 100.0) * years
    }

    pub fn total_owed_at(&self, now: DateTime<Utc>) -> f64 {
        self.amount + self.interest_at(now)
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> f64 {
        (self.total_owed_at(now) - self.amount_repaid).max(0.0)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Active && now > self.due
    }
}

/// Offer search criteria; unset bounds match everything
#[derive(Clone, Debug, Default)]
pub struct OfferFilter {
    pub asset: Option<String>,
    pub min_apy: Option<f64>,
    pub max_apy: Option<f64>,
    pub min_duration_days: Option<u32>,
    pub max_duration_days: Option<u32>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

impl OfferFilter {
    fn matches(&self, offer: &LoanOffer) -> bool {
        self.asset.as_deref().map_or(true, |a| offer.asset == a)
            && self.min_apy.map_or(true, |v| offer.apy >= v)
            && self.max_apy.map_or(true, |v| offer.apy <= v)
            && self.min_duration_days.map_or(true, |v| offer.duration_days >= v)
            && self.max_duration_days.map_or(true, |v| offer.duration_days <= v)
            && self.min_amount.map_or(true, |v| offer.amount >= v)
            && self.max_amount.map_or(true, |v| offer.amount <= v)
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct P2pLending {
    clock: Arc<dyn Clock>,
    prices: Arc<dyn PriceFeed>,
    offers: Vec<LoanOffer>,
    loans: Vec<P2pLoan>,
}

impl P2pLending {
    pub fn new(clock: Arc<dyn Clock>, prices: Arc<dyn PriceFeed>) -> Self {
        Self {
            clock,
            prices,
            offers: Vec::new(),
            loans: Vec::new(),
        }
    }

    fn price(&self, asset: &str) -> ServiceResult<f64> {
        self.prices
            .price(asset)
            .ok_or_else(|| ServiceError::invalid(format!("No price for asset {}", asset)))
    }

    pub fn create_offer(&mut self, lender: &str, input: OfferInput) -> ServiceResult<&LoanOffer> {
        if !is_positive(input.amount) {
            return Err(ServiceError::invalid("Loan amount must be positive"));
        }
        if !(input.apy.is_finite() && input.apy >= 0.0) {
            return Err(ServiceError::invalid("APY must not be negative"));
        }
        if input.duration_days == 0 {
            return Err(ServiceError::invalid("Duration must be at least one day"));
        }
        if !is_positive(input.min_collateral_ratio) {
            return Err(ServiceError::invalid("Collateral ratio must be positive"));
        }
        self.price(&input.asset)?;

        self.offers.push(LoanOffer {
            id: Uuid::new_v4(),
            lender: lender.to_string(),
            asset: input.asset,
            amount: input.amount,
            apy: input.apy,
            duration_days: input.duration_days,
            min_collateral_ratio: input.min_collateral_ratio,
            borrower: input.borrower,
            status: OfferStatus::Active,
            created_at: self.clock.now(),
        });
        self.offers.last().ok_or(ServiceError::NotFound("Offer"))
    }

    pub fn cancel_offer(&mut self, lender: &str, offer_id: Uuid) -> ServiceResult<()> {
        let offer = self
            .offers
            .iter_mut()
            .find(|o| o.id == offer_id && o.lender == lender)
            .ok_or_else(|| ServiceError::NotPermitted("Offer not found or you are not the lender".into()))?;
        if offer.status != OfferStatus::Active {
            return Err(ServiceError::InvalidState("Only active offers can be cancelled".into()));
        }
        offer.status = OfferStatus::Cancelled;
        Ok(())
    }

    /// Active offers matching `filter`
    pub fn offers(&self, filter: &OfferFilter) -> Vec<&LoanOffer> {
        self.offers
            .iter()
            .filter(|o| o.status == OfferStatus::Active && filter.matches(o))
            .collect()
    }

    pub fn offers_by(&self, lender: &str) -> Vec<&LoanOffer> {
        self.offers.iter().filter(|o| o.lender == lender).collect()
    }

    /// Take an offer, pledging `collateral` as `(asset, amount)` pairs
    pub fn accept_offer(
        &mut self,
        borrower: &str,
        offer_id: Uuid,
        collateral: &[(String, f64)],
    ) -> ServiceResult<&P2pLoan> {
        let offer = self
            .offers
            .iter()
            .find(|o| o.id == offer_id && o.status == OfferStatus::Active)
            .ok_or_else(|| {
                ServiceError::InvalidState("Loan offer not found or no longer active".into())
            })?;
        if offer.borrower.as_deref().is_some_and(|b| b != borrower) {
            return Err(ServiceError::NotPermitted(
                "This loan offer is not available to you".into(),
            ));
        }
        if offer.lender == borrower {
            return Err(ServiceError::NotPermitted("Cannot borrow from your own offer".into()));
        }

        if collateral.iter().any(|(_, amount)| !is_positive(*amount)) {
            return Err(ServiceError::invalid("Collateral amounts must be positive"));
        }
        let pledged = collateral
            .iter()
            .map(|(asset, amount)| -> ServiceResult<Collateral> {
                Ok(Collateral {
                    asset: asset.clone(),
                    amount: *amount,
                    value_usd: amount * self.price(asset)?,
                })
            })
            .collect::<ServiceResult<Vec<_>>>()?;
        let collateral_value: f64 = pledged.iter().map(|c| c.value_usd).sum();
        let loan_value = offer.amount * self.price(&offer.asset)?;
        let ratio = collateral_value / loan_value * 100.0;
        if !ratio.is_finite() {
            return Err(ServiceError::invalid("Collateral could not be valued"));
        }
        if ratio < offer.min_collateral_ratio {
            return Err(ServiceError::InsufficientFunds(format!(
                "Insufficient collateral. Required: {}%, Provided: {:.2}%",
                offer.min_collateral_ratio, ratio
            )));
        }

        let now = self.clock.now();
        let loan = P2pLoan {
            id: Uuid::new_v4(),
            offer_id,
            lender: offer.lender.clone(),
            borrower: borrower.to_string(),
            asset: offer.asset.clone(),
            amount: offer.amount,
            apy: offer.apy,
            collateral_ratio: ratio,
            collateral: pledged,
            status: LoanStatus::Active,
            start: now,
            due: now + Duration::days(offer.duration_days as i64),
            amount_repaid: 0.0,
        };
        tracing::info!(loan = %loan.id, ratio, "P2P loan opened");

        if let Some(offer) = self.offers.iter_mut().find(|o| o.id == offer_id) {
            offer.status = OfferStatus::Accepted;
        }
        self.loans.push(loan);
        self.loans.last().ok_or(ServiceError::NotFound("Loan"))
    }

    /// Pay down a loan; it closes once principal and interest are covered
    pub fn repay(&mut self, borrower: &str, loan_id: Uuid, amount: f64) -> ServiceResult<&P2pLoan> {
        if !is_positive(amount) {
            return Err(ServiceError::invalid("Repayment must be positive"));
        }
        let now = self.clock.now();
        let loan = self
            .loans
            .iter_mut()
            .find(|l| l.id == loan_id && l.borrower == borrower)
            .ok_or_else(|| {
                ServiceError::NotPermitted("Loan not found or you are not the borrower".into())
            })?;
        if loan.status != LoanStatus::Active {
            return Err(ServiceError::InvalidState("Loan is not active".into()));
        }
        if amount > loan.remaining_at(now) + REPAY_EPSILON {
            return Err(ServiceError::invalid("Repayment amount exceeds remaining debt"));
        }

        loan.amount_repaid += amount;
        if loan.amount_repaid + REPAY_EPSILON >= loan.total_owed_at(now) {
            loan.status = LoanStatus::Repaid;
        }
        Ok(&*loan)
    }

    pub fn loan(&self, id: Uuid) -> ServiceResult<&P2pLoan> {
        self.loans
            .iter()
            .find(|l| l.id == id)
            .ok_or(ServiceError::NotFound("Loan"))
    }

    /// Interest accrued on a loan so far
    pub fn interest_accrued(&self, id: Uuid) -> ServiceResult<f64> {
        Ok(self.loan(id)?.interest_at(self.clock.now()))
    }

    pub fn loans_for(&self, user: &str, role: LoanRole) -> Vec<&P2pLoan> {
        self.loans
            .iter()
            .filter(|l| match role {
                LoanRole::Lender => l.lender == user,
                LoanRole::Borrower => l.borrower == user,
            })
            .collect()
    }

    /// Mark active loans past their due date as defaulted
    pub fn mark_defaults(&mut self) -> usize {
        let now = self.clock.now();
        let mut marked = 0;
        for loan in self.loans.iter_mut().filter(|l| l.is_overdue(now)) {
            loan.status = LoanStatus::Defaulted;
            marked += 1;
        }
        marked
    }
}
