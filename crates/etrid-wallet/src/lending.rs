//! # Lending calculator
//!
//! Health of a collateralized loan and simple interest accrual.
//!
//! | Health factor | Status        |
//! |---------------|---------------|
//! | >= 200        | Safe          |
//! | 150 - 200     | Warning       |
//! | 120 - 150     | Danger        |
//! | < 120         | Liquidatable  |

use crate::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Health factor below which a position is liquidated
pub const LIQUIDATION_HEALTH: f64 = 120.0;

const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Safe,
    Warning,
    Danger,
    Liquidatable,
}

impl HealthStatus {
    pub fn from_factor(factor: f64) -> Self {
        if factor >= 200.0 {
            Self::Safe
        } else if factor >= 150.0 {
            Self::Warning
        } else if factor >= LIQUIDATION_HEALTH {
            Self::Danger
        } else {
            Self::Liquidatable
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Liquidatable => "liquidatable",
        }
    }
}

fn check_pct(name: &str, pct: f64) -> ServiceResult<()> {
    if !(pct > 0.0 && pct <= 100.0) {
        return Err(ServiceError::invalid(format!("{} must be between 0 and 100", name)));
    }
    Ok(())
}

/// `collateral × threshold / borrowed × 100`; infinite with no debt
pub fn health_factor(
    collateral_value: f64,
    borrowed_value: f64,
    liquidation_threshold_pct: f64,
) -> ServiceResult<f64> {
    check_pct("Liquidation threshold", liquidation_threshold_pct)?;
    if collateral_value < 0.0 || borrowed_value < 0.0 {
        return Err(ServiceError::invalid("Values must not be negative"));
    }
    if borrowed_value == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(collateral_value * (liquidation_threshold_pct / 100.0) / borrowed_value * 100.0)
}

/// Largest debt `collateral_value` supports at `max_ltv_pct`
pub fn max_borrow(collateral_value: f64, max_ltv_pct: f64) -> ServiceResult<f64> {
    check_pct("Loan-to-value", max_ltv_pct)?;
    Ok(collateral_value * max_ltv_pct / 100.0)
}

/// Simple interest on `principal` over `days`
pub fn accrue_interest(principal: f64, apy_pct: f64, days: f64) -> f64 {
    principal * (apy_pct / 100.0) * (days / DAYS_PER_YEAR)
}

/// Snapshot of a borrowing position
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionHealth {
    pub health_factor: f64,
    pub status: HealthStatus,
    /// Further debt allowed before the position turns liquidatable
    pub borrow_headroom: f64,
}

pub fn position_health(
    collateral_value: f64,
    borrowed_value: f64,
    liquidation_threshold_pct: f64,
) -> ServiceResult<PositionHealth> {
    let factor = health_factor(collateral_value, borrowed_value, liquidation_threshold_pct)?;
    let ceiling = collateral_value * (liquidation_threshold_pct / 100.0) / (LIQUIDATION_HEALTH / 100.0);
    Ok(PositionHealth {
        health_factor: factor,
        status: HealthStatus::from_factor(factor),
        borrow_headroom: (ceiling - borrowed_value).max(0.0),
    })
}
