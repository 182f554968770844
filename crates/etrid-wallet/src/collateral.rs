//! Collateral sizing and liquidation prices

use crate::error::{ServiceError, ServiceResult};
use crate::lending::LIQUIDATION_HEALTH;

/// Collateral price at which the position reaches the liquidation health
///
/// `borrow × 1.2 / (amount × threshold)`
pub fn liquidation_price(
    borrow_value: f64,
    collateral_amount: f64,
    liquidation_threshold_pct: f64,
) -> ServiceResult<f64> {
    if collateral_amount <= 0.0 {
        return Err(ServiceError::invalid("Collateral amount must be positive"));
    }
    if !(liquidation_threshold_pct > 0.0 && liquidation_threshold_pct <= 100.0) {
        return Err(ServiceError::invalid("Liquidation threshold must be between 0 and 100"));
    }
    Ok(borrow_value * (LIQUIDATION_HEALTH / 100.0)
        / (collateral_amount * liquidation_threshold_pct / 100.0))
}

/// Collateral value as a percentage of the debt
pub fn collateral_ratio(collateral_value: f64, borrow_value: f64) -> ServiceResult<f64> {
    if borrow_value <= 0.0 {
        return Err(ServiceError::invalid("Borrow value must be positive"));
    }
    Ok(collateral_value / borrow_value * 100.0)
}

/// Units of collateral at `collateral_price` needed to reach `target_ratio_pct`
pub fn required_collateral(
    borrow_value: f64,
    target_ratio_pct: f64,
    collateral_price: f64,
) -> ServiceResult<f64> {
    if collateral_price <= 0.0 {
        return Err(ServiceError::invalid("Collateral price must be positive"));
    }
    if target_ratio_pct <= 0.0 {
        return Err(ServiceError::invalid("Target ratio must be positive"));
    }
    Ok(borrow_value * target_ratio_pct / 100.0 / collateral_price)
}
