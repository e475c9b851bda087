//! Strategy manager decision math
//!
//! Pure functions: crossover and RSI signals, the confirmation window, and
//! the dollar valuation used to price a MACO proposal.
//!
//! # Units
//!
//! - Prices and dollar values are scaled by 1e18
//! - Percentages are whole numbers (5 = 5%)
//! - Allocations are fractions of `allocation_precision`

use serde::{Deserialize, Serialize};
use setkit_core::units::{ether, mul_div_floor, scale};
use setkit_core::{
    Address, Quantity, Result, StrategyError, Timestamp, ValidationError,
};
use set_assertions::same_length;

use crate::state::{Holding, Signal};

/// Which collateral `current_set` is
pub fn classify_holding(
    current_set: Address,
    risk_collateral: Address,
    stable_collateral: Address,
) -> Result<Holding> {
    if current_set == risk_collateral {
        Ok(Holding::RiskAsset)
    } else if current_set == stable_collateral {
        Ok(Holding::StableAsset)
    } else {
        Err(StrategyError::UnknownCollateral { current_set }.into())
    }
}

/// Fail unless the price has crossed the moving average away from `holding`
pub fn check_crossover(holding: Holding, price: Quantity, moving_average: Quantity) -> Result<()> {
    let crossed = match holding {
        Holding::RiskAsset => price < moving_average,
        Holding::StableAsset => price > moving_average,
    };
    if !crossed {
        return Err(StrategyError::CrossoverCondition {
            expected: holding.expected_crossover(),
            indicator: price,
            reference: moving_average,
        }
        .into());
    }
    Ok(())
}

/// Fail unless `min <= now - initial <= max`
pub fn check_confirmation_window(
    initial: Timestamp,
    now: Timestamp,
    min: Timestamp,
    max: Timestamp,
) -> Result<()> {
    let elapsed = now.saturating_sub(initial);
    if elapsed < min || elapsed > max {
        return Err(StrategyError::ConfirmationWindow { elapsed, min, max }.into());
    }
    Ok(())
}

/// Fail while an earlier initial propose can still be confirmed
pub fn check_no_pending_proposal(
    initial: Timestamp,
    max: Timestamp,
    now: Timestamp,
) -> Result<()> {
    let pending_until = initial.saturating_add(max);
    if now <= pending_until {
        return Err(StrategyError::ProposalPending { pending_until, now }.into());
    }
    Ok(())
}

/// RSI bounds of an asset-pair trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsiBounds {
    pub lower: Quantity,
    pub upper: Quantity,
}

impl RsiBounds {
    /// Bullish at or above `upper`, bearish below `lower`, neutral in between
    pub fn signal(&self, rsi: Quantity) -> Result<Signal> {
        if rsi >= self.upper {
            Ok(Signal::Bullish)
        } else if rsi < self.lower {
            Ok(Signal::Bearish)
        } else {
            Err(StrategyError::NeutralSignal {
                rsi,
                lower: self.lower,
                upper: self.upper,
            }
            .into())
        }
    }

    pub fn is_bullish(&self, rsi: Quantity) -> Result<bool> {
        Ok(self.signal(rsi)? == Signal::Bullish)
    }
}

/// Base-asset allocation the manager targets for `signal`
pub fn allocation_target(
    signal: Signal,
    bullish_allocation: Quantity,
    allocation_precision: Quantity,
) -> Result<Quantity> {
    match signal {
        Signal::Bullish => Ok(bullish_allocation),
        Signal::Bearish => allocation_precision.checked_sub(bullish_allocation).ok_or_else(|| {
            ValidationError::InvalidQuantity {
                name: "bullishBaseAssetAllocation".to_string(),
                reason: format!("exceeds allocation precision {}", allocation_precision),
            }
            .into()
        }),
    }
}

/// Dollar value of one whole Set (1e18 base units)
///
/// `Σ 1e18 * units[i] * prices[i] / natural_unit / 10^decimals[i]`
pub fn calculate_set_dollar_value(
    units: &[Quantity],
    natural_unit: Quantity,
    prices: &[Quantity],
    decimals: &[u8],
) -> Result<Quantity> {
    same_length("units", units, "prices", prices)?;
    same_length("units", units, "decimals", decimals)?;

    let mut total = Quantity::zero();
    for ((unit, price), decimals) in units.iter().zip(prices).zip(decimals) {
        let tokens = mul_div_floor(ether(1), *unit, natural_unit, "set dollar value")?;
        let value = mul_div_floor(tokens, *price, scale(*decimals as u32), "set dollar value")?;
        total = total.checked_add(value).ok_or(ValidationError::Overflow {
            operation: "set dollar value",
        })?;
    }
    Ok(total)
}

/// Auction start and pivot prices around the fair value of the swap
///
/// `fair = next_value * divisor / current_value`, start is `start_pct` below
/// it and pivot `pivot_pct` above.
pub fn calculate_auction_price_parameters(
    current_set_value: Quantity,
    next_set_value: Quantity,
    price_divisor: Quantity,
    start_percentage: u64,
    pivot_percentage: u64,
) -> Result<(Quantity, Quantity)> {
    let hundred = Quantity::from(100u64);
    let fair = mul_div_floor(next_set_value, price_divisor, current_set_value, "fair value")?;
    let below = mul_div_floor(fair, Quantity::from(start_percentage), hundred, "auction start price")?;
    let above = mul_div_floor(fair, Quantity::from(pivot_percentage), hundred, "auction pivot price")?;

    let start = fair.saturating_sub(below);
    let pivot = fair.checked_add(above).ok_or(ValidationError::Overflow {
        operation: "auction pivot price",
    })?;
    Ok((start, pivot))
}
