//! Rebalancing auction math
//!
//! Pure functions over values read from the ledger. No I/O, no async.
//!
//! # Units
//!
//! - Units and natural units are raw on-chain integers (`Quantity`)
//! - Prices are fractions `numerator / denominator`, the denominator being the
//!   auction curve's price divisor
//! - Every division truncates toward zero, matching the contracts

use std::cmp::{max, min};

use setkit_core::units::{checked_div, checked_mul, mul_div_floor};
use setkit_core::{Address, ProtocolError, Quantity, Result, Timestamp, ValidationError};
use set_assertions::{bid_is_multiple_of_minimum_bid, bid_within_remaining, same_length};

use crate::state::{AuctionPrice, CombinedArrays, TokenFlows};

/// Ordered union of two component lists: current first, then next-only additions
pub fn build_combined_token_array(current: &[Address], next: &[Address]) -> Vec<Address> {
    let mut combined = Vec::with_capacity(current.len() + next.len());
    for token in current.iter().chain(next) {
        if !combined.contains(token) {
            combined.push(*token);
        }
    }
    combined
}

/// Units of `target` laid out over `combined`, scaled to the larger natural unit
///
/// Components of `combined` missing from `target` get a zero unit.
pub fn build_combined_unit_array(
    target_components: &[Address],
    target_units: &[Quantity],
    target_natural_unit: Quantity,
    other_natural_unit: Quantity,
    combined: &[Address],
) -> Result<Vec<Quantity>> {
    same_length("components", target_components, "units", target_units)?;
    let common_unit = max(target_natural_unit, other_natural_unit);

    combined
        .iter()
        .map(|token| match target_components.iter().position(|c| c == token) {
            Some(j) => Ok(mul_div_floor(
                target_units[j],
                common_unit,
                target_natural_unit,
                "combined unit",
            )?),
            None => Ok(Quantity::zero()),
        })
        .collect()
}

/// `max(current, next) * price_divisor`
pub fn compute_minimum_bid(
    current_natural_unit: Quantity,
    next_natural_unit: Quantity,
    price_divisor: Quantity,
) -> Result<Quantity> {
    Ok(checked_mul(
        max(current_natural_unit, next_natural_unit),
        price_divisor,
        "minimum bid",
    )?)
}

/// Everything `startRebalance` commits, derived from both Sets
pub fn compute_combined_arrays(
    current: (&[Address], &[Quantity], Quantity),
    next: (&[Address], &[Quantity], Quantity),
    price_divisor: Quantity,
) -> Result<CombinedArrays> {
    let (current_components, current_units, current_natural_unit) = current;
    let (next_components, next_units, next_natural_unit) = next;

    let combined_token_array = build_combined_token_array(current_components, next_components);
    let combined_current_units = build_combined_unit_array(
        current_components,
        current_units,
        current_natural_unit,
        next_natural_unit,
        &combined_token_array,
    )?;
    let combined_next_units = build_combined_unit_array(
        next_components,
        next_units,
        next_natural_unit,
        current_natural_unit,
        &combined_token_array,
    )?;
    let minimum_bid = compute_minimum_bid(current_natural_unit, next_natural_unit, price_divisor)?;

    Ok(CombinedArrays {
        combined_token_array,
        combined_current_units,
        combined_next_units,
        minimum_bid,
    })
}

/// Token flows of a bid of `bid_quantity` at `price`
///
/// For component i, with `a = next[i] * den` and `b = current[i] * num`:
/// `a > b` is an inflow of `effective * (a - b) / coefficient / den`, `b > a`
/// an outflow of the same shape over `b - a`. Magnitudes are computed on
/// unsigned values, so an outflow never carries a negative zero.
pub fn compute_token_flows(
    combined_current_units: &[Quantity],
    combined_next_units: &[Quantity],
    bid_quantity: Quantity,
    price: AuctionPrice,
    minimum_bid: Quantity,
) -> Result<TokenFlows> {
    same_length(
        "combinedCurrentUnits",
        combined_current_units,
        "combinedNextUnits",
        combined_next_units,
    )?;

    let AuctionPrice {
        numerator,
        denominator,
    } = price;
    let coefficient = checked_div(minimum_bid, denominator, "bid coefficient")?;
    if coefficient.is_zero() {
        return Err(ValidationError::DivisionByZero {
            operation: "token flow",
        }
        .into());
    }
    let effective_quantity = mul_div_floor(bid_quantity, denominator, numerator, "effective quantity")?;

    let flow_amount = |delta: Quantity| -> Result<Quantity> {
        let scaled = mul_div_floor(effective_quantity, delta, coefficient, "token flow")?;
        Ok(checked_div(scaled, denominator, "token flow")?)
    };

    let mut inflow = Vec::with_capacity(combined_current_units.len());
    let mut outflow = Vec::with_capacity(combined_current_units.len());
    for (current, next) in combined_current_units.iter().zip(combined_next_units) {
        let a = checked_mul(*next, denominator, "token flow")?;
        let b = checked_mul(*current, numerator, "token flow")?;

        if a > b {
            inflow.push(flow_amount(a - b)?);
            outflow.push(Quantity::zero());
        } else {
            inflow.push(Quantity::zero());
            outflow.push(flow_amount(b - a)?);
        }
    }

    Ok(TokenFlows { inflow, outflow })
}

/// Auction price at `now`
///
/// Moves linearly from `start_price` toward `pivot_price` over `time_to_pivot`
/// and keeps the same slope after the pivot. A descending curve bottoms out
/// at zero. Before the auction starts the start price applies.
pub fn compute_auction_price(
    auction_start_time: Timestamp,
    now: Timestamp,
    time_to_pivot: Timestamp,
    start_price: Quantity,
    pivot_price: Quantity,
    price_divisor: Quantity,
) -> Result<AuctionPrice> {
    if price_divisor.is_zero() {
        return Err(ValidationError::DivisionByZero {
            operation: "auction price",
        }
        .into());
    }
    if time_to_pivot == 0 {
        return Ok(AuctionPrice {
            numerator: pivot_price,
            denominator: price_divisor,
        });
    }

    let elapsed = Quantity::from(now.saturating_sub(auction_start_time));
    let duration = Quantity::from(time_to_pivot);

    let numerator = if pivot_price >= start_price {
        let step = mul_div_floor(elapsed, pivot_price - start_price, duration, "auction price")?;
        start_price
            .checked_add(step)
            .ok_or(ValidationError::Overflow {
                operation: "auction price",
            })?
    } else {
        let step = mul_div_floor(elapsed, start_price - pivot_price, duration, "auction price")?;
        start_price.saturating_sub(step)
    };

    Ok(AuctionPrice {
        numerator,
        denominator: price_divisor,
    })
}

/// Quantity a bid would actually execute
///
/// Without partial fill a bid above `remaining` is rejected; with it the bid
/// is clamped to `remaining` rounded down to a multiple of the minimum bid. A
/// clamp that leaves nothing to fill is rejected.
pub fn execution_quantity(
    quantity: Quantity,
    remaining: Quantity,
    minimum_bid: Quantity,
    allow_partial_fill: bool,
) -> Result<Quantity> {
    bid_is_multiple_of_minimum_bid(quantity, minimum_bid)?;
    if quantity <= remaining {
        return Ok(quantity);
    }
    if !allow_partial_fill {
        bid_within_remaining(quantity, remaining)?;
    }
    let clamped = remaining / minimum_bid * minimum_bid;
    if clamped.is_zero() {
        return Err(ProtocolError::BidTooLarge {
            quantity,
            remaining,
        }
        .into());
    }
    Ok(min(quantity, clamped))
}

/// Largest multiple of `next_natural_unit` of the next Set that `balances`
/// can collateralize
pub fn compute_next_set_issue_quantity(
    balances: &[Quantity],
    next_units: &[Quantity],
    next_natural_unit: Quantity,
) -> Result<Quantity> {
    same_length("balances", balances, "units", next_units)?;

    let mut issuable: Option<Quantity> = None;
    for (balance, unit) in balances.iter().zip(next_units) {
        let per_component = mul_div_floor(*balance, next_natural_unit, *unit, "issue quantity")?;
        issuable = Some(match issuable {
            Some(current) => min(current, per_component),
            None => per_component,
        });
    }

    let issuable = issuable.unwrap_or_default();
    let whole_units = checked_div(issuable, next_natural_unit, "issue quantity")?;
    Ok(whole_units * next_natural_unit)
}

/// Next-set units backing one rebalancing natural unit after settlement
pub fn compute_unit_shares(
    issue_quantity: Quantity,
    rebalancing_natural_unit: Quantity,
    total_supply: Quantity,
) -> Result<Quantity> {
    Ok(mul_div_floor(
        issue_quantity,
        rebalancing_natural_unit,
        total_supply,
        "unit shares",
    )?)
}

/// Pro-rata share of each collateral balance owed to a holder in drawdown
pub fn compute_failed_redemption_shares(
    holder_balance: Quantity,
    total_supply: Quantity,
    collateral_balances: &[Quantity],
) -> Result<Vec<Quantity>> {
    collateral_balances
        .iter()
        .map(|balance| {
            Ok(mul_div_floor(
                *balance,
                holder_balance,
                total_supply,
                "failed redemption share",
            )?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use setkit_core::units::ether;
    use setkit_core::Error;

    fn q(n: u64) -> Quantity {
        Quantity::from(n)
    }

    fn unit_price() -> AuctionPrice {
        AuctionPrice {
            numerator: q(1),
            denominator: q(1),
        }
    }

    #[test]
    fn test_combined_token_array_keeps_order() {
        let a = Address::repeat_byte(0xa1);
        let b = Address::repeat_byte(0xb1);
        let c = Address::repeat_byte(0xc1);

        assert_eq!(build_combined_token_array(&[a, b], &[c, a]), vec![a, b, c]);
        assert_eq!(build_combined_token_array(&[a], &[a]), vec![a]);
        assert!(build_combined_token_array(&[], &[]).is_empty());
    }

    #[test]
    fn test_combined_unit_array_scales_to_larger_natural_unit() {
        let a = Address::repeat_byte(0xa1);
        let b = Address::repeat_byte(0xb1);
        let combined = vec![a, b];

        // Current set natural unit 10, next 100: current units scale by 10
        let current = build_combined_unit_array(&[a], &[q(5)], q(10), q(100), &combined).unwrap();
        assert_eq!(current, vec![q(50), q(0)]);

        let next = build_combined_unit_array(&[b], &[q(7)], q(100), q(10), &combined).unwrap();
        assert_eq!(next, vec![q(0), q(7)]);
    }

    #[test]
    fn test_minimum_bid() {
        assert_eq!(compute_minimum_bid(q(10), q(100), q(1000)).unwrap(), q(100_000));
        assert!(compute_minimum_bid(Quantity::MAX, q(1), q(2)).is_err());
    }

    #[test]
    fn test_single_component_inflow() {
        let flows = compute_token_flows(&[q(100)], &[q(200)], q(10), unit_price(), q(10)).unwrap();
        assert_eq!(flows.inflow, vec![q(100)]);
        assert_eq!(flows.outflow, vec![q(0)]);
    }

    #[test]
    fn test_swap_flows_and_exclusivity() {
        // Swap component 0 for component 1 at price 1.2 with divisor 1000
        let price = AuctionPrice {
            numerator: q(1200),
            denominator: q(1000),
        };
        let current = [ether(1), q(0)];
        let next = [q(0), ether(2)];
        let minimum_bid = q(1_000_000);

        let flows =
            compute_token_flows(&current, &next, q(3_000_000), price, minimum_bid).unwrap();
        for (inflow, outflow) in flows.inflow.iter().zip(&flows.outflow) {
            assert!(inflow.is_zero() || outflow.is_zero());
        }
        assert!(flows.inflow[0].is_zero());
        assert!(!flows.outflow[0].is_zero());
        assert!(!flows.inflow[1].is_zero());
        assert!(flows.outflow[1].is_zero());

        // effective = 3e6 * 1000 / 1200 = 2.5e6, coefficient = 1000
        // outflow0 = 2.5e6 * (1e18 * 1200) / 1000 / 1000 = 3000e18
        assert_eq!(flows.outflow[0], ether(3000));
        // inflow1 = 2.5e6 * (2e18 * 1000) / 1000 / 1000 = 5000e18
        assert_eq!(flows.inflow[1], ether(5000));
    }

    #[test]
    fn test_unchanged_component_has_no_flow_at_par() {
        let flows = compute_token_flows(&[q(50)], &[q(50)], q(10), unit_price(), q(10)).unwrap();
        assert_eq!(flows.inflow, vec![q(0)]);
        assert_eq!(flows.outflow, vec![q(0)]);
    }

    #[test]
    fn test_full_bid_outflow_conserves_vault_balance() {
        // 4 minimum bids drain a vault holding 4 * 100 of the current component
        let minimum_bid = q(10);
        let remaining = q(40);
        let current_units = [q(100), q(0)];
        let next_units = [q(0), q(100)];
        let vault_balance = q(400);

        let flows =
            compute_token_flows(&current_units, &next_units, remaining, unit_price(), minimum_bid)
                .unwrap();
        let outflow: Quantity = flows.outflow.iter().fold(q(0), |acc, x| acc + *x);
        assert_eq!(vault_balance - outflow, q(0));
        assert_eq!(flows.inflow[1], q(400));
    }

    #[test]
    fn test_token_flows_reject_bad_inputs() {
        assert!(matches!(
            compute_token_flows(&[q(1)], &[q(1), q(2)], q(10), unit_price(), q(10)),
            Err(Error::Validation(ValidationError::LengthMismatch { .. }))
        ));

        let zero_numerator = AuctionPrice {
            numerator: q(0),
            denominator: q(1000),
        };
        assert!(compute_token_flows(&[q(1)], &[q(2)], q(10), zero_numerator, q(1000)).is_err());

        // minimum bid smaller than the divisor leaves no coefficient
        let price = AuctionPrice {
            numerator: q(1000),
            denominator: q(1000),
        };
        assert!(compute_token_flows(&[q(1)], &[q(2)], q(10), price, q(10)).is_err());
    }

    #[test]
    fn test_auction_price_linear() {
        let start = 1_000;
        let price = |now| {
            compute_auction_price(start, now, 100, q(500), q(1500), q(1000))
                .unwrap()
                .numerator
        };
        assert_eq!(price(start), q(500));
        assert_eq!(price(start + 50), q(1000));
        assert_eq!(price(start + 100), q(1500));
        // No clamp after the pivot
        assert_eq!(price(start + 150), q(2000));
        // Before the start the start price applies
        assert_eq!(price(start - 10), q(500));
    }

    #[test]
    fn test_auction_price_descending_saturates() {
        let price = compute_auction_price(0, 300, 100, q(1000), q(500), q(1000)).unwrap();
        assert_eq!(price.numerator, q(0));
        assert_eq!(price.denominator, q(1000));
    }

    #[test]
    fn test_auction_price_without_time_to_pivot() {
        let price = compute_auction_price(0, 10, 0, q(500), q(900), q(1000)).unwrap();
        assert_eq!(price.numerator, q(900));
        assert!(compute_auction_price(0, 10, 10, q(1), q(2), q(0)).is_err());
    }

    #[test]
    fn test_execution_quantity() {
        let min_bid = q(10);
        assert_eq!(execution_quantity(q(30), q(40), min_bid, false).unwrap(), q(30));
        assert_eq!(execution_quantity(q(60), q(45), min_bid, true).unwrap(), q(40));
        assert_eq!(
            execution_quantity(q(60), q(45), min_bid, false)
                .unwrap_err()
                .error_code(),
            "bid_too_large"
        );
        assert_eq!(
            execution_quantity(q(15), q(45), min_bid, true)
                .unwrap_err()
                .error_code(),
            "non_multiple_quantity"
        );
    }

    #[test]
    fn test_partial_fill_below_minimum_bid_is_rejected() {
        let err = execution_quantity(q(10_000), q(5_000), q(10_000), true).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::BidTooLarge { quantity, remaining })
                if quantity == q(10_000) && remaining == q(5_000)
        ));
    }

    #[test]
    fn test_next_set_issue_quantity_and_unit_shares() {
        // Vault holds 1000 of A and 450 of B; next set needs 10 A + 5 B per 10 natural units
        let issue = compute_next_set_issue_quantity(&[q(1000), q(450)], &[q(10), q(5)], q(10))
            .unwrap();
        assert_eq!(issue, q(900));

        let shares = compute_unit_shares(issue, q(100), q(300)).unwrap();
        assert_eq!(shares, q(300));
        assert!(compute_unit_shares(issue, q(100), q(0)).is_err());
    }

    #[test]
    fn test_failed_redemption_shares_are_pro_rata() {
        let shares =
            compute_failed_redemption_shares(q(25), q(100), &[q(400), q(0), q(3)]).unwrap();
        assert_eq!(shares, vec![q(100), q(0), q(0)]);
    }
}
