//! Rebalancing lifecycle checks
//!
//! Timing checks take `now` from the caller so a single operation evaluates
//! every guard against the same block timestamp.

use chain_gateway::{ChainClient, ContractGateway};
use setkit_core::{Address, ProtocolError, Quantity, RebalanceState, Result, Timestamp};

use crate::common::is_multiple_of;

/// Fail with `InvalidStateTransition` unless the rebalancing Set is in `expected`
pub async fn is_in_state(
    client: &ChainClient,
    rebalancing_set: Address,
    expected: RebalanceState,
    attempted: &'static str,
) -> Result<()> {
    let current = client.rebalancing_state(rebalancing_set).await?;
    if current != expected {
        return Err(ProtocolError::InvalidStateTransition { current, attempted }.into());
    }
    Ok(())
}

/// Fail unless the rebalancing Set is idle in `Default` (no rebalance in progress)
pub async fn is_in_default_state(
    client: &ChainClient,
    rebalancing_set: Address,
    attempted: &'static str,
) -> Result<()> {
    is_in_state(client, rebalancing_set, RebalanceState::Default, attempted).await
}

/// Fail unless the rebalance interval has elapsed since the last rebalance
pub async fn sufficient_time_between_rebalance(
    client: &ChainClient,
    rebalancing_set: Address,
    now: Timestamp,
) -> Result<()> {
    let (last, interval) = tokio::try_join!(
        client.rebalancing_last_rebalance_timestamp(rebalancing_set),
        client.rebalancing_interval(rebalancing_set),
    )?;
    rebalance_interval_elapsed(last, interval, now)
}

pub fn rebalance_interval_elapsed(
    last: Timestamp,
    interval: Timestamp,
    now: Timestamp,
) -> Result<()> {
    if now < last.saturating_add(interval) {
        return Err(ProtocolError::RebalanceTooSoon {
            last,
            interval,
            now,
        }
        .into());
    }
    Ok(())
}

/// Fail unless `caller` is the registered manager of the rebalancing Set
pub async fn is_manager(
    client: &ChainClient,
    rebalancing_set: Address,
    caller: Address,
) -> Result<()> {
    let manager = client.rebalancing_manager(rebalancing_set).await?;
    if manager != caller {
        return Err(ProtocolError::NotManager {
            caller,
            manager,
            rebalancing_set,
        }
        .into());
    }
    Ok(())
}

/// Fail unless the proposal period has elapsed since the proposal started
pub async fn sufficient_time_in_proposal(
    client: &ChainClient,
    rebalancing_set: Address,
    now: Timestamp,
) -> Result<()> {
    let (started, period) = tokio::try_join!(
        client.rebalancing_proposal_start_time(rebalancing_set),
        client.rebalancing_proposal_period(rebalancing_set),
    )?;
    if now < started.saturating_add(period) {
        return Err(ProtocolError::ProposalPeriodActive {
            started,
            period,
            now,
        }
        .into());
    }
    Ok(())
}

/// Fail unless the auction has run at least until its pivot time
pub async fn auction_expired(
    client: &ChainClient,
    rebalancing_set: Address,
    now: Timestamp,
) -> Result<()> {
    let auction = client.rebalancing_auction_parameters(rebalancing_set).await?;
    let started = auction.auction_start_time;
    let time_to_pivot = auction.auction_time_to_pivot;
    if now < started.saturating_add(time_to_pivot) {
        return Err(ProtocolError::AuctionNotExpired {
            started,
            time_to_pivot,
            now,
        }
        .into());
    }
    Ok(())
}

pub fn bid_within_remaining(quantity: Quantity, remaining: Quantity) -> Result<()> {
    if quantity > remaining {
        return Err(ProtocolError::BidTooLarge {
            quantity,
            remaining,
        }
        .into());
    }
    Ok(())
}

pub fn bid_is_multiple_of_minimum_bid(quantity: Quantity, minimum_bid: Quantity) -> Result<()> {
    is_multiple_of(quantity, minimum_bid, "minimum bid")
}

/// Fail unless one natural unit divides the other
pub fn natural_units_compatible(current: Quantity, next: Quantity) -> Result<()> {
    let (small, large) = if current <= next {
        (current, next)
    } else {
        (next, current)
    };
    if small.is_zero() || !(large % small).is_zero() {
        return Err(ProtocolError::IncompatibleNaturalUnits { current, next }.into());
    }
    Ok(())
}
