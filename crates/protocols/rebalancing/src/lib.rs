//! Rebalancing Set Implementation
//!
//! This crate implements the client side of the rebalancing Set lifecycle.
//!
//! # Protocol Overview
//!
//! A rebalancing Set is collateralized by one "current" Set at a time. To move
//! into a different Set the manager proposes a "next" Set, and after a
//! proposal period an auction swaps the collateral:
//! - Bidders take current-set components out of the vault (outflow)
//! - and supply next-set components in exchange (inflow)
//! - at a price that moves linearly with time
//!
//! # Features
//!
//! - Auction math: combined arrays, minimum bid, price curve, token flows
//! - Concurrent state fetches
//! - Lifecycle coordinator for propose, start, bid, settle and drawdown
//!
//! # Example
//!
//! ```ignore
//! use rebalancing::RebalancingCoordinator;
//!
//! let coordinator = RebalancingCoordinator::new(client, config.addresses.clone());
//! let bid = coordinator.bid_price(rebalancing_set, quantity, false).await?;
//! println!("Pays {:?}, receives {:?}", bid.flows.inflow, bid.flows.outflow);
//! ```

pub mod calculator;
pub mod coordinator;
pub mod fetch;
pub mod state;

pub use calculator::*;
pub use coordinator::RebalancingCoordinator;
pub use fetch::{
    fetch_proposal_details, fetch_rebalance_details, fetch_rebalancing_set_details,
    fetch_set_details, fetch_vault_balances,
};
pub use state::*;
