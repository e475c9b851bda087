//! set-assertions: Precondition checks for setkit operations
//!
//! Every check is a predicate that either returns `Ok` or fails with an error
//! carrying the concrete values involved. Checks only read from the ledger;
//! nothing is retried and nothing is written.
//!
//! - [`common`]: synchronous input validation (addresses, quantities, arrays)
//! - [`erc20`]: wallet balance and allowance checks
//! - [`set_token`]: interface probes, natural-unit divisibility, component checks
//! - [`rebalancing`]: lifecycle state, timing and bid checks

pub mod common;
pub mod erc20;
pub mod rebalancing;
pub mod set_token;

pub use common::*;
pub use erc20::*;
pub use rebalancing::*;
pub use set_token::*;
