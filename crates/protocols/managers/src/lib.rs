//! Strategy Manager Drivers
//!
//! Rebalancing Sets can be owned by a manager contract that decides when to
//! propose. Both supported families use a two-phase propose so that a signal
//! has to persist before the Set commits to an auction:
//!
//! 1. `initialPropose` records a timestamp while the signal holds
//! 2. `confirmPropose`, between the min and max confirmation delay, re-checks
//!    the signal and the manager proposes the next Set
//!
//! # Managers
//!
//! - MACO: price vs. moving average decides risk or stable collateral
//! - Asset pair: an RSI trigger decides the base-asset allocation
//!
//! The drivers check every precondition with read-only calls first and only
//! submit when all of them pass. `can_*` variants answer the same question
//! without submitting.

pub mod asset_pair;
pub mod calculator;
mod guards;
pub mod maco;
pub mod state;

pub use asset_pair::AssetPairManagerDriver;
pub use calculator::*;
pub use maco::MacoManagerDriver;
pub use state::*;
