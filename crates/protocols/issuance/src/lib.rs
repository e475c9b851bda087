//! Set Issuance Facades
//!
//! Caller-facing operations that combine the assertion layer, the auction
//! math and the gateway into one logical action.
//!
//! # Facades
//!
//! - [`IssuanceApi`]: issue and redeem through Core, component requirements
//! - [`ExchangeIssuanceApi`]: issue by trading payment tokens, or ether for
//!   a rebalancing Set
//! - [`BidderApi`]: price, place and value auction bids
//!
//! # Partial failure
//!
//! Every operation here runs read-only checks and then submits exactly one
//! transaction. There is no earlier step that could have changed on-chain
//! state, so a failure at any point leaves nothing to unwind.
//!
//! # Example
//!
//! ```ignore
//! use issuance::IssuanceApi;
//!
//! let api = IssuanceApi::new(client, config.addresses.clone());
//! let missing = api.calculate_required_components(set, owner, quantity).await?;
//! if missing.iter().all(|c| c.shortfall.is_zero()) {
//!     api.issue(set, quantity, owner).await?;
//! }
//! ```

pub mod bidder;
pub mod exchange_issuance;
pub mod issuance;

pub use bidder::{BidEvaluation, BidderApi};
pub use exchange_issuance::{EtherIssuance, ExchangeIssuanceApi};
pub use issuance::{exclusion_mask, ComponentRequirement, IssuanceApi, RedeemOptions};
