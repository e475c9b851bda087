//! setkit-core: Shared types, errors, quantities and configuration
//!
//! This crate provides the foundational types used across the setkit workspace.

pub mod config;
pub mod errors;
pub mod types;
pub mod units;

pub use config::*;
pub use errors::*;
pub use types::*;
