//! Sui ledger types, configuration, and mint provider.
//!
//! This module provides the destination-ledger side of the bridge:
//!
//! - [`SuiAddress`] - Sui address wrapper with parse-time validation
//! - [`SuiLedgerConfig`] - Token deployment and endpoint configuration
//! - [`SuiMintProvider`] - [`MintService`](crate::mint::MintService)
//!   implementation that posts mint move calls to a signing endpoint

pub mod types;
pub use types::*;

pub mod config;
pub use config::*;

pub mod provider;
pub use provider::*;
