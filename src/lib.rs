//! Bridges settled Lightning Network invoices to token mints on Sui.
//!
//! A payer settles a Lightning invoice; the bridge observes the settlement on
//! a long-lived invoice-update subscription, resolves the paid amount, and
//! submits exactly one token mint on the Sui ledger for it.
//!
//! # Architecture
//!
//! Records flow through four components:
//!
//! 1. **[`node`]** — capability boundary to the Lightning node: issue
//!    invoices, stream invoice updates, fetch one invoice on demand
//! 2. **[`classifier`]** — pure settlement classification over raw update
//!    records, tolerant of the field-name drift between node versions
//! 3. **[`registry`]** — in-memory invoice state, owner of the atomic
//!    at-most-once mint claim
//! 4. **[`mint`]** — the destination-ledger mint capability and the
//!    idempotent trigger that drives it
//!
//! The **[`subscription`]** manager owns the single live stream and restarts
//! it on failure with fixed, cause-tiered delays. **[`bridge`]** ties it all
//! together behind the caller surface.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ln_sui_bridge::{Bridge, BridgeConfig, LndRestClient, SuiLedgerConfig, SuiMintProvider};
//!
//! let node = Arc::new(LndRestClient::new("https://localhost:8080", macaroon_hex));
//! let minter = Arc::new(SuiMintProvider::new(ledger_config));
//! let bridge = Bridge::new(node, minter, BridgeConfig::new(recipient));
//!
//! bridge.start_listening();
//! let invoice = bridge.create_invoice(50_000, None).await?;
//! ```
//!
//! Amounts are carried in satoshis end-to-end; conversion to the ledger's
//! token unit is the mint capability's concern.

pub mod bridge;
pub mod classifier;
pub mod ledger;
pub mod mint;
pub mod node;
pub mod registry;
pub mod subscription;

pub use bridge::{Bridge, BridgeConfig, BridgeError};
pub use classifier::{Classification, ClassifyError, classify};
pub use ledger::{SuiAddress, SuiLedgerConfig, SuiMintProvider};
pub use mint::{MintReceipt, MintService, MintSubmissionError, MintTrigger};
pub use node::{CreatedInvoice, LndRestClient, NodeError, PaymentNodeClient, StartIndex};
pub use registry::{Invoice, InvoiceRegistry, MintStatus, SettlementState};
pub use subscription::{SessionState, SubscriptionConfig, SubscriptionManager};
