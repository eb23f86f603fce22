//! Payment node capability boundary.
//!
//! The bridge requires three operations from a Lightning node: issue an
//! invoice, hold open a live stream of invoice-update records, and fetch a
//! single invoice on demand. [`PaymentNodeClient`] is that capability;
//! [`LndRestClient`](lnd::LndRestClient) implements it against LND's REST
//! gateway.
//!
//! Update records stay unstructured (`serde_json::Value`) at this boundary:
//! field names vary across node versions, and interpreting them is the
//! classifier's job, not the transport's.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod lnd;
pub use lnd::LndRestClient;

/// A live stream of raw invoice-update records.
///
/// `Some(Ok(record))` is a data record, `Some(Err(_))` a mid-stream failure,
/// and `None` a graceful end-of-stream. The Subscription Manager maps each of
/// these to its own reconnect tier.
pub type InvoiceUpdateStream = BoxStream<'static, Result<Value, StreamError>>;

/// Optional start index for an invoice-update subscription.
///
/// Some node versions encode the index as an integer, others as a string;
/// the subscription negotiation retries with each typing before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartIndex {
    Numeric(u64),
    Text(String),
}

impl StartIndex {
    /// Renders the index as the wire value for a query parameter.
    pub fn as_query_value(&self) -> String {
        match self {
            StartIndex::Numeric(n) => n.to_string(),
            StartIndex::Text(s) => s.clone(),
        }
    }
}

/// A freshly issued invoice, as returned by the payment node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedInvoice {
    /// The payment hash, hex-encoded. Primary key across the bridge.
    pub payment_hash: String,
    /// The BOLT11-encoded invoice handed to the payer.
    pub payment_request: String,
    /// The node's add index for this invoice, when reported.
    pub add_index: Option<u64>,
}

/// Errors from the payment node boundary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The node could not be reached or refused the subscription.
    #[error("cannot reach payment node: {0}")]
    Connection(String),

    /// The node rejected an invoice creation request.
    #[error("payment node rejected invoice creation: {0}")]
    InvoiceCreation(String),

    /// The node returned a response the client could not interpret.
    #[error("unexpected response from payment node: {0}")]
    Protocol(String),
}

/// A mid-stream failure on an open invoice-update stream.
#[derive(Debug, thiserror::Error)]
#[error("invoice update stream failed: {0}")]
pub struct StreamError(pub String);

/// Capability interface to a remote Lightning node.
#[async_trait::async_trait]
pub trait PaymentNodeClient: Send + Sync {
    /// Issues an invoice for `amount_sats` with the given memo.
    async fn create_invoice(
        &self,
        amount_sats: u64,
        memo: &str,
    ) -> Result<CreatedInvoice, NodeError>;

    /// Opens a live stream of invoice-update records.
    ///
    /// `start_index` optionally resumes the feed from a given add index; the
    /// caller may retry with differently typed indices on failure.
    async fn subscribe_invoice_updates(
        &self,
        start_index: Option<StartIndex>,
    ) -> Result<InvoiceUpdateStream, NodeError>;

    /// Fetches the raw record for one invoice, by hex payment hash.
    async fn get_invoice(&self, payment_hash: &str) -> Result<Value, NodeError>;
}
