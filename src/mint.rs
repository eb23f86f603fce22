//! Mint capability boundary and the idempotent mint trigger.
//!
//! [`MintService`] is the single call the bridge makes into the destination
//! ledger: submit one mint, observe success or failure. Everything beyond
//! that boundary (transaction construction, signing, gas) belongs to the
//! implementation, e.g. [`SuiMintProvider`](crate::ledger::SuiMintProvider).
//!
//! [`MintTrigger`] wraps the capability with the at-most-once guarantee:
//! it claims the mint atomically through the registry before submitting, so
//! duplicate settlement deliveries — redelivered stream events, reconnect
//! replays, or a concurrent on-demand status refresh — collapse into exactly
//! one submission per payment hash.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::ledger::SuiAddress;
use crate::registry::{InvoiceRegistry, MintClaim, MintStatus};

/// Receipt for a successfully submitted and executed mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    /// The destination ledger's transaction id (digest).
    pub transaction_id: String,
}

/// Errors from the destination-ledger mint capability.
///
/// The bridge treats the mint as a single atomic external call: there is no
/// observable partial success, only these failure categories.
#[derive(Debug, thiserror::Error)]
pub enum MintSubmissionError {
    /// The mint endpoint could not be reached.
    #[error("mint endpoint unreachable: {0}")]
    Transport(String),

    /// The destination ledger rejected or failed the mint.
    #[error("mint rejected by destination ledger: {0}")]
    Rejected(String),
}

/// Capability to mint tokens on the destination ledger.
///
/// `amount_sats` is the satoshi amount resolved from the Lightning
/// settlement, passed through unchanged; conversion to the ledger's token
/// unit is the implementation's argument-building concern.
#[async_trait::async_trait]
pub trait MintService: Send + Sync {
    async fn mint(
        &self,
        amount_sats: u64,
        recipient: &SuiAddress,
    ) -> Result<MintReceipt, MintSubmissionError>;
}

/// Errors rejecting a trigger call before any state mutation.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// The paid amount must be strictly positive.
    #[error("paid amount must be positive")]
    NonPositiveAmount,

    /// The payment hash is not tracked by the registry.
    #[error("invoice {0} is not tracked by the registry")]
    UnknownInvoice(String),
}

/// Outcome of a trigger call.
pub enum TriggerOutcome {
    /// The mint was claimed; the returned job performs the submission and
    /// records the outcome. The caller decides where to run it — spawned on
    /// the stream path so a slow mint never blocks classification of the
    /// next record, or awaited directly in tests.
    Submitted(BoxFuture<'static, ()>),

    /// The mint was already triggered for this payment hash; the recorded
    /// status is returned and nothing was submitted.
    AlreadyProcessed(MintStatus),
}

impl std::fmt::Debug for TriggerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerOutcome::Submitted(_) => f.debug_tuple("Submitted").finish(),
            TriggerOutcome::AlreadyProcessed(status) => {
                f.debug_tuple("AlreadyProcessed").field(status).finish()
            }
        }
    }
}

/// Drives the destination-ledger mint, at most once per payment hash.
#[derive(Clone)]
pub struct MintTrigger {
    service: Arc<dyn MintService>,
    registry: Arc<InvoiceRegistry>,
}

impl MintTrigger {
    pub fn new(service: Arc<dyn MintService>, registry: Arc<InvoiceRegistry>) -> Self {
        Self { service, registry }
    }

    /// Triggers the mint for a settled invoice.
    ///
    /// Validates the amount, then atomically claims the mint through the
    /// registry (`NotTriggered` → `Triggered`). On a successful claim the
    /// returned job submits the mint and records `Confirmed` with the
    /// transaction id, or `Failed` with the error. Failed mints are not
    /// retried automatically; see
    /// [`InvoiceRegistry::record_mint_failed`].
    pub fn trigger(
        &self,
        payment_hash: &str,
        paid_amount_sats: u64,
        recipient: &SuiAddress,
    ) -> Result<TriggerOutcome, TriggerError> {
        if paid_amount_sats == 0 {
            return Err(TriggerError::NonPositiveAmount);
        }

        match self.registry.begin_mint(payment_hash) {
            MintClaim::Claimed => {}
            MintClaim::AlreadyProcessed(status) => {
                return Ok(TriggerOutcome::AlreadyProcessed(status));
            }
            MintClaim::Unknown => {
                return Err(TriggerError::UnknownInvoice(payment_hash.to_string()));
            }
        }

        let service = Arc::clone(&self.service);
        let registry = Arc::clone(&self.registry);
        let payment_hash = payment_hash.to_string();
        let recipient = recipient.clone();

        let job = async move {
            match service.mint(paid_amount_sats, &recipient).await {
                Ok(receipt) => {
                    tracing::info!(
                        payment_hash = %payment_hash,
                        amount_sats = paid_amount_sats,
                        transaction_id = %receipt.transaction_id,
                        "mint confirmed"
                    );
                    registry.record_mint_confirmed(&payment_hash, &receipt.transaction_id);
                }
                Err(e) => {
                    tracing::error!(
                        payment_hash = %payment_hash,
                        amount_sats = paid_amount_sats,
                        error = %e,
                        "mint submission failed"
                    );
                    registry.record_mint_failed(&payment_hash, &e.to_string());
                }
            }
        }
        .boxed();

        Ok(TriggerOutcome::Submitted(job))
    }
}
