//! In-memory invoice registry.
//!
//! The registry is the sole owner of invoice lifecycle state and the only
//! mutable state shared between the stream-processing path and the caller
//! surface. Every mutation goes through one of its operations, each of which
//! holds the map lock for its full read-decide-write cycle, so two
//! concurrently delivered settlement records can never both observe
//! "not yet triggered" for the same payment hash and both proceed to mint.
//!
//! The registry is not persisted: a process restart forgets every invoice.
//! See DESIGN.md for the durability trade-off this implies.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settlement lifecycle of an invoice.
///
/// `Pending` transitions to `Settled` on a classified settlement event or to
/// `Expired` on time-based expiry; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementState {
    Pending,
    Settled,
    Expired,
}

/// Mint lifecycle of an invoice.
///
/// `NotTriggered` transitions to `Triggered` exactly once (the dedup claim),
/// then to `Confirmed` or `Failed` based on the destination ledger's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MintStatus {
    NotTriggered,
    Triggered,
    Confirmed,
    Failed,
}

/// One payment request issued to a payer, tracked through settlement and mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Opaque unique handle assigned by the payment node. Primary key.
    pub payment_hash: String,
    /// The requested amount in satoshis.
    pub amount_sats: u64,
    /// Free-text memo attached at creation.
    pub memo: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub settlement_state: SettlementState,
    /// The amount actually paid, in satoshis. Set once, on settlement.
    ///
    /// May differ from `amount_sats`: the payment network permits over- and
    /// underpayment, and the paid amount is forwarded unclamped.
    pub paid_amount_sats: Option<u64>,
    pub mint_status: MintStatus,
    /// Transaction id returned by the destination ledger, once confirmed.
    pub mint_tx_id: Option<String>,
    /// Last mint submission error, if the mint failed.
    pub mint_error: Option<String>,
}

impl Invoice {
    /// Creates a pending invoice record.
    pub fn new(
        payment_hash: String,
        amount_sats: u64,
        memo: String,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_hash,
            amount_sats,
            memo,
            created_at,
            expires_at,
            settlement_state: SettlementState::Pending,
            paid_amount_sats: None,
            mint_status: MintStatus::NotTriggered,
            mint_tx_id: None,
            mint_error: None,
        }
    }
}

/// Outcome of a [`InvoiceRegistry::begin_mint`] claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintClaim {
    /// The claim succeeded; the caller now owns the single mint attempt.
    Claimed,
    /// Another path already claimed (or completed) the mint.
    AlreadyProcessed(MintStatus),
    /// The payment hash is not tracked.
    Unknown,
}

/// Errors produced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An invoice with this payment hash already exists.
    #[error("invoice {0} already exists")]
    DuplicateInvoice(String),
}

/// Aggregate counters over the registry, used by the metrics surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub total: u64,
    pub settled: u64,
    pub mint_confirmed: u64,
    pub mint_failed: u64,
}

/// In-memory mapping from payment hash to invoice state.
#[derive(Debug, Default)]
pub struct InvoiceRegistry {
    invoices: Mutex<HashMap<String, Invoice>>,
}

impl InvoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created invoice.
    pub fn create(&self, invoice: Invoice) -> Result<(), RegistryError> {
        let mut invoices = self.lock();
        if invoices.contains_key(&invoice.payment_hash) {
            return Err(RegistryError::DuplicateInvoice(invoice.payment_hash));
        }
        invoices.insert(invoice.payment_hash.clone(), invoice);
        Ok(())
    }

    /// Returns a snapshot of the invoice, if tracked.
    pub fn get(&self, payment_hash: &str) -> Option<Invoice> {
        self.lock().get(payment_hash).cloned()
    }

    /// Marks an invoice settled with the resolved paid amount.
    ///
    /// No-op if the invoice is already in a terminal settlement state: the
    /// stream may redeliver a settlement event after a reconnect, and the
    /// first delivery wins. Settlement events for invoices this process never
    /// created (the subscription covers the whole node feed) are upserted so
    /// they are deduplicated and minted like any other.
    ///
    /// Returns true if the invoice transitioned to `Settled` by this call.
    pub fn mark_settled(&self, payment_hash: &str, paid_amount_sats: u64) -> bool {
        let mut invoices = self.lock();
        match invoices.get_mut(payment_hash) {
            Some(invoice) => {
                if invoice.settlement_state != SettlementState::Pending {
                    return false;
                }
                invoice.settlement_state = SettlementState::Settled;
                invoice.paid_amount_sats = Some(paid_amount_sats);
                true
            }
            None => {
                let now = Utc::now();
                let mut invoice = Invoice::new(
                    payment_hash.to_string(),
                    paid_amount_sats,
                    String::new(),
                    now,
                    now,
                );
                invoice.settlement_state = SettlementState::Settled;
                invoice.paid_amount_sats = Some(paid_amount_sats);
                invoices.insert(payment_hash.to_string(), invoice);
                true
            }
        }
    }

    /// Atomically claims the single mint attempt for an invoice.
    ///
    /// Transitions `NotTriggered` to `Triggered` and returns
    /// [`MintClaim::Claimed`]; any other current status means the mint was
    /// already dispatched (or finished) and the caller must not submit again.
    pub fn begin_mint(&self, payment_hash: &str) -> MintClaim {
        let mut invoices = self.lock();
        match invoices.get_mut(payment_hash) {
            Some(invoice) if invoice.mint_status == MintStatus::NotTriggered => {
                invoice.mint_status = MintStatus::Triggered;
                MintClaim::Claimed
            }
            Some(invoice) => MintClaim::AlreadyProcessed(invoice.mint_status),
            None => MintClaim::Unknown,
        }
    }

    /// Sets the mint status directly.
    pub fn set_mint_status(&self, payment_hash: &str, status: MintStatus) {
        if let Some(invoice) = self.lock().get_mut(payment_hash) {
            invoice.mint_status = status;
        }
    }

    /// Records a confirmed mint with its ledger transaction id.
    pub fn record_mint_confirmed(&self, payment_hash: &str, transaction_id: &str) {
        if let Some(invoice) = self.lock().get_mut(payment_hash) {
            invoice.mint_status = MintStatus::Confirmed;
            invoice.mint_tx_id = Some(transaction_id.to_string());
        }
    }

    /// Records a failed mint with the submission error.
    ///
    /// A failed mint is never retried automatically: the prior submission may
    /// have succeeded on-chain despite the ambiguous failure, and a blind
    /// resubmission would risk double-minting. Recovery is an operator action.
    pub fn record_mint_failed(&self, payment_hash: &str, error: &str) {
        if let Some(invoice) = self.lock().get_mut(payment_hash) {
            invoice.mint_status = MintStatus::Failed;
            invoice.mint_error = Some(error.to_string());
        }
    }

    /// Returns aggregate counters for the metrics surface.
    pub fn counts(&self) -> RegistryCounts {
        let invoices = self.lock();
        let mut counts = RegistryCounts {
            total: invoices.len() as u64,
            ..RegistryCounts::default()
        };
        for invoice in invoices.values() {
            if invoice.settlement_state == SettlementState::Settled {
                counts.settled += 1;
            }
            match invoice.mint_status {
                MintStatus::Confirmed => counts.mint_confirmed += 1,
                MintStatus::Failed => counts.mint_failed += 1,
                _ => {}
            }
        }
        counts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Invoice>> {
        // A poisoned lock means a panic while holding the guard; the map
        // itself is still structurally valid, so keep serving.
        match self.invoices.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
