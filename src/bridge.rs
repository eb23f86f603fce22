//! Caller-facing bridge surface.
//!
//! [`Bridge`] wires the payment node client, the invoice registry, the mint
//! trigger, and the subscription manager together, and exposes the small
//! operation set callers need: start listening (idempotent), create an
//! invoice, query invoice status, and shut down. The node client and mint
//! service are owned handles passed at construction; there is no shared
//! global client.

use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::{self, Classification};
use crate::ledger::SuiAddress;
use crate::mint::{MintService, MintTrigger, TriggerOutcome};
use crate::node::{CreatedInvoice, NodeError, PaymentNodeClient};
use crate::registry::{Invoice, InvoiceRegistry, RegistryError};
use crate::subscription::{SubscriptionConfig, SubscriptionManager};

/// Default invoice expiry, matching the payment node's own default.
pub const DEFAULT_INVOICE_EXPIRY_SECS: i64 = 3600;

/// Default memo for invoices created without one.
pub const DEFAULT_MEMO: &str = "LN-Sui bridge payment";

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Recipient address for minted tokens.
    pub recipient: SuiAddress,
    /// Invoice expiry recorded at creation, in seconds.
    pub invoice_expiry_secs: i64,
    /// Optional ceiling on subscription attempts; `None` retries forever.
    pub max_subscription_attempts: Option<u32>,
}

impl BridgeConfig {
    pub fn new(recipient: SuiAddress) -> Self {
        Self {
            recipient,
            invoice_expiry_secs: DEFAULT_INVOICE_EXPIRY_SECS,
            max_subscription_attempts: None,
        }
    }
}

/// Errors surfaced synchronously to bridge callers.
///
/// Everything else — transport failures, classification drops, mint
/// failures — is recovered or recorded internally and shows up in invoice
/// status, not as an error return.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Malformed caller input; rejected before any state mutation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The payment hash is not tracked.
    #[error("invoice {0} is not tracked")]
    UnknownInvoice(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

struct Listener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// The invoice settlement bridge.
pub struct Bridge {
    node: Arc<dyn PaymentNodeClient>,
    registry: Arc<InvoiceRegistry>,
    trigger: MintTrigger,
    config: BridgeConfig,
    listener: Mutex<Option<Listener>>,
}

impl Bridge {
    pub fn new(
        node: Arc<dyn PaymentNodeClient>,
        minter: Arc<dyn MintService>,
        config: BridgeConfig,
    ) -> Self {
        let registry = Arc::new(InvoiceRegistry::new());
        let trigger = MintTrigger::new(minter, Arc::clone(&registry));
        Self {
            node,
            registry,
            trigger,
            config,
            listener: Mutex::new(None),
        }
    }

    /// Returns the invoice registry, e.g. for metrics.
    pub fn registry(&self) -> &Arc<InvoiceRegistry> {
        &self.registry
    }

    /// Starts the settlement listener.
    ///
    /// Idempotent: returns true if a listener was started, false if one is
    /// already running. Two concurrent subscriptions are never created.
    pub fn start_listening(&self) -> bool {
        let mut listener = match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = listener.as_ref()
            && !existing.task.is_finished()
        {
            tracing::debug!("settlement listener already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let manager = SubscriptionManager::new(
            Arc::clone(&self.node),
            Arc::clone(&self.registry),
            self.trigger.clone(),
            SubscriptionConfig {
                recipient: self.config.recipient.clone(),
                max_attempts: self.config.max_subscription_attempts,
            },
            cancel.clone(),
        );
        let task = tokio::spawn(manager.run());
        *listener = Some(Listener { cancel, task });
        tracing::info!("settlement listener started");
        true
    }

    /// Returns true while the settlement listener is running.
    pub fn is_listening(&self) -> bool {
        match self.listener.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|l| !l.task.is_finished()),
            Err(_) => false,
        }
    }

    /// Stops the listener: closes the stream, cancels any pending reconnect
    /// timer, and waits for in-flight mint submissions to complete.
    pub async fn shutdown(&self) {
        let listener = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(listener) = listener {
            listener.cancel.cancel();
            if let Err(e) = listener.task.await {
                tracing::warn!(error = %e, "listener task ended abnormally");
            }
        }
    }

    /// Creates an invoice on the payment node and registers it.
    pub async fn create_invoice(
        &self,
        amount_sats: u64,
        memo: Option<String>,
    ) -> Result<CreatedInvoice, BridgeError> {
        if amount_sats == 0 {
            return Err(BridgeError::InvalidRequest(
                "amount must be a positive satoshi value".to_string(),
            ));
        }
        let memo = memo.unwrap_or_else(|| DEFAULT_MEMO.to_string());

        let created = self.node.create_invoice(amount_sats, &memo).await?;

        let now = Utc::now();
        let invoice = Invoice::new(
            created.payment_hash.clone(),
            amount_sats,
            memo,
            now,
            now + ChronoDuration::seconds(self.config.invoice_expiry_secs),
        );
        self.registry.create(invoice)?;

        tracing::info!(
            payment_hash = %created.payment_hash,
            amount_sats,
            "invoice created"
        );
        Ok(created)
    }

    /// Returns the last known state of an invoice. Never blocks on in-flight
    /// work.
    pub fn invoice_status(&self, payment_hash: &str) -> Option<Invoice> {
        self.registry.get(payment_hash)
    }

    /// Queries the payment node for an invoice and refreshes local state.
    ///
    /// If the node reports the invoice settled while our registry still has
    /// it pending — for example because the event arrived during a stream
    /// outage — the settlement is recorded and the mint is triggered through
    /// the same deduplicated path the stream uses.
    pub async fn check_invoice(&self, payment_hash: &str) -> Result<Invoice, BridgeError> {
        if payment_hash.is_empty() {
            return Err(BridgeError::InvalidRequest(
                "payment hash is required".to_string(),
            ));
        }

        let record = self.node.get_invoice(payment_hash).await?;
        if let Ok(Classification::Settled { paid_amount_sats }) = classifier::classify(&record) {
            self.registry.mark_settled(payment_hash, paid_amount_sats);
            match self
                .trigger
                .trigger(payment_hash, paid_amount_sats, &self.config.recipient)
            {
                Ok(TriggerOutcome::Submitted(job)) => {
                    tracing::info!(
                        payment_hash = %payment_hash,
                        amount_sats = paid_amount_sats,
                        "settlement found on status check, mint dispatched"
                    );
                    tokio::spawn(job);
                }
                Ok(TriggerOutcome::AlreadyProcessed(_)) => {}
                Err(e) => {
                    tracing::error!(payment_hash = %payment_hash, error = %e, "mint trigger rejected settlement");
                }
            }
        }

        self.registry
            .get(payment_hash)
            .ok_or_else(|| BridgeError::UnknownInvoice(payment_hash.to_string()))
    }
}
