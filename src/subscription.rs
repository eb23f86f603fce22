//! Invoice subscription lifecycle.
//!
//! The [`SubscriptionManager`] owns the single live invoice-update stream.
//! Its session moves through `Connecting → Open → (Failed | Closed)`, and
//! every non-deliberate exit routes back to `Connecting` after a fixed delay
//! chosen by failure category:
//!
//! - could not open the subscription at all: 15 seconds
//! - mid-stream error: 10 seconds
//! - graceful end-of-stream: 5 seconds (transient, not a sign of trouble)
//!
//! The delays are deliberately tiered and fixed — no jitter, no escalating
//! backoff — and by default the manager never gives up; an always-on payment
//! listener that silently stops retrying loses money. Deployments that need a
//! ceiling can set [`SubscriptionConfig::max_attempts`].
//!
//! Each record delivered on the stream is classified, recorded in the
//! registry, and handed to the mint trigger in delivery order. Mint
//! submissions themselves run as spawned tasks tracked in a `JoinSet`, so one
//! slow mint never stalls classification of the next record; on shutdown the
//! manager lets in-flight mints finish rather than cancelling a submission of
//! unknown outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::classifier::{self, Classification, ClassifyError};
use crate::ledger::SuiAddress;
use crate::mint::{MintTrigger, TriggerOutcome};
use crate::node::{InvoiceUpdateStream, NodeError, PaymentNodeClient, StartIndex};
use crate::registry::InvoiceRegistry;
use futures::StreamExt;

/// Delay before retrying after the subscription could not be opened.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Delay before retrying after a mid-stream error.
pub const STREAM_ERROR_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Delay before retrying after a graceful end-of-stream.
pub const STREAM_END_RETRY_DELAY: Duration = Duration::from_secs(5);

/// State of the current subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Failed,
    Closed,
}

/// Why the current session ended, determining the reconnect tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectReason {
    ConnectFailure,
    StreamError,
    StreamEnded,
}

impl ReconnectReason {
    fn delay(self) -> Duration {
        match self {
            ReconnectReason::ConnectFailure => CONNECT_RETRY_DELAY,
            ReconnectReason::StreamError => STREAM_ERROR_RETRY_DELAY,
            ReconnectReason::StreamEnded => STREAM_END_RETRY_DELAY,
        }
    }

    fn session_state(self) -> SessionState {
        match self {
            ReconnectReason::ConnectFailure | ReconnectReason::StreamError => SessionState::Failed,
            ReconnectReason::StreamEnded => SessionState::Closed,
        }
    }
}

/// Configuration for the subscription manager.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Recipient address for minted tokens.
    pub recipient: SuiAddress,
    /// Optional ceiling on connection attempts. `None` retries forever,
    /// which is the base contract for an always-on listener.
    pub max_attempts: Option<u32>,
}

/// Owns the lifecycle of the single live invoice-update subscription.
pub struct SubscriptionManager {
    node: Arc<dyn PaymentNodeClient>,
    registry: Arc<InvoiceRegistry>,
    trigger: MintTrigger,
    config: SubscriptionConfig,
    state: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
}

impl SubscriptionManager {
    pub fn new(
        node: Arc<dyn PaymentNodeClient>,
        registry: Arc<InvoiceRegistry>,
        trigger: MintTrigger,
        config: SubscriptionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node,
            registry,
            trigger,
            config,
            state: Arc::new(Mutex::new(SessionState::Connecting)),
            cancel,
        }
    }

    /// Returns a handle for inspecting the session state.
    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    /// Runs the subscription loop until deliberate shutdown.
    ///
    /// On return, in-flight mint submissions have been drained and the
    /// session state is `Closed`.
    pub async fn run(self) {
        let mut mints: JoinSet<()> = JoinSet::new();
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(SessionState::Connecting);
            attempts += 1;

            let reason = match self.open_stream().await {
                Ok(mut stream) => {
                    self.set_state(SessionState::Open);
                    tracing::info!(attempt = attempts, "invoice subscription open");
                    match self.consume(&mut stream, &mut mints).await {
                        Some(reason) => reason,
                        None => break, // deliberate shutdown
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = attempts, error = %e, "could not open invoice subscription");
                    ReconnectReason::ConnectFailure
                }
            };

            self.set_state(reason.session_state());

            if let Some(max) = self.config.max_attempts
                && attempts >= max
            {
                tracing::error!(attempts, "subscription attempt ceiling reached, giving up");
                break;
            }

            let delay = reason.delay();
            tracing::info!(?reason, delay_secs = delay.as_secs(), "reconnecting after delay");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(SessionState::Closed);

        // In-flight mints are allowed to complete: an aborted submission of
        // unknown outcome is worse than letting it finish.
        while mints.join_next().await.is_some() {}
        tracing::info!("subscription manager stopped");
    }

    /// Opens the stream, negotiating the start-index typing.
    ///
    /// Some node versions reject a bare subscription, or an integer-typed
    /// index, depending on how their gateway encodes the field. The same
    /// logical subscription is retried with no index, an integer zero, and a
    /// string zero before the attempt counts as failed.
    async fn open_stream(&self) -> Result<InvoiceUpdateStream, NodeError> {
        match self.node.subscribe_invoice_updates(None).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::warn!(error = %e, "subscribe without start index failed, retrying with integer index");
            }
        }
        match self
            .node
            .subscribe_invoice_updates(Some(StartIndex::Numeric(0)))
            .await
        {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::warn!(error = %e, "subscribe with integer start index failed, retrying with string index");
            }
        }
        self.node
            .subscribe_invoice_updates(Some(StartIndex::Text("0".to_string())))
            .await
    }

    /// Consumes the open stream until it ends, errors, or shutdown.
    ///
    /// Returns `None` on deliberate shutdown, otherwise the reconnect reason.
    async fn consume(
        &self,
        stream: &mut InvoiceUpdateStream,
        mints: &mut JoinSet<()>,
    ) -> Option<ReconnectReason> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("shutdown requested, closing invoice stream");
                    return None;
                }
                Some(_) = mints.join_next(), if !mints.is_empty() => {}
                item = stream.next() => match item {
                    Some(Ok(record)) => self.handle_update(&record, mints),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "invoice stream error");
                        return Some(ReconnectReason::StreamError);
                    }
                    None => {
                        tracing::info!("invoice stream ended");
                        return Some(ReconnectReason::StreamEnded);
                    }
                }
            }
        }
    }

    /// Processes one raw invoice-update record.
    ///
    /// Records are handled sequentially in delivery order; only the mint
    /// submission itself is spawned off this path.
    fn handle_update(&self, record: &Value, mints: &mut JoinSet<()>) {
        let paid_amount_sats = match classifier::classify(record) {
            Ok(Classification::Settled { paid_amount_sats }) => paid_amount_sats,
            Ok(Classification::NotSettled) => {
                tracing::debug!("invoice update not settled yet");
                return;
            }
            Err(ClassifyError::MissingAmount) => {
                // Fail closed: never mint a zero or undefined amount.
                tracing::error!(record = %record, "dropping settled update with unresolvable amount");
                return;
            }
        };

        let Some(payment_hash) = classifier::payment_identifier(record) else {
            tracing::error!(record = %record, "dropping settled update with no payment identifier");
            return;
        };

        self.registry.mark_settled(&payment_hash, paid_amount_sats);

        match self
            .trigger
            .trigger(&payment_hash, paid_amount_sats, &self.config.recipient)
        {
            Ok(TriggerOutcome::Submitted(job)) => {
                tracing::info!(
                    payment_hash = %payment_hash,
                    amount_sats = paid_amount_sats,
                    "settlement observed, mint dispatched"
                );
                mints.spawn(job);
            }
            Ok(TriggerOutcome::AlreadyProcessed(status)) => {
                tracing::debug!(
                    payment_hash = %payment_hash,
                    ?status,
                    "duplicate settlement delivery ignored"
                );
            }
            Err(e) => {
                tracing::error!(payment_hash = %payment_hash, error = %e, "mint trigger rejected settlement");
            }
        }
    }
}
