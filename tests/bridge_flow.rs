//! End-to-end tests for the invoice settlement bridge.
//!
//! These tests drive the full path — invoice creation, a scripted
//! invoice-update stream, settlement classification, and mint dispatch —
//! against in-memory node and ledger doubles, with paused tokio time to
//! fast-forward the reconnect tiers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::sleep;

use ln_sui_bridge::mint::{MintReceipt, MintService, MintSubmissionError};
use ln_sui_bridge::node::{
    CreatedInvoice, InvoiceUpdateStream, NodeError, PaymentNodeClient, StartIndex, StreamError,
};
use ln_sui_bridge::{Bridge, BridgeConfig, MintStatus, SettlementState, SuiAddress};

// ============================================================================
// Test doubles
// ============================================================================

/// One scripted subscribe outcome.
enum Script {
    /// A stream delivering these items, then ending.
    Stream(Vec<Result<Value, StreamError>>),
    /// A stream that stays open and delivers nothing.
    Hang,
}

struct ScriptedNode {
    scripts: Mutex<VecDeque<Script>>,
    next_hash: Mutex<String>,
}

impl ScriptedNode {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            next_hash: Mutex::new("aa".repeat(32)),
        })
    }
}

#[async_trait::async_trait]
impl PaymentNodeClient for ScriptedNode {
    async fn create_invoice(
        &self,
        _amount_sats: u64,
        _memo: &str,
    ) -> Result<CreatedInvoice, NodeError> {
        Ok(CreatedInvoice {
            payment_hash: self.next_hash.lock().unwrap().clone(),
            payment_request: "lnbcrt500u1p...".to_string(),
            add_index: Some(1),
        })
    }

    async fn subscribe_invoice_updates(
        &self,
        _start_index: Option<StartIndex>,
    ) -> Result<InvoiceUpdateStream, NodeError> {
        match self.scripts.lock().unwrap().pop_front() {
            Some(Script::Stream(items)) => Ok(Box::pin(futures::stream::iter(items))),
            Some(Script::Hang) | None => Ok(Box::pin(futures::stream::pending())),
        }
    }

    async fn get_invoice(&self, _payment_hash: &str) -> Result<Value, NodeError> {
        Ok(json!({ "settled": false }))
    }
}

/// Records every mint call it receives.
struct RecordingMint {
    calls: Mutex<Vec<(u64, SuiAddress)>>,
}

impl RecordingMint {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(u64, SuiAddress)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MintService for RecordingMint {
    async fn mint(
        &self,
        amount_sats: u64,
        recipient: &SuiAddress,
    ) -> Result<MintReceipt, MintSubmissionError> {
        self.calls.lock().unwrap().push((amount_sats, recipient.clone()));
        Ok(MintReceipt {
            transaction_id: "0xdigest".to_string(),
        })
    }
}

fn recipient() -> SuiAddress {
    "0x42".parse().unwrap()
}

fn build_bridge(node: Arc<ScriptedNode>, mint: Arc<RecordingMint>) -> Bridge {
    Bridge::new(
        node,
        mint as Arc<dyn MintService>,
        BridgeConfig::new(recipient()),
    )
}

/// Lets spawned work run until the expected number of mints landed.
async fn wait_for_mints(mint: &RecordingMint, expected: usize) {
    for _ in 0..100 {
        if mint.calls().len() >= expected {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
}

// ============================================================================
// Settlement flow
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_settlement_mints_paid_amount_once() {
    let hash = "aa".repeat(32);
    let node = ScriptedNode::new(vec![
        Script::Stream(vec![
            // The node first reports the invoice open, then settled.
            Ok(json!({ "r_hash": hash, "settled": false, "value": "50000" })),
            Ok(json!({ "r_hash": hash, "settled": true, "amt_paid_sat": "50000" })),
        ]),
        Script::Hang,
    ]);
    let mint = RecordingMint::new();
    let bridge = build_bridge(node, mint.clone());

    let created = bridge.create_invoice(50_000, None).await.unwrap();
    assert_eq!(created.payment_hash, hash);

    bridge.start_listening();
    wait_for_mints(&mint, 1).await;
    bridge.shutdown().await;

    assert_eq!(mint.calls(), vec![(50_000, recipient())]);
    let invoice = bridge.invoice_status(&hash).unwrap();
    assert_eq!(invoice.settlement_state, SettlementState::Settled);
    assert_eq!(invoice.paid_amount_sats, Some(50_000));
    assert_eq!(invoice.mint_status, MintStatus::Confirmed);
    assert_eq!(invoice.mint_tx_id.as_deref(), Some("0xdigest"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_delivery_mints_once() {
    let hash = "bb".repeat(32);
    // The settlement arrives twice in one stream, and once more after a
    // reconnect, as historical redelivery would produce.
    let node = ScriptedNode::new(vec![
        Script::Stream(vec![
            Ok(json!({ "r_hash": hash, "settled": true, "amt_paid_sat": "7000" })),
            Ok(json!({ "r_hash": hash, "settled": true, "amt_paid_sat": "7000" })),
        ]),
        Script::Stream(vec![Ok(
            json!({ "r_hash": hash, "settled": true, "amt_paid_sat": "7000" }),
        )]),
        Script::Hang,
    ]);
    let mint = RecordingMint::new();
    let bridge = build_bridge(node, mint.clone());

    bridge.start_listening();
    // Cover both streams plus the end-of-stream reconnect delays.
    sleep(Duration::from_secs(30)).await;
    wait_for_mints(&mint, 1).await;
    bridge.shutdown().await;

    assert_eq!(mint.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_msat_only_settlement_floors_to_sats() {
    let hash = "cc".repeat(32);
    let node = ScriptedNode::new(vec![
        Script::Stream(vec![Ok(
            json!({ "r_hash": hash, "settled": true, "value_msat": "123000" }),
        )]),
        Script::Hang,
    ]);
    let mint = RecordingMint::new();
    let bridge = build_bridge(node, mint.clone());

    bridge.start_listening();
    wait_for_mints(&mint, 1).await;
    bridge.shutdown().await;

    assert_eq!(mint.calls(), vec![(123, recipient())]);
    let invoice = bridge.invoice_status(&hash).unwrap();
    assert_eq!(invoice.paid_amount_sats, Some(123));
}

#[tokio::test(start_paused = true)]
async fn test_overpayment_is_forwarded_not_clamped() {
    let hash = "dd".repeat(32);
    let node = ScriptedNode::new(vec![
        Script::Stream(vec![Ok(
            json!({ "r_hash": hash, "settled": true, "amt_paid_sat": "60000" }),
        )]),
        Script::Hang,
    ]);
    let mint = RecordingMint::new();
    let bridge = build_bridge(node.clone(), mint.clone());

    *node.next_hash.lock().unwrap() = hash.clone();
    bridge.create_invoice(50_000, None).await.unwrap();

    bridge.start_listening();
    wait_for_mints(&mint, 1).await;
    bridge.shutdown().await;

    // The actually-paid amount is minted, not the requested one.
    assert_eq!(mint.calls(), vec![(60_000, recipient())]);
    let invoice = bridge.invoice_status(&hash).unwrap();
    assert_eq!(invoice.amount_sats, 50_000);
    assert_eq!(invoice.paid_amount_sats, Some(60_000));
}

// ============================================================================
// Stream recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_mid_stream_error_recovers_and_keeps_processing() {
    let first = "ee".repeat(32);
    let second = "ff".repeat(32);
    let node = ScriptedNode::new(vec![
        Script::Stream(vec![
            Ok(json!({ "r_hash": first, "settled": true, "amt_paid_sat": "100" })),
            Err(StreamError("connection reset".to_string())),
        ]),
        Script::Stream(vec![
            // Redelivery of the first settlement plus a new one.
            Ok(json!({ "r_hash": first, "settled": true, "amt_paid_sat": "100" })),
            Ok(json!({ "r_hash": second, "settled": true, "amt_paid_sat": "200" })),
        ]),
        Script::Hang,
    ]);
    let mint = RecordingMint::new();
    let bridge = build_bridge(node, mint.clone());

    bridge.start_listening();
    sleep(Duration::from_secs(30)).await;
    wait_for_mints(&mint, 2).await;
    bridge.shutdown().await;

    let calls = mint.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.contains(&(100, recipient())));
    assert!(calls.contains(&(200, recipient())));
}
