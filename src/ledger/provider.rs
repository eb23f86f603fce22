//! Sui mint provider.
//!
//! This module provides [`SuiMintProvider`], the concrete [`MintService`]
//! used in production. The provider does not sign Sui transactions: it
//! describes the mint as a fully qualified move call and posts it to a
//! signing/execution endpoint that owns the treasury keypair, then reads the
//! execution outcome back. That keeps custody out of the bridge process and
//! makes the mint a single atomic external call, matching the capability
//! contract.

use serde::Serialize;
use serde_json::Value;

use super::config::SuiLedgerConfig;
use super::types::SuiAddress;
use crate::mint::{MintReceipt, MintService, MintSubmissionError};

/// Wire format of a mint move call posted to the signing endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MintCall {
    /// Fully qualified target, `package::module::mint`.
    pub target: String,
    /// The `TreasuryCap` object id, first move-call argument.
    pub treasury_cap: String,
    /// The amount to mint, as a decimal string (u64 in the token's unit;
    /// the satoshi amount is passed through unchanged).
    pub amount: String,
    /// The recipient address.
    pub recipient: SuiAddress,
    /// Gas budget in MIST, as a decimal string.
    pub gas_budget: String,
}

/// Submits mint calls to a Sui signing/execution endpoint.
pub struct SuiMintProvider {
    http: reqwest::Client,
    config: SuiLedgerConfig,
}

impl SuiMintProvider {
    pub fn new(config: SuiLedgerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Builds the move call description for one mint.
    pub fn build_call(&self, amount_sats: u64, recipient: &SuiAddress) -> MintCall {
        MintCall {
            target: self.config.mint_target(),
            treasury_cap: self.config.treasury_cap.clone(),
            amount: amount_sats.to_string(),
            recipient: recipient.clone(),
            gas_budget: self.config.gas_budget.to_string(),
        }
    }
}

/// Extracts the transaction digest from an execution response.
///
/// The endpoint reports the digest as `digest` (Sui terminology); older
/// deployments used `transactionId`.
fn transaction_digest(response: &Value) -> Option<String> {
    for field in ["digest", "transactionId"] {
        if let Some(digest) = response.get(field).and_then(Value::as_str)
            && !digest.is_empty()
        {
            return Some(digest.to_string());
        }
    }
    None
}

#[async_trait::async_trait]
impl MintService for SuiMintProvider {
    async fn mint(
        &self,
        amount_sats: u64,
        recipient: &SuiAddress,
    ) -> Result<MintReceipt, MintSubmissionError> {
        let call = self.build_call(amount_sats, recipient);
        tracing::info!(
            target_call = %call.target,
            amount_sats,
            recipient = %recipient,
            "submitting mint call"
        );

        let response = self
            .http
            .post(&self.config.mint_endpoint)
            .json(&call)
            .send()
            .await
            .map_err(|e| MintSubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| MintSubmissionError::Rejected(format!("unreadable response: {e}")))?;

        if !status.is_success() {
            return Err(MintSubmissionError::Rejected(format!(
                "endpoint returned {status}: {body}"
            )));
        }

        // The endpoint reports on-chain execution status separately from the
        // HTTP status; a transaction can be submitted and still abort.
        if let Some(exec_status) = body.get("status").and_then(Value::as_str)
            && exec_status != "success"
        {
            return Err(MintSubmissionError::Rejected(format!(
                "execution status {exec_status}: {body}"
            )));
        }

        let transaction_id = transaction_digest(&body).ok_or_else(|| {
            MintSubmissionError::Rejected(format!("response carries no digest: {body}"))
        })?;

        Ok(MintReceipt { transaction_id })
    }
}
