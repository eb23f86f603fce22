//! LND REST implementation of the payment node capability.
//!
//! Talks to LND's REST gateway: macaroon-authenticated JSON over HTTPS, with
//! the invoice subscription delivered as a chunked response of line-delimited
//! JSON frames (`{"result": {...}}` per update). The gateway encodes int64
//! fields as decimal strings and byte fields as base64; payment hashes are
//! normalized to hex here so the rest of the bridge deals in one encoding.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};

use super::{CreatedInvoice, InvoiceUpdateStream, NodeError, PaymentNodeClient, StartIndex, StreamError};

/// Header carrying the hex-encoded macaroon, as expected by the gateway.
const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Client for LND's REST gateway.
pub struct LndRestClient {
    http: reqwest::Client,
    base_url: String,
    macaroon_hex: String,
}

impl LndRestClient {
    /// Creates a client for the given gateway URL and hex-encoded macaroon.
    pub fn new(base_url: impl Into<String>, macaroon_hex: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            macaroon_hex: macaroon_hex.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait::async_trait]
impl PaymentNodeClient for LndRestClient {
    async fn create_invoice(
        &self,
        amount_sats: u64,
        memo: &str,
    ) -> Result<CreatedInvoice, NodeError> {
        let body = json!({
            "value": amount_sats.to_string(),
            "memo": memo,
        });

        let response = self
            .http
            .post(self.url("/v1/invoices"))
            .header(MACAROON_HEADER, &self.macaroon_hex)
            .json(&body)
            .send()
            .await
            .map_err(|e| NodeError::Connection(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Protocol(format!("unreadable response: {e}")))?;
        if !status.is_success() {
            return Err(NodeError::InvoiceCreation(format!("{status}: {body}")));
        }

        let payment_hash = body
            .get("r_hash")
            .and_then(Value::as_str)
            .map(hash_to_hex)
            .ok_or_else(|| NodeError::Protocol(format!("response carries no r_hash: {body}")))?;
        let payment_request = body
            .get("payment_request")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NodeError::Protocol(format!("response carries no payment_request: {body}"))
            })?
            .to_string();
        let add_index = body.get("add_index").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

        Ok(CreatedInvoice {
            payment_hash,
            payment_request,
            add_index,
        })
    }

    async fn subscribe_invoice_updates(
        &self,
        start_index: Option<StartIndex>,
    ) -> Result<InvoiceUpdateStream, NodeError> {
        let mut request = self
            .http
            .get(self.url("/v1/invoices/subscribe"))
            .header(MACAROON_HEADER, &self.macaroon_hex);
        if let Some(index) = &start_index {
            request = request.query(&[("add_index", index.as_query_value())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Connection(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::Connection(format!(
                "subscription refused with {status}: {body}"
            )));
        }

        Ok(Box::pin(frame_stream(Box::pin(response.bytes_stream()))))
    }

    async fn get_invoice(&self, payment_hash: &str) -> Result<Value, NodeError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/invoice/{payment_hash}")))
            .header(MACAROON_HEADER, &self.macaroon_hex)
            .send()
            .await
            .map_err(|e| NodeError::Connection(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| NodeError::Protocol(format!("unreadable response: {e}")))?;
        if !status.is_success() {
            return Err(NodeError::Protocol(format!("lookup failed with {status}: {body}")));
        }
        Ok(normalize_record(body))
    }
}

struct FrameState<S> {
    inner: S,
    buf: String,
    pending: VecDeque<Result<Value, StreamError>>,
}

/// Reassembles a chunked byte stream into parsed invoice-update records.
///
/// Frames are newline-delimited JSON; chunk boundaries do not align with
/// frame boundaries, so partial lines are buffered across chunks.
fn frame_stream<S, B, E>(inner: S) -> impl Stream<Item = Result<Value, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = FrameState {
        inner,
        buf: String::new(),
        pending: VecDeque::new(),
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buf.push_str(&String::from_utf8_lossy(chunk.as_ref()));
                    while let Some(pos) = state.buf.find('\n') {
                        let line: String = state.buf.drain(..=pos).collect();
                        let line = line.trim();
                        if !line.is_empty() {
                            state.pending.push_back(parse_frame(line));
                        }
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(StreamError(e.to_string())));
                }
                None => return None,
            }
        }
    })
}

/// Parses one line-delimited frame into a normalized update record.
fn parse_frame(line: &str) -> Result<Value, StreamError> {
    let envelope: Value = serde_json::from_str(line)
        .map_err(|e| StreamError(format!("malformed stream frame: {e}")))?;

    // The grpc-gateway reports stream-level failures in-band.
    if let Some(error) = envelope.get("error") {
        return Err(StreamError(format!("node reported stream error: {error}")));
    }

    let record = match envelope.get("result") {
        Some(result) => result.clone(),
        None => envelope,
    };
    Ok(normalize_record(record))
}

/// Normalizes the `r_hash` field of a record to hex.
fn normalize_record(mut record: Value) -> Value {
    if let Some(r_hash) = record.get("r_hash").and_then(Value::as_str) {
        let hex = hash_to_hex(r_hash);
        record["r_hash"] = Value::String(hex);
    }
    record
}

/// Converts a payment hash to hex, whatever encoding the gateway used.
///
/// A 64-character hex string passes through unchanged; anything else is
/// treated as base64 (the gateway's encoding for byte fields). Strings that
/// decode as neither are kept verbatim — the hash is an opaque key, and a
/// stable unknown encoding still deduplicates correctly.
fn hash_to_hex(raw: &str) -> String {
    if raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return raw.to_ascii_lowercase();
    }
    use base64::Engine as _;
    match base64::engine::general_purpose::STANDARD.decode(raw) {
        Ok(bytes) => hex::encode(bytes),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_to_hex_passthrough_and_base64() {
        let hex_hash = "ab".repeat(32);
        assert_eq!(hash_to_hex(&hex_hash), hex_hash);

        // 32 bytes of 0x01 in standard base64.
        let b64 = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";
        assert_eq!(hash_to_hex(b64), "01".repeat(32));

        assert_eq!(hash_to_hex("not base64 !!"), "not base64 !!");
    }

    #[test]
    fn test_parse_frame_unwraps_result_envelope() {
        let record = parse_frame(r#"{"result": {"settled": true, "value": "10"}}"#).unwrap();
        assert_eq!(record["settled"], json!(true));
        assert_eq!(record["value"], json!("10"));
    }

    #[test]
    fn test_parse_frame_bare_record() {
        let record = parse_frame(r#"{"settled": false}"#).unwrap();
        assert_eq!(record["settled"], json!(false));
    }

    #[test]
    fn test_parse_frame_error_envelope() {
        let err = parse_frame(r#"{"error": {"code": 13, "message": "boom"}}"#).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_parse_frame_malformed() {
        assert!(parse_frame("{not json").is_err());
    }

    #[tokio::test]
    async fn test_frame_stream_reassembles_split_lines() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"result\": {\"va".to_vec()),
            Ok(b"lue\": \"1\"}}\n{\"result\"".to_vec()),
            Ok(b": {\"value\": \"2\"}}\n".to_vec()),
        ];
        let stream = frame_stream(futures::stream::iter(chunks));
        let records: Vec<_> = stream.collect().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap()["value"], json!("1"));
        assert_eq!(records[1].as_ref().unwrap()["value"], json!("2"));
    }

    #[tokio::test]
    async fn test_frame_stream_surfaces_transport_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"result\": {\"value\": \"1\"}}\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let stream = frame_stream(futures::stream::iter(chunks));
        let records: Vec<_> = stream.collect().await;

        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(records[1].as_ref().unwrap_err().to_string().contains("connection reset"));
    }

    #[test]
    fn test_normalize_record_rewrites_r_hash() {
        let record = normalize_record(json!({
            "r_hash": "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=",
            "settled": true
        }));
        assert_eq!(record["r_hash"], json!("01".repeat(32)));
    }

    #[test]
    fn test_start_index_query_value() {
        assert_eq!(StartIndex::Numeric(0).as_query_value(), "0");
        assert_eq!(StartIndex::Text("0".to_string()).as_query_value(), "0");
    }
}
