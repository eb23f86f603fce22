//! Settlement classification for raw invoice-update records.
//!
//! The payment node delivers invoice updates as loosely structured JSON whose
//! field names vary across node software versions: the settlement flag has
//! appeared as `settled`, `is_settled`, and as a `state` string, and the paid
//! amount under half a dozen spellings, sometimes in satoshis and sometimes in
//! millisatoshis, sometimes as a JSON number and sometimes as a decimal string.
//!
//! [`classify`] folds all of that into a single answer: is this invoice
//! settled, and if so, for how many satoshis. Classification is pure and
//! infallible except for one case — a record that is clearly settled but
//! carries no resolvable amount. That fails with
//! [`ClassifyError::MissingAmount`] rather than guessing, so an unreadable
//! record can never turn into a mint of zero or undefined value.

use serde_json::Value;

/// Satoshi-denominated amount fields, in resolution precedence order.
const SAT_AMOUNT_FIELDS: [&str; 4] = ["amt_paid_sat", "value_sat", "amount_paid", "value"];

/// Millisatoshi-denominated amount fields, consulted only after every
/// satoshi field came up empty. Values are floor-divided by 1000.
const MSAT_AMOUNT_FIELDS: [&str; 2] = ["amt_paid_msat", "value_msat"];

/// Fields that may carry the opaque payment identifier, in precedence order.
const IDENTIFIER_FIELDS: [&str; 2] = ["r_hash", "payment_hash"];

/// Outcome of classifying one raw invoice-update record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The record does not signal settlement.
    NotSettled,
    /// The record signals settlement, with the resolved paid amount.
    Settled {
        /// The paid amount in satoshis, resolved per the field precedence.
        paid_amount_sats: u64,
    },
}

impl Classification {
    /// Returns true if the record was classified as settled.
    pub fn is_settled(&self) -> bool {
        matches!(self, Classification::Settled { .. })
    }
}

/// Errors produced by [`classify`].
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// The record signals settlement but no known amount field resolved.
    #[error("settled invoice update carries no resolvable amount field")]
    MissingAmount,
}

/// Classifies a raw invoice-update record.
///
/// Settlement is detected as a logical OR over three independent signals:
/// `settled == true`, the legacy alias `is_settled == true`, or
/// `state == "SETTLED"`. Any single true signal settles the invoice; the
/// signals should agree, but if they conflict the positive one wins — missing
/// a real payment is worse than reacting to a signal the node should not have
/// set.
///
/// When settled, the paid amount is taken from the first present amount field
/// in precedence order; see [`resolve_amount`].
pub fn classify(record: &Value) -> Result<Classification, ClassifyError> {
    let settled = bool_field(record, "settled")
        || bool_field(record, "is_settled")
        || record.get("state").and_then(Value::as_str) == Some("SETTLED");

    if !settled {
        return Ok(Classification::NotSettled);
    }

    let paid_amount_sats = resolve_amount(record).ok_or(ClassifyError::MissingAmount)?;
    Ok(Classification::Settled { paid_amount_sats })
}

/// Resolves the paid amount from a record, in satoshis.
///
/// Satoshi fields are consulted first (`amt_paid_sat`, `value_sat`,
/// `amount_paid`, `value`), then millisatoshi fields (`amt_paid_msat`,
/// `value_msat`) floor-divided by 1000. The first field that parses wins;
/// fields that are absent, null, or non-numeric are skipped.
pub fn resolve_amount(record: &Value) -> Option<u64> {
    for field in SAT_AMOUNT_FIELDS {
        if let Some(sats) = amount_field(record, field) {
            return Some(sats);
        }
    }
    for field in MSAT_AMOUNT_FIELDS {
        if let Some(msats) = amount_field(record, field) {
            return Some(msats / 1000);
        }
    }
    None
}

/// Extracts the opaque payment identifier from a record.
///
/// Checks `r_hash`, then `payment_hash`. Returns `None` when neither is a
/// non-empty string; such records cannot be correlated to an invoice.
pub fn payment_identifier(record: &Value) -> Option<String> {
    for field in IDENTIFIER_FIELDS {
        if let Some(id) = record.get(field).and_then(Value::as_str)
            && !id.is_empty()
        {
            return Some(id.to_string());
        }
    }
    None
}

/// Reads a boolean field. Only a JSON `true` counts; strings do not.
fn bool_field(record: &Value, field: &str) -> bool {
    record.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// Reads an amount field that may be a JSON number or a decimal string.
///
/// LND's REST gateway encodes int64 values as strings, while other versions
/// emit plain numbers; both must parse to the same amount.
fn amount_field(record: &Value, field: &str) -> Option<u64> {
    match record.get(field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_settled_when_no_signal() {
        let record = json!({ "settled": false, "state": "OPEN", "value": "1000" });
        let class = classify(&record).unwrap();
        assert_eq!(class, Classification::NotSettled);
    }

    #[test]
    fn test_each_settlement_signal_alone_settles() {
        let records = [
            json!({ "settled": true, "amt_paid_sat": "100" }),
            json!({ "is_settled": true, "amt_paid_sat": "100" }),
            json!({ "state": "SETTLED", "amt_paid_sat": "100" }),
        ];
        for record in records {
            let class = classify(&record).unwrap();
            assert_eq!(class, Classification::Settled { paid_amount_sats: 100 });
        }
    }

    #[test]
    fn test_conflicting_signals_any_true_wins() {
        let record = json!({
            "settled": false,
            "is_settled": true,
            "state": "OPEN",
            "value": 42
        });
        assert!(classify(&record).unwrap().is_settled());
    }

    #[test]
    fn test_string_settled_flag_is_not_a_signal() {
        let record = json!({ "settled": "true", "value": "100" });
        assert_eq!(classify(&record).unwrap(), Classification::NotSettled);
    }

    #[test]
    fn test_amount_precedence_highest_field_wins() {
        let record = json!({
            "settled": true,
            "amt_paid_sat": "50000",
            "value_sat": "40000",
            "value": "30000",
            "value_msat": "20000000"
        });
        let class = classify(&record).unwrap();
        assert_eq!(class, Classification::Settled { paid_amount_sats: 50_000 });
    }

    #[test]
    fn test_amount_falls_through_to_generic_value() {
        let record = json!({ "settled": true, "value": 30_000 });
        let class = classify(&record).unwrap();
        assert_eq!(class, Classification::Settled { paid_amount_sats: 30_000 });
    }

    #[test]
    fn test_msat_fields_floor_divided() {
        let record = json!({ "settled": true, "value_msat": "123000" });
        assert_eq!(
            classify(&record).unwrap(),
            Classification::Settled { paid_amount_sats: 123 }
        );

        // 1999 msat is still only 1 sat.
        let record = json!({ "settled": true, "amt_paid_msat": "1999" });
        assert_eq!(
            classify(&record).unwrap(),
            Classification::Settled { paid_amount_sats: 1 }
        );
    }

    #[test]
    fn test_msat_only_consulted_after_sat_fields() {
        let record = json!({ "settled": true, "amt_paid_msat": "5000", "value_sat": "7" });
        assert_eq!(
            classify(&record).unwrap(),
            Classification::Settled { paid_amount_sats: 7 }
        );
    }

    #[test]
    fn test_missing_amount_fails_closed() {
        let record = json!({ "settled": true, "memo": "no amount anywhere" });
        let err = classify(&record).unwrap_err();
        assert!(matches!(err, ClassifyError::MissingAmount));
    }

    #[test]
    fn test_unparseable_amount_fields_are_skipped() {
        let record = json!({ "settled": true, "amt_paid_sat": "not-a-number", "value": "55" });
        assert_eq!(
            classify(&record).unwrap(),
            Classification::Settled { paid_amount_sats: 55 }
        );
    }

    #[test]
    fn test_payment_identifier_precedence() {
        let record = json!({ "r_hash": "aa11", "payment_hash": "bb22" });
        assert_eq!(payment_identifier(&record).as_deref(), Some("aa11"));

        let record = json!({ "payment_hash": "bb22" });
        assert_eq!(payment_identifier(&record).as_deref(), Some("bb22"));

        let record = json!({ "r_hash": "", "memo": "x" });
        assert_eq!(payment_identifier(&record), None);
    }
}
