//! Transfer, refund and reversal DTOs.
//!
//! # Design
//! These types mirror the platform's JSON (camelCase, `...ID` suffixes) but
//! cover only the fields the façades need. Unknown fields are ignored so new
//! server fields never break decoding. The mock-server defines its own copies;
//! the integration tests catch schema drift between the two.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Amount {
    pub currency: String,
    /// Minor units (cents for USD).
    pub value: i64,
}

impl Amount {
    pub fn usd(value: i64) -> Self {
        Self {
            currency: "USD".to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentMethodRef {
    #[serde(rename = "paymentMethodID")]
    pub payment_method_id: String,
}

impl PaymentMethodRef {
    pub fn new(payment_method_id: impl Into<String>) -> Self {
        Self {
            payment_method_id: payment_method_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTransfer {
    pub source: PaymentMethodRef,
    pub destination: PaymentMethodRef,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Created,
    Pending,
    Queued,
    Completed,
    Failed,
    Reversed,
    Canceled,
    #[serde(other)]
    Unknown,
}

/// Handle returned when a transfer was accepted but has not finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferStarted {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_on: Option<DateTime<Utc>>,
    pub status: TransferStatus,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub source: PaymentMethodRef,
    pub destination: PaymentMethodRef,
    #[serde(rename = "groupID", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Body of `PATCH /transfers/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRefund {
    /// Minor units; must not exceed the transfer amount.
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Created,
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    #[serde(rename = "refundID")]
    pub refund_id: String,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<DateTime<Utc>>,
    pub status: RefundStatus,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefundStarted {
    #[serde(rename = "refundID")]
    pub refund_id: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateReversal {
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    #[serde(rename = "cancellationID")]
    pub cancellation_id: String,
    pub status: String,
    pub created_on: DateTime<Utc>,
}

/// A reversal is either a cancellation (transfer not yet settled) or a refund.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedReversal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<Refund>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferOptionsTarget {
    #[serde(rename = "accountID", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(rename = "paymentMethodID", default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTransferOptions {
    pub source: TransferOptionsTarget,
    pub destination: TransferOptionsTarget,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodOption {
    #[serde(rename = "paymentMethodID")]
    pub payment_method_id: String,
    pub payment_method_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    #[serde(default)]
    pub source_options: Vec<PaymentMethodOption>,
    #[serde(default)]
    pub destination_options: Vec<PaymentMethodOption>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_transfer_uses_wire_names() {
        let input = CreateTransfer {
            source: PaymentMethodRef::new("pm-src"),
            destination: PaymentMethodRef::new("pm-dst"),
            amount: Amount::usd(1250),
            description: None,
            metadata: HashMap::new(),
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["source"]["paymentMethodID"], "pm-src");
        assert_eq!(json["amount"]["value"], 1250);
        assert_eq!(json["amount"]["currency"], "USD");
        assert!(json.get("description").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn transfer_decodes_and_ignores_unknown_fields() {
        let raw = r#"{
            "transferID": "tr-1",
            "createdOn": "2024-03-01T12:00:00Z",
            "status": "pending",
            "amount": {"currency": "USD", "value": 100},
            "source": {"paymentMethodID": "pm-a", "account": {"accountID": "acc"}},
            "destination": {"paymentMethodID": "pm-b"},
            "facilitatorFee": {"total": 0}
        }"#;
        let transfer: Transfer = serde_json::from_str(raw).unwrap();
        assert_eq!(transfer.transfer_id, "tr-1");
        assert_eq!(transfer.status, TransferStatus::Pending);
        assert!(transfer.completed_on.is_none());
        assert!(transfer.metadata.is_empty());
    }

    #[test]
    fn unknown_status_does_not_fail() {
        let status: TransferStatus = serde_json::from_str(r#""settling""#).unwrap();
        assert_eq!(status, TransferStatus::Unknown);
        let status: RefundStatus = serde_json::from_str(r#""completed""#).unwrap();
        assert_eq!(status, RefundStatus::Completed);
    }

    #[test]
    fn empty_patch_serializes_to_empty_object() {
        let json = serde_json::to_string(&TransferPatch::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn reversal_with_cancellation() {
        let raw = r#"{"cancellation":{"cancellationID":"c-1","status":"pending","createdOn":"2024-03-01T12:00:00Z"}}"#;
        let reversal: CreatedReversal = serde_json::from_str(raw).unwrap();
        assert_eq!(reversal.cancellation.unwrap().cancellation_id, "c-1");
        assert!(reversal.refund.is_none());
    }
}
