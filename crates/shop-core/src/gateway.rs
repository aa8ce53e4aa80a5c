//! # Payment Gateway Port
//!
//! Strategy trait for payment gateways, plus the request and callback
//! shapes exchanged with them.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          PaymentGateway (trait)              │
//! │  ├── create_transaction()   outbound         │
//! │  ├── verify_notification()  inbound webhook  │
//! │  └── provider_name()                         │
//! └──────────────────────────────────────────────┘
//!                       ▲
//!               ┌───────┴────────┐
//!               │ MidtransSnap   │
//!               │   Gateway      │
//!               └────────────────┘
//! ```

use crate::error::{ShopError, ShopResult};
use crate::order::OrderStatus;
use crate::product::ProductId;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

/// Core trait for payment gateway implementations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register a transaction and return the token the browser redirects with.
    ///
    /// The `order_id` and `gross_amount` sent must be exactly what the
    /// gateway later signs in its callback.
    async fn create_transaction(&self, request: &TransactionRequest)
        -> ShopResult<TransactionToken>;

    /// Check the callback's signature against the shared secret.
    ///
    /// Fails with `ShopError::Unauthorized` when it does not match.
    fn verify_notification(&self, notification: &GatewayNotification) -> ShopResult<()>;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str;

    /// Public key for the browser payment widget, if the provider has one.
    fn client_key(&self) -> Option<&str> {
        None
    }
}

/// Type alias for a shared gateway (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;

/// Outbound transaction creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub order_id: String,
    pub gross_amount: i64,
    pub items: Vec<TransactionItem>,
    pub customer: CustomerDetails,
}

/// Item manifest entry sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionItem {
    pub id: ProductId,
    pub price: i64,
    pub quantity: u32,
    pub name: String,
}

/// Customer details forwarded to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Gateway response to a transaction request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionToken {
    pub token: String,
    pub redirect_url: String,
}

/// Transaction status vocabulary of the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    Capture,
    Settlement,
    Pending,
    Cancel,
    Deny,
    Expire,
    /// Anything else the gateway may send (refund, authorize, ...)
    Unrecognized(String),
}

impl From<String> for TransactionStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "capture" => TransactionStatus::Capture,
            "settlement" => TransactionStatus::Settlement,
            "pending" => TransactionStatus::Pending,
            "cancel" => TransactionStatus::Cancel,
            "deny" => TransactionStatus::Deny,
            "expire" => TransactionStatus::Expire,
            _ => TransactionStatus::Unrecognized(raw),
        }
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Capture => "capture",
            TransactionStatus::Settlement => "settlement",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Cancel => "cancel",
            TransactionStatus::Deny => "deny",
            TransactionStatus::Expire => "expire",
            TransactionStatus::Unrecognized(raw) => raw,
        }
    }
}

/// Fraud screening verdict attached to card captures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FraudStatus {
    Accept,
    Challenge,
    Deny,
    Unrecognized(String),
}

impl From<String> for FraudStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "accept" => FraudStatus::Accept,
            "challenge" => FraudStatus::Challenge,
            "deny" => FraudStatus::Deny,
            _ => FraudStatus::Unrecognized(raw),
        }
    }
}

impl From<FraudStatus> for String {
    fn from(status: FraudStatus) -> Self {
        match status {
            FraudStatus::Accept => "accept".to_string(),
            FraudStatus::Challenge => "challenge".to_string(),
            FraudStatus::Deny => "deny".to_string(),
            FraudStatus::Unrecognized(raw) => raw,
        }
    }
}

/// Inbound status callback, as posted by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    /// External order id
    pub order_id: String,

    pub transaction_status: TransactionStatus,

    #[serde(default)]
    pub fraud_status: Option<FraudStatus>,

    /// Amount exactly as the gateway formatted it (signed verbatim)
    #[serde(deserialize_with = "amount_as_string")]
    pub gross_amount: String,

    pub signature_key: String,

    /// HTTP-like status code, part of the signed payload when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl GatewayNotification {
    /// Map the gateway's verdict onto the internal order status.
    ///
    /// | gateway status          | fraud   | result          |
    /// |-------------------------|---------|-----------------|
    /// | capture                 | accept  | `Some(Paid)`    |
    /// | capture                 | other   | `None`          |
    /// | settlement              |         | `Some(Paid)`    |
    /// | cancel / deny / expire  |         | `Some(Cancelled)` |
    /// | pending / unrecognized  |         | `None`          |
    ///
    /// `None` means the order keeps its current status.
    pub fn target_status(&self) -> Option<OrderStatus> {
        match &self.transaction_status {
            TransactionStatus::Capture => match self.fraud_status {
                Some(FraudStatus::Accept) => Some(OrderStatus::Paid),
                _ => None,
            },
            TransactionStatus::Settlement => Some(OrderStatus::Paid),
            TransactionStatus::Cancel | TransactionStatus::Deny | TransactionStatus::Expire => {
                Some(OrderStatus::Cancelled)
            }
            TransactionStatus::Pending | TransactionStatus::Unrecognized(_) => None,
        }
    }

    /// The status string that takes part in the signature
    pub fn signed_status(&self) -> &str {
        self.status_code
            .as_deref()
            .unwrap_or_else(|| self.transaction_status.as_str())
    }

    /// Status code the gateway sends alongside a status that moves an order
    ///
    /// | gateway status          | fraud   | code  |
    /// |-------------------------|---------|-------|
    /// | capture                 | accept  | `200` |
    /// | settlement              |         | `200` |
    /// | pending                 |         | `201` |
    /// | cancel / deny / expire  |         | `202` |
    ///
    /// Statuses that never change an order carry no constraint.
    pub fn expected_status_code(&self) -> Option<&'static str> {
        match &self.transaction_status {
            TransactionStatus::Capture => match self.fraud_status {
                Some(FraudStatus::Accept) => Some("200"),
                _ => None,
            },
            TransactionStatus::Settlement => Some("200"),
            TransactionStatus::Pending => Some("201"),
            TransactionStatus::Cancel | TransactionStatus::Deny | TransactionStatus::Expire => {
                Some("202")
            }
            TransactionStatus::Unrecognized(_) => None,
        }
    }

    /// Check that the signed status code vouches for `transaction_status`.
    ///
    /// When the callback carries a `status_code`, only that code is signed,
    /// so an unsigned `transaction_status` that disagrees with it is
    /// rejected with `ShopError::Unauthorized`.
    pub fn check_status_code(&self) -> ShopResult<()> {
        match (self.status_code.as_deref(), self.expected_status_code()) {
            (Some(code), Some(expected)) if code != expected => Err(ShopError::Unauthorized(
                format!(
                    "Status code {code} does not match transaction status {}",
                    self.transaction_status.as_str()
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Reported amount in smallest currency units, if it is a whole number
    pub fn reported_amount(&self) -> Option<i64> {
        parse_gross_amount(&self.gross_amount)
    }
}

/// Parse `"100000"` or `"100000.00"` into `100000`; fractional amounts yield `None`
pub fn parse_gross_amount(raw: &str) -> Option<i64> {
    let (whole, fraction) = match raw.trim().split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (raw.trim(), ""),
    };
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    whole.parse().ok()
}

fn amount_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match RawAmount::deserialize(deserializer)? {
        RawAmount::Text(s) => s,
        RawAmount::Integer(n) => n.to_string(),
        RawAmount::Float(f) => format!("{f:.2}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(status: &str, fraud: Option<&str>) -> GatewayNotification {
        serde_json::from_value(json!({
            "order_id": "ORDER-1-abc",
            "transaction_status": status,
            "fraud_status": fraud,
            "gross_amount": "100000.00",
            "signature_key": "sig",
        }))
        .unwrap()
    }

    #[test]
    fn test_status_mapping_table() {
        let cases = [
            ("capture", Some("accept"), Some(OrderStatus::Paid)),
            ("capture", Some("challenge"), None),
            ("capture", None, None),
            ("settlement", None, Some(OrderStatus::Paid)),
            ("cancel", None, Some(OrderStatus::Cancelled)),
            ("deny", None, Some(OrderStatus::Cancelled)),
            ("expire", None, Some(OrderStatus::Cancelled)),
            ("pending", None, None),
            ("refund", None, None),
        ];

        for (status, fraud, expected) in cases {
            assert_eq!(
                notification(status, fraud).target_status(),
                expected,
                "status={status} fraud={fraud:?}"
            );
        }
    }

    #[test]
    fn test_status_match_is_case_sensitive() {
        let n = notification("Settlement", None);
        assert_eq!(
            n.transaction_status,
            TransactionStatus::Unrecognized("Settlement".to_string())
        );
        assert_eq!(n.target_status(), None);
    }

    #[test]
    fn test_gross_amount_accepts_numbers() {
        let n: GatewayNotification = serde_json::from_value(json!({
            "order_id": "ORDER-1-abc",
            "transaction_status": "settlement",
            "gross_amount": 100000,
            "signature_key": "sig",
        }))
        .unwrap();
        assert_eq!(n.gross_amount, "100000");
        assert_eq!(n.reported_amount(), Some(100_000));
        assert_eq!(n.fraud_status, None);
    }

    #[test]
    fn test_parse_gross_amount() {
        assert_eq!(parse_gross_amount("100000.00"), Some(100_000));
        assert_eq!(parse_gross_amount("250"), Some(250));
        assert_eq!(parse_gross_amount("10.50"), None);
        assert_eq!(parse_gross_amount("abc"), None);
    }

    #[test]
    fn test_signed_status_prefers_status_code() {
        let mut n = notification("settlement", None);
        assert_eq!(n.signed_status(), "settlement");
        n.status_code = Some("200".to_string());
        assert_eq!(n.signed_status(), "200");
    }

    #[test]
    fn test_status_code_must_match_transaction_status() {
        let cases = [
            ("settlement", None, "200", true),
            ("capture", Some("accept"), "200", true),
            ("pending", None, "201", true),
            ("expire", None, "202", true),
            ("settlement", None, "201", false),
            ("capture", Some("accept"), "201", false),
            ("cancel", None, "200", false),
            ("capture", Some("challenge"), "201", true),
            ("refund", None, "200", true),
        ];

        for (status, fraud, code, consistent) in cases {
            let mut n = notification(status, fraud);
            n.status_code = Some(code.to_string());
            assert_eq!(
                n.check_status_code().is_ok(),
                consistent,
                "status={status} fraud={fraud:?} code={code}"
            );
        }
    }

    #[test]
    fn test_missing_status_code_is_consistent() {
        assert!(notification("settlement", None).check_status_code().is_ok());
    }

    #[test]
    fn test_unrecognized_status_round_trips() {
        let status = TransactionStatus::from("partial_refund".to_string());
        assert_eq!(String::from(status), "partial_refund");
    }
}
