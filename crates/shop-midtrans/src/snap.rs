//! # Midtrans Snap Gateway
//!
//! Snap transaction creation and HTTP notification verification.

use crate::config::MidtransConfig;
use crate::signature::{constant_time_compare, notification_signature};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shop_core::{
    GatewayNotification, PaymentGateway, ShopError, ShopResult, TransactionRequest,
    TransactionToken,
};
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "midtrans";

/// Midtrans Snap gateway
///
/// The browser completes payment on Snap's hosted page; the outcome
/// arrives later as a signed HTTP notification.
pub struct MidtransSnapGateway {
    config: MidtransConfig,
    client: Client,
}

impl MidtransSnapGateway {
    /// Create a new Snap gateway
    pub fn new(config: MidtransConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(MidtransConfig::from_env()?)
    }

    pub fn config(&self) -> &MidtransConfig {
        &self.config
    }

    fn build_body(request: &TransactionRequest) -> SnapTransactionBody<'_> {
        SnapTransactionBody {
            transaction_details: SnapTransactionDetails {
                order_id: &request.order_id,
                gross_amount: request.gross_amount,
            },
            item_details: request
                .items
                .iter()
                .map(|item| SnapItemDetails {
                    id: item.id.to_string(),
                    price: item.price,
                    quantity: item.quantity,
                    name: &item.name,
                })
                .collect(),
            customer_details: SnapCustomerDetails {
                first_name: &request.customer.first_name,
                email: &request.customer.email,
                phone: request.customer.phone.as_deref(),
            },
        }
    }
}

#[async_trait]
impl PaymentGateway for MidtransSnapGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> ShopResult<TransactionToken> {
        if request.items.is_empty() {
            return Err(ShopError::InvalidArgument(
                "Transaction has no items".to_string(),
            ));
        }

        let body = Self::build_body(request);

        debug!(
            "Creating Snap transaction: {} items, gross_amount={}",
            body.item_details.len(),
            request.gross_amount
        );

        let response = self
            .client
            .post(self.config.transactions_url())
            .basic_auth(&self.config.server_key, Some(""))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ShopError::GatewayUnavailable("Midtrans request timed out".to_string())
                } else {
                    ShopError::GatewayUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ShopError::GatewayUnavailable(e.to_string()))?;

        if !status.is_success() {
            error!("Midtrans API error: status={}, body={}", status, text);

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ShopError::GatewayUnavailable(format!("HTTP {status}")));
            }

            let message = serde_json::from_str::<SnapErrorResponse>(&text)
                .ok()
                .filter(|e| !e.error_messages.is_empty())
                .map(|e| e.error_messages.join("; "))
                .unwrap_or_else(|| format!("HTTP {status}: {text}"));

            return Err(ShopError::GatewayRejected {
                provider: PROVIDER.to_string(),
                message,
            });
        }

        let token: SnapTokenResponse = serde_json::from_str(&text).map_err(|e| {
            ShopError::GatewayRejected {
                provider: PROVIDER.to_string(),
                message: format!("Failed to parse Snap response: {e}"),
            }
        })?;

        info!("Created Snap transaction: order_id={}", request.order_id);

        Ok(TransactionToken {
            token: token.token,
            redirect_url: token.redirect_url,
        })
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> ShopResult<()> {
        let expected = notification_signature(
            &notification.order_id,
            notification.signed_status(),
            &notification.gross_amount,
            &self.config.server_key,
        );

        if !constant_time_compare(&notification.signature_key, &expected) {
            return Err(ShopError::Unauthorized("Invalid signature".to_string()));
        }

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn client_key(&self) -> Option<&str> {
        Some(&self.config.client_key)
    }
}

// ============================================================================
// Snap API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SnapTransactionBody<'a> {
    transaction_details: SnapTransactionDetails<'a>,
    item_details: Vec<SnapItemDetails<'a>>,
    customer_details: SnapCustomerDetails<'a>,
}

#[derive(Debug, Serialize)]
struct SnapTransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct SnapItemDetails<'a> {
    id: String,
    price: i64,
    quantity: u32,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct SnapCustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SnapTokenResponse {
    token: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct SnapErrorResponse {
    #[serde(default)]
    error_messages: Vec<String>,
}
