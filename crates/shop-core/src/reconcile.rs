//! # Callback Reconciler
//!
//! Applies a gateway status callback to the matching order.
//!
//! The flow is fixed: verify the signature (and that the signed status
//! code agrees with the reported status), map the gateway status,
//! look the order up, then issue one conditional status write. Nothing is
//! read or written for a callback whose signature does not verify.

use crate::error::{ShopError, ShopResult};
use crate::gateway::{BoxedPaymentGateway, GatewayNotification, TransactionStatus};
use crate::order::{OrderStatus, StatusWrite, TransitionPolicy};
use crate::store::{with_deadline, BoxedStore, DEFAULT_STORAGE_TIMEOUT};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// What a verified callback did to its order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The status was written (possibly re-written with the same value)
    Applied { from: OrderStatus, to: OrderStatus },
    /// The gateway status maps to "no change"
    Unchanged { status: OrderStatus },
    /// The transition policy kept the current status
    Refused {
        current: OrderStatus,
        attempted: OrderStatus,
    },
}

#[derive(Clone)]
pub struct Reconciler {
    store: BoxedStore,
    gateway: BoxedPaymentGateway,
    policy: TransitionPolicy,
    storage_timeout: Duration,
}

impl Reconciler {
    pub fn new(store: BoxedStore, gateway: BoxedPaymentGateway) -> Self {
        Self {
            store,
            gateway,
            policy: TransitionPolicy::default(),
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Apply one gateway callback.
    ///
    /// Fails with `Unauthorized` on a bad signature and `NotFound` for an
    /// unknown order; in both cases no order is modified. A refused
    /// transition is not an error: the gateway must still get its ack.
    #[instrument(
        skip(self, notification),
        fields(
            order_id = %notification.order_id,
            transaction_status = notification.transaction_status.as_str(),
            provider = self.gateway.provider_name(),
        )
    )]
    pub async fn apply_gateway_status(
        &self,
        notification: &GatewayNotification,
    ) -> ShopResult<ReconcileOutcome> {
        if let Err(e) = self.gateway.verify_notification(notification) {
            warn!("Rejected gateway callback with invalid signature");
            return Err(e);
        }
        if let Err(e) = notification.check_status_code() {
            warn!(
                status_code = notification.status_code.as_deref().unwrap_or_default(),
                "Rejected gateway callback whose status is not covered by its signature"
            );
            return Err(e);
        }

        let target = notification.target_status();
        if let TransactionStatus::Unrecognized(raw) = &notification.transaction_status {
            warn!(status = %raw, "Unrecognized gateway status; order left unchanged");
        }

        let order = with_deadline(
            self.storage_timeout,
            "order lookup",
            self.store.order_by_external_id(&notification.order_id),
        )
        .await?
        .ok_or_else(|| ShopError::NotFound(format!("Order {} not found", notification.order_id)))?;

        if notification.reported_amount() != Some(order.total_amount) {
            warn!(
                reported = %notification.gross_amount,
                expected = order.total_amount,
                "Callback amount does not match order total"
            );
        }

        let Some(to) = target else {
            return Ok(ReconcileOutcome::Unchanged {
                status: order.status,
            });
        };

        let allowed_from = self.policy.allowed_from(to);
        let write = with_deadline(
            self.storage_timeout,
            "order status write",
            self.store
                .set_order_status(&notification.order_id, &allowed_from, to),
        )
        .await?;

        Ok(match write {
            StatusWrite::Applied { previous } => {
                info!(from = %previous, to = %to, "Order status updated");
                ReconcileOutcome::Applied { from: previous, to }
            }
            StatusWrite::Refused { current } => {
                warn!(
                    current = %current,
                    attempted = %to,
                    "Status transition refused by policy"
                );
                ReconcileOutcome::Refused {
                    current,
                    attempted: to,
                }
            }
        })
    }
}
