use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{LineItem, Money, ShippingAddress};

use crate::Result;

/// One priced line shown on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount: Money,
    pub quantity: u32,
}

impl From<&LineItem> for CheckoutLine {
    fn from(item: &LineItem) -> Self {
        Self {
            name: item.product_name.clone(),
            unit_amount: item.unit_price,
            quantity: item.quantity,
        }
    }
}

/// Where the provider sends the customer after checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    pub success_url: String,
    pub cancel_url: String,
}

impl RedirectTargets {
    /// Placeholder the provider replaces with the session id on redirect.
    pub const SESSION_ID_PLACEHOLDER: &'static str = "{CHECKOUT_SESSION_ID}";

    /// Redirects back to this service's reconciliation endpoints.
    pub fn from_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            success_url: format!(
                "{base}/payment/success?session_id={}",
                Self::SESSION_ID_PLACEHOLDER
            ),
            cancel_url: format!(
                "{base}/payment/cancel?session_id={}",
                Self::SESSION_ID_PLACEHOLDER
            ),
        }
    }
}

/// A freshly opened hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub payment_url: String,
}

/// What a provider knows about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResolution {
    /// The customer paid.
    Paid {
        order_id: OrderId,
        payment_id: String,
        shipping_address: Option<ShippingAddress>,
    },
    /// The session exists but has not been paid (open, abandoned or expired).
    NotPaid { order_id: Option<OrderId> },
    /// The provider has no such session.
    NotFound,
}

/// A hosted-payment provider.
#[async_trait]
pub trait CheckoutBridge: Send + Sync {
    /// Opens a session for `order_id` carrying the order id as correlation metadata.
    async fn open(
        &self,
        order_id: OrderId,
        lines: &[CheckoutLine],
        redirects: &RedirectTargets,
    ) -> Result<CheckoutSession>;

    /// Reports the current state of a session without side effects.
    async fn resolve(&self, session_id: &str) -> Result<SessionResolution>;

    /// Closes an unpaid session so it can no longer be paid.
    async fn expire(&self, session_id: &str) -> Result<()>;

    /// Refunds a captured payment. Repeating a call with the same
    /// `idempotency_key` must not refund twice.
    async fn refund(&self, payment_id: &str, idempotency_key: &str) -> Result<()>;
}

#[async_trait]
impl<T: CheckoutBridge + ?Sized> CheckoutBridge for Arc<T> {
    async fn open(
        &self,
        order_id: OrderId,
        lines: &[CheckoutLine],
        redirects: &RedirectTargets,
    ) -> Result<CheckoutSession> {
        (**self).open(order_id, lines, redirects).await
    }

    async fn resolve(&self, session_id: &str) -> Result<SessionResolution> {
        (**self).resolve(session_id).await
    }

    async fn expire(&self, session_id: &str) -> Result<()> {
        (**self).expire(session_id).await
    }

    async fn refund(&self, payment_id: &str, idempotency_key: &str) -> Result<()> {
        (**self).refund(payment_id, idempotency_key).await
    }
}
