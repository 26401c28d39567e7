//! Requests applied to an existing order and their outcomes.

use serde::{Deserialize, Serialize};

use super::{FulfillmentStatus, ShippingAddress};

/// Role-gated order update.
///
/// Customers may only set `shipping_address` (merged into the current one);
/// admins may only set `fulfillment_status` and `updates`. A request mixing
/// both sets is rejected as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[serde(default)]
    pub updates: Option<String>,
}

impl OrderUpdate {
    /// Customer-side address change.
    pub fn shipping(address: ShippingAddress) -> Self {
        Self {
            shipping_address: Some(address),
            ..Default::default()
        }
    }

    /// Admin-side status change with an optional note.
    pub fn status(status: FulfillmentStatus, note: Option<String>) -> Self {
        Self {
            fulfillment_status: Some(status),
            updates: note,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shipping_address.is_none()
            && self.fulfillment_status.is_none()
            && self.updates.is_none()
    }

    pub(crate) fn touches_admin_fields(&self) -> bool {
        self.fulfillment_status.is_some() || self.updates.is_some()
    }
}

/// What the caller must do after a successful `Order::apply_cancellation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationOutcome {
    /// The order was never paid: restock and delete it.
    Discard,

    /// The order was paid: restock, persist the cancelled order and refund.
    Refund { payment_id: String },
}
