//! Order aggregate and related types.

mod aggregate;
mod commands;
mod pricing;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderParts};
pub use commands::{CancellationOutcome, OrderUpdate};
pub use pricing::{compute_total, normalize_cart};
pub use state::{FulfillmentStatus, PaymentStatus};
pub use value_objects::{CartItem, LineItem, Money, ProductId, ShippingAddress};

use common::{ErrorKind, OrderId, Role};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The cart or order has no line items.
    #[error("Order must contain at least one item")]
    EmptyCart,

    /// A line item quantity is zero or overflows.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// A line total or the order total does not fit in the amount type.
    #[error("Order total exceeds the maximum representable amount")]
    TotalOverflow,

    /// An update request carried no fields.
    #[error("Update contains no fields")]
    EmptyUpdate,

    /// The caller is neither the owner nor an admin.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// The caller's role may not change this field.
    #[error("Role '{role}' may not modify '{field}'")]
    FieldNotPermitted { field: &'static str, role: Role },

    /// Delivered orders are terminal.
    #[error("Order {0} has already been delivered")]
    AlreadyDelivered(OrderId),

    /// The order was already cancelled.
    #[error("Order {0} has already been cancelled")]
    AlreadyCancelled(OrderId),

    /// The payment was already applied to this order.
    #[error("Payment for order {0} has already been processed")]
    AlreadyProcessed(OrderId),

    /// A payment confirmation arrived for a session this order was not opened with.
    #[error("Order {order_id} is bound to checkout session {expected}, not {actual}")]
    SessionMismatch {
        order_id: OrderId,
        expected: String,
        actual: String,
    },

    /// The requested fulfillment transition is not allowed.
    #[error("Invalid fulfillment transition: {from} -> {to}")]
    InvalidTransition {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },

    /// Fulfillment cannot advance before payment.
    #[error("Order {0} has not been paid")]
    PaymentPending(OrderId),

    /// A paid order has no payment reference to refund against.
    #[error("Order {0} is paid but has no payment reference")]
    MissingPaymentReference(OrderId),
}

impl OrderError {
    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyCart
            | OrderError::InvalidQuantity { .. }
            | OrderError::TotalOverflow
            | OrderError::EmptyUpdate => ErrorKind::Validation,
            OrderError::Forbidden(_) | OrderError::FieldNotPermitted { .. } => ErrorKind::Forbidden,
            OrderError::AlreadyDelivered(_)
            | OrderError::AlreadyCancelled(_)
            | OrderError::AlreadyProcessed(_)
            | OrderError::SessionMismatch { .. }
            | OrderError::InvalidTransition { .. }
            | OrderError::PaymentPending(_) => ErrorKind::Conflict,
            OrderError::MissingPaymentReference(_) => ErrorKind::Internal,
        }
    }
}
