//! Lifecycle state derived from a persisted order.

use domain::{FulfillmentStatus, Order, PaymentStatus};
use serde::{Deserialize, Serialize};

/// Where an order stands in the checkout lifecycle.
///
/// State transitions:
/// ```text
/// Reserved ──► AwaitingPayment ──┬──► InProgress ──┬──► Delivered
///                                │                 └──► Cancelled (refunded)
///                                └──► (deleted: abandoned, cancelled or expired)
/// ```
///
/// `Reserved` only exists inside the creation transaction and is never
/// observed outside it. Orders that leave `AwaitingPayment` without paying are
/// deleted, so they have no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Reserved,
    AwaitingPayment,
    Paid,
    InProgress,
    Delivered,
    Cancelled,
}

impl LifecycleState {
    pub fn of(order: &Order) -> Self {
        match (order.payment_status(), order.fulfillment_status()) {
            (_, FulfillmentStatus::Delivered) => LifecycleState::Delivered,
            (_, FulfillmentStatus::Cancelled) => LifecycleState::Cancelled,
            (PaymentStatus::Pending, _) if order.checkout_session_id().is_some() => {
                LifecycleState::AwaitingPayment
            }
            (PaymentStatus::Pending, _) => LifecycleState::Reserved,
            (PaymentStatus::Successful, FulfillmentStatus::Received) => LifecycleState::Paid,
            (PaymentStatus::Successful, FulfillmentStatus::InProgress) => {
                LifecycleState::InProgress
            }
        }
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Delivered | LifecycleState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Reserved => "reserved",
            LifecycleState::AwaitingPayment => "awaiting_payment",
            LifecycleState::Paid => "paid",
            LifecycleState::InProgress => "in_progress",
            LifecycleState::Delivered => "delivered",
            LifecycleState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
