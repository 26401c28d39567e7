//! Order payment and fulfillment state machines.

use serde::{Deserialize, Serialize};

/// Payment state of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Successful
///    │
///    └──► (order deleted: abandoned, expired or cancelled before payment)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Checkout session opened, payment not yet confirmed.
    #[default]
    Pending,

    /// Payment confirmed by the provider (terminal state).
    Successful,
}

impl PaymentStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns the state name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Successful => "successful",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "successful" => Ok(PaymentStatus::Successful),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

/// Fulfillment state of an order.
///
/// State transitions:
/// ```text
/// Received ──► InProgress ──► Delivered
///    │             │
///    └─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    /// Order recorded, awaiting payment.
    #[default]
    Received,

    /// Payment confirmed, order is being prepared.
    InProgress,

    /// Cancelled after payment and refunded (terminal state).
    Cancelled,

    /// Handed over to the customer (terminal state).
    Delivered,
}

impl FulfillmentStatus {
    /// Returns true if the order may move from this state to `next`.
    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        matches!(
            (self, next),
            (FulfillmentStatus::Received, FulfillmentStatus::InProgress)
                | (FulfillmentStatus::InProgress, FulfillmentStatus::Delivered)
                | (FulfillmentStatus::Received, FulfillmentStatus::Cancelled)
                | (FulfillmentStatus::InProgress, FulfillmentStatus::Cancelled)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Cancelled | FulfillmentStatus::Delivered
        )
    }

    /// Returns the state name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Received => "received",
            FulfillmentStatus::InProgress => "in_progress",
            FulfillmentStatus::Cancelled => "cancelled",
            FulfillmentStatus::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FulfillmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(FulfillmentStatus::Received),
            "in_progress" => Ok(FulfillmentStatus::InProgress),
            "cancelled" => Ok(FulfillmentStatus::Cancelled),
            "delivered" => Ok(FulfillmentStatus::Delivered),
            other => Err(format!("unknown fulfillment status '{other}'")),
        }
    }
}
