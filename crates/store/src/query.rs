use chrono::{DateTime, Utc};
use common::UserId;
use domain::{Order, PaymentStatus};

/// Builder for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    /// Filter by payment status.
    pub payment_status: Option<PaymentStatus>,

    /// Only orders last updated strictly before this instant.
    pub updated_before: Option<DateTime<Utc>>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders owned by a user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Unpaid orders untouched since `cutoff`.
    pub fn stale_pending(cutoff: DateTime<Utc>) -> Self {
        Self {
            payment_status: Some(PaymentStatus::Pending),
            updated_before: Some(cutoff),
            ..Default::default()
        }
    }

    pub fn payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if `order` passes every filter (limit/offset excluded).
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id() != user_id
        {
            return false;
        }
        if let Some(status) = self.payment_status
            && order.payment_status() != status
        {
            return false;
        }
        if let Some(cutoff) = self.updated_before
            && order.updated_at() >= cutoff
        {
            return false;
        }
        true
    }
}
