//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Actor, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    CancellationOutcome, FulfillmentStatus, LineItem, Money, OrderError, OrderUpdate,
    PaymentStatus, ShippingAddress, compute_total,
};

/// Order aggregate root.
///
/// An order is created already priced and with its stock reserved; from then
/// on it only moves through payment success, cancellation or shipping updates.
/// `total_amount` is fixed at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    items: Vec<LineItem>,
    total_amount: Money,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    payment_id: Option<String>,
    checkout_session_id: Option<String>,
    shipping_address: Option<ShippingAddress>,
    updates: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Raw field set used by storage backends to rebuild an `Order`.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total_amount: Money,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub updates: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn fulfillment_status(&self) -> FulfillmentStatus {
        self.fulfillment_status
    }

    /// External payment reference, set once the payment succeeded.
    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    /// Checkout session the order was opened with.
    pub fn checkout_session_id(&self) -> Option<&str> {
        self.checkout_session_id.as_deref()
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    /// Free-text note maintained by admins and cancellations.
    pub fn updates(&self) -> &str {
        &self.updates
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if `actor` may read or act on this order.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        actor.is_admin() || actor.owns(self.user_id)
    }

    /// Returns true if the order is still unpaid and was last touched before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.payment_status.is_pending() && self.updated_at < cutoff
    }
}

// Command methods
impl Order {
    /// Creates a pending order from priced line items.
    ///
    /// Does not touch inventory; the caller reserves stock in the same transaction.
    pub fn create(
        user_id: UserId,
        items: Vec<LineItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if let Some(bad) = items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: bad.product_id.clone(),
                quantity: 0,
            });
        }

        let total_amount = compute_total(&items)?;
        Ok(Self {
            id: OrderId::new(),
            user_id,
            items,
            total_amount,
            payment_status: PaymentStatus::Pending,
            fulfillment_status: FulfillmentStatus::Received,
            payment_id: None,
            checkout_session_id: None,
            shipping_address: None,
            updates: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from stored fields without re-validating.
    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            user_id: parts.user_id,
            items: parts.items,
            total_amount: parts.total_amount,
            payment_status: parts.payment_status,
            fulfillment_status: parts.fulfillment_status,
            payment_id: parts.payment_id,
            checkout_session_id: parts.checkout_session_id,
            shipping_address: parts.shipping_address,
            updates: parts.updates,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    /// Binds the order to the checkout session opened for it.
    pub fn attach_checkout_session(&mut self, session_id: impl Into<String>) {
        self.checkout_session_id = Some(session_id.into());
    }

    /// Records a confirmed payment.
    ///
    /// Fails with `AlreadyProcessed` if the order is already paid, which callers
    /// treat as a duplicate confirmation.
    pub fn apply_payment_success(
        &mut self,
        session_id: &str,
        payment_id: impl Into<String>,
        shipping_address: Option<ShippingAddress>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.payment_status == PaymentStatus::Successful {
            return Err(OrderError::AlreadyProcessed(self.id));
        }
        if let Some(expected) = &self.checkout_session_id
            && expected != session_id
        {
            return Err(OrderError::SessionMismatch {
                order_id: self.id,
                expected: expected.clone(),
                actual: session_id.to_string(),
            });
        }
        if !self
            .fulfillment_status
            .can_transition_to(FulfillmentStatus::InProgress)
        {
            return Err(OrderError::InvalidTransition {
                from: self.fulfillment_status,
                to: FulfillmentStatus::InProgress,
            });
        }

        self.payment_status = PaymentStatus::Successful;
        self.fulfillment_status = FulfillmentStatus::InProgress;
        self.payment_id = Some(payment_id.into());
        if shipping_address.is_some() {
            self.shipping_address = shipping_address;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the order on behalf of `actor`.
    ///
    /// Unpaid orders are left untouched and `Discard` is returned: the caller
    /// deletes them. Paid orders flip to `Cancelled` and `Refund` is returned.
    pub fn apply_cancellation(
        &mut self,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CancellationOutcome, OrderError> {
        if !self.is_visible_to(actor) {
            return Err(OrderError::Forbidden("only the owner or an admin may cancel"));
        }
        match self.fulfillment_status {
            FulfillmentStatus::Delivered => return Err(OrderError::AlreadyDelivered(self.id)),
            FulfillmentStatus::Cancelled => return Err(OrderError::AlreadyCancelled(self.id)),
            FulfillmentStatus::Received | FulfillmentStatus::InProgress => {}
        }

        if self.payment_status.is_pending() {
            return Ok(CancellationOutcome::Discard);
        }

        let payment_id = self
            .payment_id
            .clone()
            .ok_or(OrderError::MissingPaymentReference(self.id))?;

        self.fulfillment_status = FulfillmentStatus::Cancelled;
        self.updates = if reason.trim().is_empty() {
            format!("Cancelled by {}", actor.role)
        } else {
            format!("Cancelled by {}: {}", actor.role, reason.trim())
        };
        self.updated_at = now;

        Ok(CancellationOutcome::Refund { payment_id })
    }

    /// Applies a role-gated update.
    pub fn apply_update(
        &mut self,
        actor: &Actor,
        update: OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if update.is_empty() {
            return Err(OrderError::EmptyUpdate);
        }
        if self.fulfillment_status == FulfillmentStatus::Delivered {
            return Err(OrderError::AlreadyDelivered(self.id));
        }

        if actor.is_admin() {
            self.apply_admin_update(actor, update)?;
        } else {
            self.apply_customer_update(actor, update)?;
        }

        self.updated_at = now;
        Ok(())
    }

    fn apply_admin_update(&mut self, actor: &Actor, update: OrderUpdate) -> Result<(), OrderError> {
        if update.shipping_address.is_some() {
            return Err(OrderError::FieldNotPermitted {
                field: "shipping_address",
                role: actor.role,
            });
        }

        if let Some(next) = update.fulfillment_status
            && next != self.fulfillment_status
        {
            // Cancellation restocks and refunds, so it only goes through apply_cancellation.
            if next == FulfillmentStatus::Cancelled
                || !self.fulfillment_status.can_transition_to(next)
            {
                return Err(OrderError::InvalidTransition {
                    from: self.fulfillment_status,
                    to: next,
                });
            }
            if self.payment_status.is_pending() {
                return Err(OrderError::PaymentPending(self.id));
            }
            self.fulfillment_status = next;
        }

        if let Some(note) = update.updates {
            self.updates = note;
        }
        Ok(())
    }

    fn apply_customer_update(
        &mut self,
        actor: &Actor,
        update: OrderUpdate,
    ) -> Result<(), OrderError> {
        if !actor.owns(self.user_id) {
            return Err(OrderError::Forbidden("customers may only update their own orders"));
        }
        if update.touches_admin_fields() {
            let field = if update.fulfillment_status.is_some() {
                "fulfillment_status"
            } else {
                "updates"
            };
            return Err(OrderError::FieldNotPermitted {
                field,
                role: actor.role,
            });
        }
        if self.fulfillment_status == FulfillmentStatus::Cancelled {
            return Err(OrderError::AlreadyCancelled(self.id));
        }

        if let Some(patch) = update.shipping_address {
            self.shipping_address
                .get_or_insert_with(ShippingAddress::default)
                .merge(patch);
        }
        Ok(())
    }
}
