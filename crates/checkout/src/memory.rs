//! In-memory checkout provider for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::{Money, ShippingAddress};

use crate::{
    CheckoutBridge, CheckoutError, CheckoutLine, CheckoutSession, RedirectTargets, Result,
    SessionResolution,
};

#[derive(Debug, Clone)]
struct SessionRecord {
    order_id: OrderId,
    amount_total: Money,
    payment: Option<(String, Option<ShippingAddress>)>,
    expired: bool,
}

#[derive(Debug, Default)]
struct InMemoryCheckoutState {
    sessions: HashMap<String, SessionRecord>,
    refunds: HashMap<String, String>,
    next_id: u32,
    fail_on_open: bool,
    fail_on_resolve: bool,
    fail_on_refund: bool,
    open_delay: Option<Duration>,
}

/// Checkout provider that keeps sessions in memory.
///
/// Payments are completed by the test (or a local demo) through
/// [`InMemoryCheckoutProvider::complete_payment`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckoutProvider {
    state: Arc<Mutex<InMemoryCheckoutState>>,
}

impl InMemoryCheckoutProvider {
    /// Creates a new in-memory provider.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryCheckoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the provider to fail session creation.
    pub fn set_fail_on_open(&self, fail: bool) {
        self.state().fail_on_open = fail;
    }

    /// Configures the provider to fail session lookups.
    pub fn set_fail_on_resolve(&self, fail: bool) {
        self.state().fail_on_resolve = fail;
    }

    /// Configures the provider to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state().fail_on_refund = fail;
    }

    /// Delays session creation, to exercise caller timeouts.
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.state().open_delay = delay;
    }

    /// Marks a session as paid and returns the new payment id.
    ///
    /// Returns `None` if the session does not exist, was expired, or is
    /// already paid.
    pub fn complete_payment(
        &self,
        session_id: &str,
        shipping_address: Option<ShippingAddress>,
    ) -> Option<String> {
        let mut state = self.state();
        state.next_id += 1;
        let payment_id = format!("pi_test_{:04}", state.next_id);

        let session = state.sessions.get_mut(session_id)?;
        if session.expired || session.payment.is_some() {
            return None;
        }
        session.payment = Some((payment_id.clone(), shipping_address));
        Some(payment_id)
    }

    /// Returns the session opened for an order, if any.
    pub fn session_for_order(&self, order_id: OrderId) -> Option<String> {
        self.state()
            .sessions
            .iter()
            .find(|(_, record)| record.order_id == order_id)
            .map(|(id, _)| id.clone())
    }

    /// Returns the ids of every session ever opened.
    pub fn session_ids(&self) -> Vec<String> {
        self.state().sessions.keys().cloned().collect()
    }

    /// Returns the amount a session charges.
    pub fn amount_of(&self, session_id: &str) -> Option<Money> {
        self.state()
            .sessions
            .get(session_id)
            .map(|record| record.amount_total)
    }

    /// Returns the number of sessions ever opened.
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Returns true if the session was expired.
    pub fn is_expired(&self, session_id: &str) -> bool {
        self.state()
            .sessions
            .get(session_id)
            .is_some_and(|record| record.expired)
    }

    /// Returns the number of distinct refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state().refunds.len()
    }

    /// Returns true if a refund was issued for the payment.
    pub fn has_refund_for(&self, payment_id: &str) -> bool {
        self.state().refunds.values().any(|p| p == payment_id)
    }
}

#[async_trait]
impl CheckoutBridge for InMemoryCheckoutProvider {
    async fn open(
        &self,
        order_id: OrderId,
        lines: &[CheckoutLine],
        _redirects: &RedirectTargets,
    ) -> Result<CheckoutSession> {
        let delay = self.state().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_on_open {
            return Err(CheckoutError::Unavailable(
                "checkout provider offline".to_string(),
            ));
        }

        let amount_total = lines
            .iter()
            .map(|line| line.unit_amount.checked_mul(line.quantity))
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
            .ok_or_else(|| CheckoutError::Rejected {
                status: 400,
                message: "amount_total exceeds the maximum amount".to_string(),
            })?;

        state.next_id += 1;
        let session_id = format!("cs_test_{:04}", state.next_id);
        state.sessions.insert(
            session_id.clone(),
            SessionRecord {
                order_id,
                amount_total,
                payment: None,
                expired: false,
            },
        );

        Ok(CheckoutSession {
            payment_url: format!("https://checkout.test/pay/{session_id}"),
            session_id,
        })
    }

    async fn resolve(&self, session_id: &str) -> Result<SessionResolution> {
        let state = self.state();
        if state.fail_on_resolve {
            return Err(CheckoutError::Unavailable(
                "checkout provider offline".to_string(),
            ));
        }

        let Some(record) = state.sessions.get(session_id) else {
            return Ok(SessionResolution::NotFound);
        };

        Ok(match &record.payment {
            Some((payment_id, shipping_address)) => SessionResolution::Paid {
                order_id: record.order_id,
                payment_id: payment_id.clone(),
                shipping_address: shipping_address.clone(),
            },
            None => SessionResolution::NotPaid {
                order_id: Some(record.order_id),
            },
        })
    }

    async fn expire(&self, session_id: &str) -> Result<()> {
        let mut state = self.state();
        let record = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CheckoutError::Rejected {
                status: 404,
                message: format!("No such checkout session: {session_id}"),
            })?;

        if record.payment.is_some() {
            return Err(CheckoutError::Rejected {
                status: 400,
                message: "Only open sessions can be expired".to_string(),
            });
        }
        record.expired = true;
        Ok(())
    }

    async fn refund(&self, payment_id: &str, idempotency_key: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_on_refund {
            return Err(CheckoutError::Unavailable("refund declined".to_string()));
        }

        let known = state
            .sessions
            .values()
            .any(|record| matches!(&record.payment, Some((id, _)) if id == payment_id));
        if !known {
            return Err(CheckoutError::Rejected {
                status: 404,
                message: format!("No such payment: {payment_id}"),
            });
        }

        state
            .refunds
            .entry(idempotency_key.to_string())
            .or_insert_with(|| payment_id.to_string());
        Ok(())
    }
}
