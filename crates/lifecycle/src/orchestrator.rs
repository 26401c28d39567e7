//! Order lifecycle orchestrator.

use std::future::Future;
use std::time::{Duration, Instant};

use checkout::{CheckoutBridge, CheckoutLine, CheckoutSession, RedirectTargets, SessionResolution};
use chrono::{DateTime, Utc};
use common::{Actor, OrderId};
use domain::{
    CancellationOutcome, CartItem, Money, Order, OrderError, OrderUpdate, normalize_cart,
};
use serde::Serialize;
use store::{OrderQuery, Store, StoreTx, ledger};

use crate::error::{LifecycleError, Result};
use crate::steps;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Where the checkout page sends the customer back to.
    pub redirects: RedirectTargets,
    /// Upper bound on every checkout provider call.
    pub checkout_timeout: Duration,
    /// Unpaid orders untouched for longer than this are swept.
    pub stale_after: chrono::Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            redirects: RedirectTargets::from_base_url("http://localhost:3000"),
            checkout_timeout: Duration::from_secs(10),
            stale_after: chrono::Duration::hours(12),
        }
    }
}

/// A committed order with its open checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub session_id: String,
    pub payment_url: String,
    pub total_amount: Money,
}

/// Outcome of a payment-success reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    /// False when the payment had already been applied by an earlier call.
    pub newly_applied: bool,
}

/// Outcome of a pre-payment cancel reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckoutCancellation {
    pub order_id: OrderId,
    /// True when the order had already been removed by an earlier call,
    /// an explicit cancel or the sweeper.
    pub already_cleaned: bool,
}

/// Outcome of an explicit order cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CancellationResult {
    /// The unpaid order was deleted and its stock released.
    Discarded,
    /// The paid order was cancelled, restocked and refunded.
    Refunded { payment_id: String },
}

/// Counters from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates returned by the stale query.
    pub examined: usize,
    /// Orders restocked and deleted.
    pub swept: usize,
    /// Candidates that were paid, touched or removed before they could be swept.
    pub skipped: usize,
    /// Candidates whose sweep transaction failed.
    pub failed: usize,
}

enum SweepOutcome {
    Swept { session_id: Option<String> },
    Skipped,
}

/// Drives orders from cart to payment outcome.
///
/// Every multi-step mutation of an order and its stock runs in one store
/// transaction. The only external call made while a transaction is open is
/// the checkout session creation (and the refund on cancel-after-payment);
/// both are bounded by [`LifecycleConfig::checkout_timeout`].
pub struct OrderLifecycle<S, C>
where
    S: Store,
    C: CheckoutBridge,
{
    store: S,
    checkout: C,
    config: LifecycleConfig,
}

impl<S, C> OrderLifecycle<S, C>
where
    S: Store,
    C: CheckoutBridge,
{
    /// Creates a new orchestrator.
    pub fn new(store: S, checkout: C, config: LifecycleConfig) -> Self {
        Self {
            store,
            checkout,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn checkout(&self) -> &C {
        &self.checkout
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Reserves stock for `cart`, persists a pending order and opens its
    /// checkout session, all or nothing.
    #[tracing::instrument(skip(self, actor, cart), fields(user_id = %actor.user_id))]
    pub async fn create_order(&self, actor: &Actor, cart: Vec<CartItem>) -> Result<CreatedOrder> {
        let started = Instant::now();

        match self.try_create_order(actor, cart).await {
            Ok(created) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %created.order_id,
                    session_id = %created.session_id,
                    total = %created.total_amount,
                    duration = started.elapsed().as_secs_f64(),
                    "order created"
                );
                Ok(created)
            }
            Err(e) => {
                metrics::counter!("orders_creation_failed_total").increment(1);
                tracing::warn!(error = %e, "order creation failed");
                Err(e)
            }
        }
    }

    async fn try_create_order(&self, actor: &Actor, cart: Vec<CartItem>) -> Result<CreatedOrder> {
        let cart = normalize_cart(cart)?;
        let mut tx = self.store.begin().await?;

        tracing::debug!(step = steps::STEP_RESERVE_STOCK, "order step started");
        let lines = ledger::check_and_reserve(&mut tx, &cart).await?;

        tracing::debug!(step = steps::STEP_PERSIST_ORDER, "order step started");
        let mut order = Order::create(actor.user_id, lines, Utc::now())?;
        tx.insert_order(&order).await?;

        tracing::debug!(step = steps::STEP_OPEN_CHECKOUT, "order step started");
        let checkout_lines: Vec<CheckoutLine> =
            order.items().iter().map(CheckoutLine::from).collect();
        let session = match self.open_checkout(order.id(), &checkout_lines).await {
            Ok(session) => session,
            Err(e) => {
                abort(tx, steps::STEP_OPEN_CHECKOUT).await;
                return Err(e);
            }
        };

        tracing::debug!(step = steps::STEP_COMMIT, "order step started");
        order.attach_checkout_session(session.session_id.clone());
        let committed = match tx.update_order(&order).await {
            Ok(()) => tx.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            // The session exists but its order does not; make sure it cannot be paid.
            self.expire_quietly(&session.session_id).await;
            return Err(e.into());
        }

        Ok(CreatedOrder {
            order_id: order.id(),
            session_id: session.session_id,
            payment_url: session.payment_url,
            total_amount: order.total_amount(),
        })
    }

    async fn open_checkout(
        &self,
        order_id: OrderId,
        lines: &[CheckoutLine],
    ) -> Result<CheckoutSession> {
        let started = Instant::now();
        let result = self
            .bounded(self.checkout.open(order_id, lines, &self.config.redirects))
            .await;
        metrics::histogram!("checkout_open_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Applies a confirmed payment to the order bound to `session_id`.
    ///
    /// Repeated calls for the same session return `newly_applied: false`
    /// without touching the order again.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_payment_success(&self, session_id: &str) -> Result<PaymentConfirmation> {
        let (order_id, payment_id, shipping_address) =
            match self.bounded(self.checkout.resolve(session_id)).await? {
                SessionResolution::Paid {
                    order_id,
                    payment_id,
                    shipping_address,
                } => (order_id, payment_id, shipping_address),
                SessionResolution::NotPaid { .. } => {
                    return Err(LifecycleError::PaymentNotCompleted(session_id.to_string()));
                }
                SessionResolution::NotFound => {
                    return Err(LifecycleError::SessionNotFound(session_id.to_string()));
                }
            };

        // Locking the row serializes this against the sweeper and cancels.
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        match order.apply_payment_success(session_id, payment_id, shipping_address, Utc::now()) {
            Ok(()) => {}
            Err(OrderError::AlreadyProcessed(_)) => {
                abort(tx, "duplicate_payment").await;
                metrics::counter!("payments_reconciled_total", "outcome" => "duplicate")
                    .increment(1);
                tracing::info!(%order_id, "payment already applied");
                return Ok(PaymentConfirmation {
                    order_id,
                    newly_applied: false,
                });
            }
            Err(e) => return Err(e.into()),
        }

        tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("payments_reconciled_total", "outcome" => "applied").increment(1);
        tracing::info!(%order_id, "payment applied");
        Ok(PaymentConfirmation {
            order_id,
            newly_applied: true,
        })
    }

    /// Releases the reservation of an order whose checkout was abandoned.
    ///
    /// Refuses sessions that were paid. A session whose order is already gone
    /// is reported as `already_cleaned`.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_payment_cancel(&self, session_id: &str) -> Result<CheckoutCancellation> {
        let order_id = match self.bounded(self.checkout.resolve(session_id)).await? {
            SessionResolution::NotPaid {
                order_id: Some(order_id),
            } => order_id,
            SessionResolution::NotPaid { order_id: None } => {
                return Err(LifecycleError::UncorrelatedSession(session_id.to_string()));
            }
            SessionResolution::Paid { .. } => {
                return Err(LifecycleError::SessionAlreadyPaid(session_id.to_string()));
            }
            SessionResolution::NotFound => {
                return Err(LifecycleError::SessionNotFound(session_id.to_string()));
            }
        };

        let mut tx = self.store.begin().await?;
        let Some(order) = tx.get_order_for_update(order_id).await? else {
            abort(tx, "already_cleaned").await;
            tracing::info!(%order_id, "order already removed");
            return Ok(CheckoutCancellation {
                order_id,
                already_cleaned: true,
            });
        };

        // The provider answer may be stale by now; the locked row is not.
        if !order.payment_status().is_pending() {
            return Err(LifecycleError::SessionAlreadyPaid(session_id.to_string()));
        }
        if let Some(expected) = order.checkout_session_id()
            && expected != session_id
        {
            return Err(OrderError::SessionMismatch {
                order_id,
                expected: expected.to_string(),
                actual: session_id.to_string(),
            }
            .into());
        }

        let released = ledger::release(&mut tx, order.items()).await?;
        tx.delete_order(order_id).await?;
        tx.commit().await?;

        self.expire_quietly(session_id).await;
        metrics::counter!("orders_cancelled_total", "stage" => "checkout").increment(1);
        tracing::info!(%order_id, units = released.credited, "abandoned checkout released");
        Ok(CheckoutCancellation {
            order_id,
            already_cleaned: false,
        })
    }

    /// Cancels an order on behalf of its owner or an admin.
    ///
    /// Unpaid orders are deleted. Paid orders are flipped to cancelled and
    /// refunded; the refund happens before commit so a failed refund leaves
    /// the order and its stock untouched.
    #[tracing::instrument(skip(self, actor, reason), fields(role = %actor.role))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: &str,
    ) -> Result<CancellationResult> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        let outcome = order.apply_cancellation(actor, reason, Utc::now())?;
        let released = ledger::release(&mut tx, order.items()).await?;

        match outcome {
            CancellationOutcome::Discard => {
                tx.delete_order(order_id).await?;
                tx.commit().await?;

                if let Some(session_id) = order.checkout_session_id() {
                    self.expire_quietly(session_id).await;
                }
                metrics::counter!("orders_cancelled_total", "stage" => "pending").increment(1);
                tracing::info!(units = released.credited, "unpaid order discarded");
                Ok(CancellationResult::Discarded)
            }
            CancellationOutcome::Refund { payment_id } => {
                tx.update_order(&order).await?;

                let key = order_id.to_string();
                if let Err(e) = self
                    .bounded(self.checkout.refund(&payment_id, &key))
                    .await
                {
                    abort(tx, "refund").await;
                    return Err(e);
                }
                if let Err(e) = tx.commit().await {
                    // Retrying the cancel reuses the same idempotency key.
                    tracing::error!(%payment_id, error = %e, "refund issued but cancellation not committed");
                    return Err(e.into());
                }

                metrics::counter!("orders_cancelled_total", "stage" => "paid").increment(1);
                tracing::info!(%payment_id, units = released.credited, "paid order cancelled and refunded");
                Ok(CancellationResult::Refunded { payment_id })
            }
        }
    }

    /// Applies a role-gated update and returns the updated order.
    #[tracing::instrument(skip(self, actor, update), fields(role = %actor.role))]
    pub async fn update_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order_for_update(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        order.apply_update(actor, update, Utc::now())?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            fulfillment_status = %order.fulfillment_status(),
            "order updated"
        );
        Ok(order)
    }

    /// Loads an order visible to `actor`.
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if !order.is_visible_to(actor) {
            return Err(OrderError::Forbidden("only the owner or an admin may view this order").into());
        }
        Ok(order)
    }

    /// Lists orders: admins see every order, customers only their own.
    pub async fn list_orders(&self, actor: &Actor, query: OrderQuery) -> Result<Vec<Order>> {
        let query = if actor.is_admin() {
            query
        } else {
            OrderQuery {
                user_id: Some(actor.user_id),
                ..query
            }
        };
        Ok(self.store.query_orders(query).await?)
    }

    /// Releases and deletes every unpaid order not touched since
    /// `now - stale_after`.
    ///
    /// Each order is swept in its own transaction and re-checked under lock,
    /// so an order paid while the sweep runs is skipped. A failing order is
    /// logged and counted; the sweep moves on.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = now - self.config.stale_after;
        let candidates = self
            .store
            .query_orders(OrderQuery::stale_pending(cutoff))
            .await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let order_id = candidate.id();
            match self.sweep_one(order_id, cutoff).await {
                Ok(SweepOutcome::Swept { session_id }) => {
                    report.swept += 1;
                    if let Some(session_id) = session_id {
                        self.expire_quietly(&session_id).await;
                    }
                }
                Ok(SweepOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("sweep_failures_total").increment(1);
                    tracing::warn!(%order_id, error = %e, "failed to sweep order");
                }
            }
        }

        metrics::counter!("orders_swept_total").increment(report.swept as u64);
        tracing::info!(
            examined = report.examined,
            swept = report.swept,
            skipped = report.skipped,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    async fn sweep_one(&self, order_id: OrderId, cutoff: DateTime<Utc>) -> Result<SweepOutcome> {
        let mut tx = self.store.begin().await?;
        let order = match tx.get_order_for_update(order_id).await? {
            Some(order) if order.is_stale(cutoff) => order,
            _ => {
                abort(tx, "sweep_recheck").await;
                return Ok(SweepOutcome::Skipped);
            }
        };

        ledger::release(&mut tx, order.items()).await?;
        tx.delete_order(order_id).await?;
        tx.commit().await?;

        tracing::debug!(%order_id, "stale order swept");
        Ok(SweepOutcome::Swept {
            session_id: order.checkout_session_id().map(str::to_string),
        })
    }

    /// Runs a checkout provider call under the configured timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = checkout::Result<T>>,
    {
        match tokio::time::timeout(self.config.checkout_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(LifecycleError::CheckoutTimeout(self.config.checkout_timeout)),
        }
    }

    /// Expires a checkout session, logging instead of failing.
    async fn expire_quietly(&self, session_id: &str) {
        if let Err(e) = self.bounded(self.checkout.expire(session_id)).await {
            tracing::warn!(
                step = steps::STEP_EXPIRE_SESSION,
                session_id,
                error = %e,
                "could not expire checkout session"
            );
        }
    }
}

/// Rolls back a transaction, logging a failed rollback.
async fn abort<T: StoreTx>(tx: T, step: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(step, error = %e, "rollback failed");
    }
}
