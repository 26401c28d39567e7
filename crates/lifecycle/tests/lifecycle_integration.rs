//! Integration tests for the order lifecycle against in-memory backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use checkout::{CheckoutBridge, InMemoryCheckoutProvider};
use chrono::Utc;
use common::{Actor, ErrorKind, OrderId, UserId};
use domain::{
    CartItem, FulfillmentStatus, Money, Order, OrderError, OrderParts, OrderUpdate, PaymentStatus,
    Product, ProductId, ShippingAddress, User,
};
use lifecycle::{
    CancellationResult, LifecycleConfig, LifecycleError, LifecycleState, OrderLifecycle,
    SweepReport,
};
use store::{InMemoryStore, InMemoryTx, LedgerError, OrderQuery, Store, StoreTx};

type TestLifecycle = OrderLifecycle<InMemoryStore, InMemoryCheckoutProvider>;

struct TestHarness {
    lifecycle: Arc<TestLifecycle>,
    store: InMemoryStore,
    provider: InMemoryCheckoutProvider,
    customer: Actor,
    admin: Actor,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_config(LifecycleConfig::default()).await
    }

    async fn with_config(config: LifecycleConfig) -> Self {
        let store = InMemoryStore::new();
        let provider = InMemoryCheckoutProvider::new();

        store
            .upsert_product(&Product::new("P", "Widget", Money::from_cents(10), 5))
            .await
            .unwrap();
        store
            .upsert_product(&Product::new("Q", "Gadget", Money::from_cents(250), 2))
            .await
            .unwrap();

        let lifecycle = Arc::new(OrderLifecycle::new(
            store.clone(),
            provider.clone(),
            config,
        ));

        Self {
            lifecycle,
            store,
            provider,
            customer: Actor::user(UserId::new()),
            admin: Actor::admin(UserId::new()),
        }
    }

    async fn stock(&self, id: &str) -> i64 {
        self.store.stock_of(&ProductId::new(id)).await.unwrap()
    }

    async fn order(&self, id: OrderId) -> Option<Order> {
        self.store.get_order(id).await.unwrap()
    }

    /// Creates an order and pays for it; returns (order id, session id, payment id).
    async fn paid_order(&self, cart: Vec<CartItem>) -> (OrderId, String, String) {
        let created = self
            .lifecycle
            .create_order(&self.customer, cart)
            .await
            .unwrap();
        let payment_id = self
            .provider
            .complete_payment(&created.session_id, None)
            .unwrap();
        self.lifecycle
            .reconcile_payment_success(&created.session_id)
            .await
            .unwrap();
        (created.order_id, created.session_id, payment_id)
    }

    /// Rewrites an order's timestamps as if it were last touched `age` ago.
    async fn backdate(&self, id: OrderId, age: chrono::Duration) {
        let mut tx = self.store.begin().await.unwrap();
        let order = tx.get_order_for_update(id).await.unwrap().unwrap();
        let at = Utc::now() - age;
        let aged = Order::from_parts(OrderParts {
            id: order.id(),
            user_id: order.user_id(),
            items: order.items().to_vec(),
            total_amount: order.total_amount(),
            payment_status: order.payment_status(),
            fulfillment_status: order.fulfillment_status(),
            payment_id: order.payment_id().map(str::to_string),
            checkout_session_id: order.checkout_session_id().map(str::to_string),
            shipping_address: order.shipping_address().cloned(),
            updates: order.updates().to_string(),
            created_at: at,
            updated_at: at,
        });
        tx.update_order(&aged).await.unwrap();
        tx.commit().await.unwrap();
    }
}

/// Store whose order listing can be pinned to an earlier snapshot, so a sweep
/// acts on candidates that changed after they were listed.
#[derive(Clone)]
struct PinnedListingStore {
    inner: InMemoryStore,
    pinned: Arc<Mutex<Option<Vec<Order>>>>,
}

impl PinnedListingStore {
    fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            pinned: Arc::new(Mutex::new(None)),
        }
    }

    fn pin(&self, orders: Vec<Order>) {
        *self.pinned.lock().unwrap() = Some(orders);
    }
}

#[async_trait]
impl Store for PinnedListingStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> store::Result<InMemoryTx> {
        self.inner.begin().await
    }

    async fn get_order(&self, id: OrderId) -> store::Result<Option<Order>> {
        self.inner.get_order(id).await
    }

    async fn query_orders(&self, query: OrderQuery) -> store::Result<Vec<Order>> {
        let pinned = self.pinned.lock().unwrap().clone();
        match pinned {
            Some(orders) => Ok(orders),
            None => self.inner.query_orders(query).await,
        }
    }

    async fn get_product(&self, id: &ProductId) -> store::Result<Option<Product>> {
        self.inner.get_product(id).await
    }

    async fn upsert_product(&self, product: &Product) -> store::Result<()> {
        self.inner.upsert_product(product).await
    }

    async fn find_user_by_email(&self, email: &str) -> store::Result<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn insert_user(&self, user: &User) -> store::Result<()> {
        self.inner.insert_user(user).await
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_pay_then_duplicate_confirmation() {
    let h = TestHarness::new().await;

    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 3)])
        .await
        .unwrap();

    assert_eq!(h.stock("P").await, 2);
    assert_eq!(created.total_amount, Money::from_cents(30));
    let order = h.order(created.order_id).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Pending);
    assert_eq!(order.checkout_session_id(), Some(created.session_id.as_str()));
    assert_eq!(LifecycleState::of(&order), LifecycleState::AwaitingPayment);

    h.provider.complete_payment(&created.session_id, None).unwrap();
    let first = h
        .lifecycle
        .reconcile_payment_success(&created.session_id)
        .await
        .unwrap();
    assert!(first.newly_applied);

    let order = h.order(created.order_id).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Successful);
    assert_eq!(order.fulfillment_status(), FulfillmentStatus::InProgress);
    let updated_at = order.updated_at();

    let second = h
        .lifecycle
        .reconcile_payment_success(&created.session_id)
        .await
        .unwrap();
    assert!(!second.newly_applied);
    assert_eq!(second.order_id, created.order_id);
    assert_eq!(h.order(created.order_id).await.unwrap().updated_at(), updated_at);
    assert_eq!(h.stock("P").await, 2);
}

#[tokio::test]
async fn insufficient_stock_rejects_without_effect() {
    let h = TestHarness::new().await;

    let err = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("Q", 3)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Ledger(LedgerError::InsufficientStock { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.stock("Q").await, 2);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.provider.session_count(), 0);
}

#[tokio::test]
async fn total_overflow_rejects_without_effect() {
    let h = TestHarness::new().await;
    h.store
        .upsert_product(&Product::new("BIG", "Yacht", Money::from_cents(i64::MAX / 2), 5))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("BIG", 3)])
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Order(OrderError::TotalOverflow)));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.stock("BIG").await, 5);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.provider.session_count(), 0);
}

#[tokio::test]
async fn one_short_line_leaves_every_product_untouched() {
    let h = TestHarness::new().await;

    let err = h
        .lifecycle
        .create_order(
            &h.customer,
            vec![CartItem::new("P", 1), CartItem::new("Q", 5)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.stock("P").await, 5);
    assert_eq!(h.stock("Q").await, 2);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let h = TestHarness::new().await;

    let err = h
        .lifecycle
        .create_order(
            &h.customer,
            vec![CartItem::new("P", 1), CartItem::new("NOPE", 1)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.stock("P").await, 5);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn malformed_carts_are_validation_errors() {
    let h = TestHarness::new().await;

    let empty = h
        .lifecycle
        .create_order(&h.customer, vec![])
        .await
        .unwrap_err();
    assert!(matches!(empty, LifecycleError::Order(OrderError::EmptyCart)));

    let zero = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 0)])
        .await
        .unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn duplicate_cart_lines_are_merged() {
    let h = TestHarness::new().await;

    let created = h
        .lifecycle
        .create_order(
            &h.customer,
            vec![CartItem::new("P", 2), CartItem::new("P", 2)],
        )
        .await
        .unwrap();

    let order = h.order(created.order_id).await.unwrap();
    assert_eq!(order.items().len(), 1);
    assert_eq!(order.items()[0].quantity, 4);
    assert_eq!(h.stock("P").await, 1);
}

#[tokio::test]
async fn checkout_failure_rolls_back_reservation() {
    let h = TestHarness::new().await;
    h.provider.set_fail_on_open(true);

    let err = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 3)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    assert!(err.is_retryable());
    assert_eq!(h.stock("P").await, 5);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn checkout_timeout_rolls_back_reservation() {
    let h = TestHarness::with_config(LifecycleConfig {
        checkout_timeout: Duration::from_millis(50),
        ..Default::default()
    })
    .await;
    h.provider.set_open_delay(Some(Duration::from_millis(500)));

    let err = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::CheckoutTimeout(_)));
    assert_eq!(h.stock("P").await, 5);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn failed_commit_expires_the_opened_session() {
    let h = TestHarness::new().await;
    h.store.set_fail_next_commit(true);

    let err = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.stock("P").await, 5);
    let sessions = h.provider.session_ids();
    assert_eq!(sessions.len(), 1);
    assert!(h.provider.is_expired(&sessions[0]));
}

#[tokio::test]
async fn concurrent_creates_never_oversell() {
    let h = TestHarness::new().await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let lifecycle = h.lifecycle.clone();
        let actor = Actor::user(UserId::new());
        handles.push(tokio::spawn(async move {
            lifecycle
                .create_order(&actor, vec![CartItem::new("Q", 1)])
                .await
                .is_ok()
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }

    assert_eq!(created, 2);
    assert_eq!(h.stock("Q").await, 0);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_for_unpaid_or_unknown_session_is_rejected() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap();

    let unpaid = h
        .lifecycle
        .reconcile_payment_success(&created.session_id)
        .await
        .unwrap_err();
    assert!(matches!(unpaid, LifecycleError::PaymentNotCompleted(_)));
    assert_eq!(
        h.order(created.order_id).await.unwrap().payment_status(),
        PaymentStatus::Pending
    );

    let unknown = h
        .lifecycle
        .reconcile_payment_success("cs_missing")
        .await
        .unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn success_records_shipping_address() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap();

    let address = ShippingAddress {
        line1: Some("1 Main St".to_string()),
        city: Some("Toronto".to_string()),
        country: Some("CA".to_string()),
        ..Default::default()
    };
    h.provider
        .complete_payment(&created.session_id, Some(address.clone()))
        .unwrap();
    h.lifecycle
        .reconcile_payment_success(&created.session_id)
        .await
        .unwrap();

    let order = h.order(created.order_id).await.unwrap();
    assert_eq!(order.shipping_address(), Some(&address));
    assert!(order.payment_id().is_some());
}

#[tokio::test]
async fn abandoned_checkout_round_trip_restores_stock() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(
            &h.customer,
            vec![CartItem::new("P", 3), CartItem::new("Q", 2)],
        )
        .await
        .unwrap();
    assert_eq!(h.stock("P").await, 2);
    assert_eq!(h.stock("Q").await, 0);

    let cancelled = h
        .lifecycle
        .reconcile_payment_cancel(&created.session_id)
        .await
        .unwrap();

    assert!(!cancelled.already_cleaned);
    assert_eq!(h.stock("P").await, 5);
    assert_eq!(h.stock("Q").await, 2);
    assert!(h.order(created.order_id).await.is_none());
    assert!(h.provider.is_expired(&created.session_id));

    let again = h
        .lifecycle
        .reconcile_payment_cancel(&created.session_id)
        .await
        .unwrap();
    assert!(again.already_cleaned);
    assert_eq!(h.stock("P").await, 5);
}

#[tokio::test]
async fn cancel_reconciliation_refuses_paid_sessions() {
    let h = TestHarness::new().await;
    let (order_id, session_id, _) = h.paid_order(vec![CartItem::new("P", 2)]).await;

    let err = h
        .lifecycle
        .reconcile_payment_cancel(&session_id)
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::SessionAlreadyPaid(_)));
    assert_eq!(h.stock("P").await, 3);
    assert!(h.order(order_id).await.is_some());
}

#[tokio::test]
async fn provider_outage_during_reconciliation_changes_nothing() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 2)])
        .await
        .unwrap();
    h.provider.set_fail_on_resolve(true);

    let err = h
        .lifecycle
        .reconcile_payment_cancel(&created.session_id)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    assert_eq!(h.stock("P").await, 3);
    assert!(h.order(created.order_id).await.is_some());
}

// ---------------------------------------------------------------------------
// Explicit cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pay_then_cancel_restocks_and_refunds() {
    let h = TestHarness::new().await;
    let (order_id, _, payment_id) = h.paid_order(vec![CartItem::new("P", 3)]).await;
    assert_eq!(h.stock("P").await, 2);

    let result = h
        .lifecycle
        .cancel_order(&h.customer, order_id, "changed my mind")
        .await
        .unwrap();

    assert_eq!(
        result,
        CancellationResult::Refunded {
            payment_id: payment_id.clone()
        }
    );
    assert_eq!(h.stock("P").await, 5);
    let order = h.order(order_id).await.unwrap();
    assert_eq!(order.fulfillment_status(), FulfillmentStatus::Cancelled);
    assert_eq!(order.payment_status(), PaymentStatus::Successful);
    assert!(order.updates().contains("changed my mind"));
    assert!(h.provider.has_refund_for(&payment_id));
}

#[tokio::test]
async fn failed_refund_aborts_the_cancellation() {
    let h = TestHarness::new().await;
    let (order_id, _, _) = h.paid_order(vec![CartItem::new("P", 3)]).await;
    h.provider.set_fail_on_refund(true);

    let err = h
        .lifecycle
        .cancel_order(&h.admin, order_id, "fraud")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    assert_eq!(h.stock("P").await, 2);
    assert_eq!(
        h.order(order_id).await.unwrap().fulfillment_status(),
        FulfillmentStatus::InProgress
    );
    assert_eq!(h.provider.refund_count(), 0);
}

#[tokio::test]
async fn cancelling_twice_is_a_conflict() {
    let h = TestHarness::new().await;
    let (order_id, _, _) = h.paid_order(vec![CartItem::new("P", 1)]).await;

    h.lifecycle
        .cancel_order(&h.customer, order_id, "")
        .await
        .unwrap();
    let err = h
        .lifecycle
        .cancel_order(&h.customer, order_id, "")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.stock("P").await, 5);
    assert_eq!(h.provider.refund_count(), 1);
}

#[tokio::test]
async fn cancel_pending_order_discards_it() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 4)])
        .await
        .unwrap();

    let result = h
        .lifecycle
        .cancel_order(&h.customer, created.order_id, "")
        .await
        .unwrap();

    assert_eq!(result, CancellationResult::Discarded);
    assert_eq!(h.stock("P").await, 5);
    assert!(h.order(created.order_id).await.is_none());
    assert!(h.provider.is_expired(&created.session_id));
    assert_eq!(h.provider.refund_count(), 0);
}

#[tokio::test]
async fn strangers_cannot_cancel() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap();

    let err = h
        .lifecycle
        .cancel_order(&Actor::user(UserId::new()), created.order_id, "")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(h.stock("P").await, 4);
    assert!(h.order(created.order_id).await.is_some());
}

#[tokio::test]
async fn delivered_orders_cannot_be_cancelled() {
    let h = TestHarness::new().await;
    let (order_id, _, _) = h.paid_order(vec![CartItem::new("P", 1)]).await;
    h.lifecycle
        .update_order(
            &h.admin,
            order_id,
            OrderUpdate::status(FulfillmentStatus::Delivered, Some("left at door".into())),
        )
        .await
        .unwrap();

    let err = h
        .lifecycle
        .cancel_order(&h.admin, order_id, "")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Order(OrderError::AlreadyDelivered(_))
    ));
    assert_eq!(h.stock("P").await, 4);
}

#[tokio::test]
async fn cancel_of_missing_order_is_not_found() {
    let h = TestHarness::new().await;
    let err = h
        .lifecycle
        .cancel_order(&h.admin, OrderId::new(), "")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ---------------------------------------------------------------------------
// Updates and reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn role_gated_updates() {
    let h = TestHarness::new().await;
    let (order_id, _, _) = h.paid_order(vec![CartItem::new("P", 1)]).await;

    let address = ShippingAddress {
        line2: Some("Apt 4".to_string()),
        ..Default::default()
    };
    let order = h
        .lifecycle
        .update_order(&h.customer, order_id, OrderUpdate::shipping(address))
        .await
        .unwrap();
    assert_eq!(
        order.shipping_address().and_then(|a| a.line2.as_deref()),
        Some("Apt 4")
    );

    let err = h
        .lifecycle
        .update_order(
            &h.customer,
            order_id,
            OrderUpdate::status(FulfillmentStatus::Delivered, None),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let order = h
        .lifecycle
        .update_order(
            &h.admin,
            order_id,
            OrderUpdate::status(FulfillmentStatus::Delivered, Some("shipped".into())),
        )
        .await
        .unwrap();
    assert_eq!(order.fulfillment_status(), FulfillmentStatus::Delivered);
    assert_eq!(order.updates(), "shipped");

    let err = h
        .lifecycle
        .update_order(
            &h.customer,
            order_id,
            OrderUpdate::shipping(ShippingAddress::default()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn reads_respect_ownership() {
    let h = TestHarness::new().await;
    let mine = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap();
    let other = Actor::user(UserId::new());
    h.lifecycle
        .create_order(&other, vec![CartItem::new("P", 1)])
        .await
        .unwrap();

    let own = h
        .lifecycle
        .list_orders(&h.customer, OrderQuery::new())
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id(), mine.order_id);

    // A customer cannot widen the filter to someone else's orders.
    let widened = h
        .lifecycle
        .list_orders(&h.customer, OrderQuery::for_user(other.user_id))
        .await
        .unwrap();
    assert_eq!(widened.len(), 1);
    assert_eq!(widened[0].user_id(), h.customer.user_id);

    let all = h
        .lifecycle
        .list_orders(&h.admin, OrderQuery::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    assert!(h.lifecycle.get_order(&h.admin, mine.order_id).await.is_ok());
    let err = h
        .lifecycle
        .get_order(&other, mine.order_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_releases_only_stale_unpaid_orders() {
    let h = TestHarness::new().await;

    let old = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 2)])
        .await
        .unwrap();
    let fresh = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap();
    let (paid, _, _) = h.paid_order(vec![CartItem::new("Q", 1)]).await;

    h.backdate(old.order_id, chrono::Duration::hours(13)).await;
    h.backdate(fresh.order_id, chrono::Duration::hours(1)).await;
    h.backdate(paid, chrono::Duration::hours(48)).await;
    assert_eq!(h.stock("P").await, 2);

    let report = h.lifecycle.sweep_expired(Utc::now()).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.swept, 1);
    assert_eq!(report.failed, 0);
    assert!(h.order(old.order_id).await.is_none());
    assert!(h.order(fresh.order_id).await.is_some());
    assert!(h.order(paid).await.is_some());
    assert_eq!(h.stock("P").await, 4);
    assert_eq!(h.stock("Q").await, 1);
    assert!(h.provider.is_expired(&old.session_id));
    assert!(!h.provider.is_expired(&fresh.session_id));
}

#[tokio::test]
async fn sweep_failure_is_counted_and_retried_next_run() {
    let h = TestHarness::new().await;
    let old = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 2)])
        .await
        .unwrap();
    h.backdate(old.order_id, chrono::Duration::hours(13)).await;

    h.store.set_fail_next_commit(true);
    let report = h.lifecycle.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(h.stock("P").await, 3);
    assert!(h.order(old.order_id).await.is_some());

    let report = h.lifecycle.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(report.swept, 1);
    assert_eq!(h.stock("P").await, 5);
}

#[tokio::test]
async fn sweep_skips_order_paid_after_it_was_listed() {
    let h = TestHarness::new().await;
    let pinned = PinnedListingStore::new(h.store.clone());
    let lifecycle = OrderLifecycle::new(
        pinned.clone(),
        h.provider.clone(),
        LifecycleConfig::default(),
    );

    let created = lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 3)])
        .await
        .unwrap();
    h.backdate(created.order_id, chrono::Duration::hours(13)).await;

    // Listed while still unpaid, then paid before the sweep locks the row.
    let cutoff = Utc::now() - LifecycleConfig::default().stale_after;
    let listed = h
        .store
        .query_orders(OrderQuery::stale_pending(cutoff))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    pinned.pin(listed);

    h.provider
        .complete_payment(&created.session_id, None)
        .unwrap();
    lifecycle
        .reconcile_payment_success(&created.session_id)
        .await
        .unwrap();

    let report = lifecycle.sweep_expired(Utc::now()).await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            examined: 1,
            swept: 0,
            skipped: 1,
            failed: 0,
        }
    );
    let order = h.order(created.order_id).await.unwrap();
    assert_eq!(order.payment_status(), PaymentStatus::Successful);
    assert_eq!(h.stock("P").await, 2);
    assert!(!h.provider.is_expired(&created.session_id));
}

#[tokio::test]
async fn sweep_skips_order_removed_after_it_was_listed() {
    let h = TestHarness::new().await;
    let pinned = PinnedListingStore::new(h.store.clone());
    let lifecycle = OrderLifecycle::new(
        pinned.clone(),
        h.provider.clone(),
        LifecycleConfig::default(),
    );

    let created = lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 2)])
        .await
        .unwrap();
    h.backdate(created.order_id, chrono::Duration::hours(13)).await;
    pinned.pin(vec![h.order(created.order_id).await.unwrap()]);

    lifecycle
        .reconcile_payment_cancel(&created.session_id)
        .await
        .unwrap();
    assert_eq!(h.stock("P").await, 5);

    let report = lifecycle.sweep_expired(Utc::now()).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.swept, 0);
    assert_eq!(h.stock("P").await, 5);
}

#[tokio::test]
async fn payment_after_sweep_finds_no_order() {
    let h = TestHarness::new().await;
    let created = h
        .lifecycle
        .create_order(&h.customer, vec![CartItem::new("P", 1)])
        .await
        .unwrap();
    h.backdate(created.order_id, chrono::Duration::hours(13)).await;
    h.lifecycle.sweep_expired(Utc::now()).await.unwrap();

    // The swept session was expired, so the customer can no longer pay it.
    assert!(h.provider.complete_payment(&created.session_id, None).is_none());
    let err = h
        .lifecycle
        .reconcile_payment_success(&created.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::PaymentNotCompleted(_)));
}

#[tokio::test]
async fn provider_is_usable_behind_dyn_bridge() {
    let provider = Arc::new(InMemoryCheckoutProvider::new());
    let bridge: Arc<dyn CheckoutBridge> = provider.clone();
    let store = InMemoryStore::new();
    store
        .upsert_product(&Product::new("P", "Widget", Money::from_cents(10), 1))
        .await
        .unwrap();

    let lifecycle = OrderLifecycle::new(store.clone(), bridge, LifecycleConfig::default());
    let created = lifecycle
        .create_order(&Actor::user(UserId::new()), vec![CartItem::new("P", 1)])
        .await
        .unwrap();

    assert_eq!(provider.session_for_order(created.order_id), Some(created.session_id));
    assert_eq!(store.stock_of(&"P".into()).await, Some(0));
}
