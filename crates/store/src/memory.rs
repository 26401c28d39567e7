use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Order, Product, ProductId, User};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{OrderQuery, Result, Store, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    users: HashMap<UserId, User>,
}

/// In-memory store for tests and single-process deployments.
///
/// A transaction holds the store lock for its whole lifetime and works on a
/// private copy of the state, which replaces the live state on commit. This
/// gives serializable isolation: nothing a transaction does is observable
/// until it commits, and dropping it rolls everything back.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction commit fail.
    pub fn set_fail_next_commit(&self, fail: bool) {
        self.fail_next_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the committed stock count of a product.
    pub async fn stock_of(&self, id: &ProductId) -> Option<i64> {
        self.state.lock().await.products.get(id).map(Product::stock)
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx {
            guard,
            working,
            fail_commit: self.fail_next_commit.clone(),
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| query.matches(order))
            .cloned()
            .collect();
        orders.sort_by_key(|order| (order.created_at(), order.id()));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_ascii_lowercase();
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateKey(format!("users.email = {}", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_product_for_update(&mut self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(id).cloned())
    }

    async fn update_stock(&mut self, id: &ProductId, stock: i64) -> Result<()> {
        if stock < 0 {
            return Err(StoreError::Aborted(format!(
                "stock of {id} would become negative ({stock})"
            )));
        }
        let product = self
            .working
            .products
            .get_mut(id)
            .ok_or_else(|| StoreError::Aborted(format!("product {id} does not exist")))?;
        *product = Product::new(product.id.clone(), product.name.clone(), product.price, stock);
        Ok(())
    }

    async fn get_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateKey(format!("orders.id = {}", order.id())));
        }
        self.working.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        match self.working.orders.get_mut(&order.id()) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(StoreError::Aborted(format!(
                "order {} does not exist",
                order.id()
            ))),
        }
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool> {
        Ok(self.working.orders.remove(&id).is_some())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx {
            mut guard,
            working,
            fail_commit,
        } = self;

        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Aborted("injected commit failure".to_string()));
        }
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::Role;
    use domain::{LineItem, Money};

    use super::*;

    fn widget(stock: i64) -> Product {
        Product::new("SKU-001", "Widget", Money::from_cents(1000), stock)
    }

    fn order() -> Order {
        Order::create(
            UserId::new(),
            vec![LineItem::new("SKU-001", "Widget", 1, Money::from_cents(1000))],
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn committed_changes_become_visible() {
        let store = InMemoryStore::new();
        store.upsert_product(&widget(5)).await.unwrap();
        let order = order();

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(&"SKU-001".into(), 4).await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.stock_of(&"SKU-001".into()).await, Some(4));
        assert_eq!(store.get_order(order.id()).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        store.upsert_product(&widget(5)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.update_stock(&"SKU-001".into(), 0).await.unwrap();
            tx.insert_order(&order()).await.unwrap();
        }

        assert_eq!(store.stock_of(&"SKU-001".into()).await, Some(5));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn explicit_rollback_discards_changes() {
        let store = InMemoryStore::new();
        store.upsert_product(&widget(5)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(&"SKU-001".into(), 1).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.stock_of(&"SKU-001".into()).await, Some(5));
    }

    #[tokio::test]
    async fn injected_commit_failure_discards_changes_once() {
        let store = InMemoryStore::new();
        store.upsert_product(&widget(5)).await.unwrap();
        store.set_fail_next_commit(true);

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(&"SKU-001".into(), 1).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(store.stock_of(&"SKU-001".into()).await, Some(5));

        let mut tx = store.begin().await.unwrap();
        tx.update_stock(&"SKU-001".into(), 1).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.stock_of(&"SKU-001".into()).await, Some(1));
    }

    #[tokio::test]
    async fn negative_stock_is_refused() {
        let store = InMemoryStore::new();
        store.upsert_product(&widget(1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = tx.update_stock(&"SKU-001".into(), -1).await;
        assert!(matches!(result, Err(StoreError::Aborted(_))));
    }

    #[tokio::test]
    async fn delete_reports_missing_orders() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(!tx.delete_order(OrderId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn query_orders_filters_and_pages() {
        let store = InMemoryStore::new();
        let user = UserId::new();

        let mut tx = store.begin().await.unwrap();
        for _ in 0..3 {
            let order = Order::create(
                user,
                vec![LineItem::new("SKU-001", "Widget", 1, Money::from_cents(1))],
                Utc::now(),
            )
            .unwrap();
            tx.insert_order(&order).await.unwrap();
        }
        tx.insert_order(&order()).await.unwrap();
        tx.commit().await.unwrap();

        let mine = store.query_orders(OrderQuery::for_user(user)).await.unwrap();
        assert_eq!(mine.len(), 3);
        let page = store
            .query_orders(OrderQuery::new().offset(1).limit(2))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn users_are_unique_by_email() {
        let store = InMemoryStore::new();
        let admin = User::new("Admin", "admin@example.com", Role::Admin);
        store.insert_user(&admin).await.unwrap();

        let found = store
            .find_user_by_email("ADMIN@example.com")
            .await
            .unwrap();
        assert_eq!(found, Some(admin));

        let dup = User::new("Other", "admin@example.com", Role::User);
        assert!(matches!(
            store.insert_user(&dup).await,
            Err(StoreError::DuplicateKey(_))
        ));
    }
}
