use async_trait::async_trait;
use common::OrderId;
use domain::{Order, Product, ProductId, User};

use crate::{OrderQuery, Result};

/// Core trait for storage backends.
///
/// Reads outside a transaction see only committed state. Every multi-step
/// mutation of orders and stock goes through [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Transaction handle produced by [`Store::begin`].
    type Tx: StoreTx;

    /// Opens a transaction.
    ///
    /// Dropping the handle without calling [`StoreTx::commit`] discards every
    /// change made through it.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Loads a committed order.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists committed orders matching a query, oldest first.
    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Loads a catalog product.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a catalog product.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// Looks up a user by (normalised) email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Inserts a user; fails with `DuplicateKey` if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;
}

/// An open transaction.
///
/// Rows read with the `*_for_update` methods stay locked until commit or
/// rollback, so concurrent transactions touching the same order or product
/// are serialized.
#[async_trait]
pub trait StoreTx: Send {
    /// Loads and locks a product.
    async fn get_product_for_update(&mut self, id: &ProductId) -> Result<Option<Product>>;

    /// Writes a product's stock count.
    async fn update_stock(&mut self, id: &ProductId, stock: i64) -> Result<()>;

    /// Loads and locks an order.
    async fn get_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Deletes an order; returns false if it did not exist.
    async fn delete_order(&mut self, id: OrderId) -> Result<bool>;

    /// Makes every change visible atomically.
    async fn commit(self) -> Result<()>;

    /// Discards every change.
    async fn rollback(self) -> Result<()>;
}
