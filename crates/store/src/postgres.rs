use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{
    LineItem, Money, Order, OrderParts, Product, ProductId, ShippingAddress, User,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderQuery, Result, Store, StoreError, StoreTx};

const ORDER_COLUMNS: &str = "id, user_id, items, total_cents, payment_status, fulfillment_status, \
     payment_id, checkout_session_id, shipping_address, updates, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let items_json: serde_json::Value = row.try_get("items")?;
    let items: Vec<LineItem> = serde_json::from_value(items_json)?;

    let address_json: Option<serde_json::Value> = row.try_get("shipping_address")?;
    let shipping_address: Option<ShippingAddress> =
        address_json.map(serde_json::from_value).transpose()?;

    let payment_status: String = row.try_get("payment_status")?;
    let fulfillment_status: String = row.try_get("fulfillment_status")?;

    Ok(Order::from_parts(OrderParts {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        items,
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        payment_status: payment_status.parse().map_err(StoreError::Corrupt)?,
        fulfillment_status: fulfillment_status.parse().map_err(StoreError::Corrupt)?,
        payment_id: row.try_get("payment_id")?,
        checkout_session_id: row.try_get("checkout_session_id")?,
        shipping_address,
        updates: row.try_get("updates")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("name")?,
        Money::from_cents(row.try_get("price_cents")?),
        row.try_get("stock")?,
    ))
}

fn row_to_user(row: PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: role.parse().map_err(StoreError::Corrupt)?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_write_error(e: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateKey(what());
        }
        if db_err.is_check_violation() {
            return StoreError::Aborted(db_err.message().to_string());
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.payment_status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payment_status = ${param_count}"));
        }
        if query.updated_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND updated_at < ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_uuid());
        }
        if let Some(status) = query.payment_status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(cutoff) = query.updated_before {
            sqlx_query = sqlx_query.bind(cutoff);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, price_cents, stock FROM products WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_product).transpose()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, price_cents = EXCLUDED.price_cents, stock = EXCLUDED.stock
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, role, created_at FROM users WHERE email = $1")
            .bind(email.trim().to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_user).transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, || format!("users.email = {}", user.email)))?;

        Ok(())
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Locked reads use `SELECT ... FOR UPDATE`; the row locks are held until the
/// transaction ends. Dropping the handle rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn get_product_for_update(&mut self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn update_stock(&mut self, id: &ProductId, stock: i64) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(stock)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error(e, || format!("products.id = {id}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Aborted(format!("product {id} does not exist")));
        }
        Ok(())
    }

    async fn get_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let items_json = serde_json::to_value(order.items())?;
        let address_json = order
            .shipping_address()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(items_json)
        .bind(order.total_amount().cents())
        .bind(order.payment_status().as_str())
        .bind(order.fulfillment_status().as_str())
        .bind(order.payment_id())
        .bind(order.checkout_session_id())
        .bind(address_json)
        .bind(order.updates())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, || format!("orders.id = {}", order.id())))?;

        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let address_json = order
            .shipping_address()
            .map(serde_json::to_value)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2,
                fulfillment_status = $3,
                payment_id = $4,
                checkout_session_id = $5,
                shipping_address = $6,
                updates = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.payment_status().as_str())
        .bind(order.fulfillment_status().as_str())
        .bind(order.payment_id())
        .bind(order.checkout_session_id())
        .bind(address_json)
        .bind(order.updates())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Aborted(format!(
                "order {} does not exist",
                order.id()
            )));
        }
        Ok(())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
