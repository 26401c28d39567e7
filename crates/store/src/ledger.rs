//! Inventory ledger: stock reservation and release.
//!
//! Both operations run inside a caller-owned transaction so that stock moves
//! commit or roll back together with the order they belong to.

use std::collections::BTreeMap;

use common::ErrorKind;
use domain::{CartItem, LineItem, Product, ProductId};
use thiserror::Error;

use crate::{StoreError, StoreTx};

/// Errors raised while reserving or releasing stock.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ProductNotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientStock { .. } => ErrorKind::Conflict,
            LedgerError::Store(e) => e.kind(),
        }
    }
}

/// What a [`release`] actually put back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Units credited back to existing products.
    pub credited: u64,
    /// Products that no longer exist in the catalog; skipped.
    pub missing: Vec<ProductId>,
}

/// Locks every product in the cart, checks availability, and debits stock.
///
/// The cart must already be normalised (no duplicate products, no zero
/// quantities). Products are locked in id order so two concurrent
/// reservations over overlapping carts cannot deadlock. Validation happens in
/// cart order and fails on the first problem; nothing is debited unless every
/// line can be fulfilled.
///
/// Returns the priced line items in cart order.
pub async fn check_and_reserve<T>(
    tx: &mut T,
    cart: &[CartItem],
) -> Result<Vec<LineItem>, LedgerError>
where
    T: StoreTx + ?Sized,
{
    let mut ids: Vec<&ProductId> = cart.iter().map(|item| &item.product_id).collect();
    ids.sort();
    ids.dedup();

    let mut locked: BTreeMap<ProductId, Option<Product>> = BTreeMap::new();
    for id in ids {
        let product = tx.get_product_for_update(id).await?;
        locked.insert(id.clone(), product);
    }

    let mut lines = Vec::with_capacity(cart.len());
    for item in cart {
        let product = locked
            .get_mut(&item.product_id)
            .and_then(Option::as_mut)
            .ok_or_else(|| LedgerError::ProductNotFound(item.product_id.clone()))?;

        product
            .debit(item.quantity)
            .map_err(|shortfall| LedgerError::InsufficientStock {
                product_id: item.product_id.clone(),
                requested: shortfall.requested,
                available: shortfall.available,
            })?;

        lines.push(LineItem::new(
            product.id.clone(),
            product.name.clone(),
            item.quantity,
            product.price,
        ));
    }

    for product in locked.values().flatten() {
        tx.update_stock(&product.id, product.stock()).await?;
    }

    let units: u64 = lines.iter().map(|line| u64::from(line.quantity)).sum();
    metrics::counter!("stock_reserved_units_total").increment(units);
    tracing::debug!(lines = lines.len(), units, "Stock reserved");
    Ok(lines)
}

/// Credits the quantities of `items` back to stock.
///
/// Products that have since been removed from the catalog are skipped with a
/// warning rather than failing the release.
pub async fn release<T>(tx: &mut T, items: &[LineItem]) -> Result<ReleaseSummary, LedgerError>
where
    T: StoreTx + ?Sized,
{
    let mut quantities: BTreeMap<&ProductId, u64> = BTreeMap::new();
    for item in items {
        *quantities.entry(&item.product_id).or_default() += u64::from(item.quantity);
    }

    let mut summary = ReleaseSummary::default();
    for (id, quantity) in quantities {
        let Some(mut product) = tx.get_product_for_update(id).await? else {
            tracing::warn!(product_id = %id, quantity, "Released stock for missing product");
            summary.missing.push(id.clone());
            continue;
        };

        product.credit(quantity);
        tx.update_stock(id, product.stock()).await?;
        summary.credited += quantity;
    }

    metrics::counter!("stock_released_units_total").increment(summary.credited);
    Ok(summary)
}
