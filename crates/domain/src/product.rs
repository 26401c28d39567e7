//! Catalog product with its authoritative stock count.

use serde::{Deserialize, Serialize};

use crate::order::{Money, ProductId};

/// A catalog product.
///
/// Catalog CRUD lives elsewhere; the order workflow only reads `price` and
/// moves `stock`, which never drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    stock: i64,
}

/// A debit that would take stock below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockShortfall {
    pub requested: u32,
    pub available: i64,
}

impl Product {
    /// Creates a product; negative stock is clamped to zero.
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            stock: stock.max(0),
        }
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn has_stock_for(&self, quantity: u32) -> bool {
        i64::from(quantity) <= self.stock
    }

    /// Takes `quantity` units out of stock.
    pub fn debit(&mut self, quantity: u32) -> Result<(), StockShortfall> {
        if !self.has_stock_for(quantity) {
            return Err(StockShortfall {
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= i64::from(quantity);
        Ok(())
    }

    /// Puts `quantity` units back into stock, saturating at `i64::MAX`.
    pub fn credit(&mut self, quantity: u64) {
        let quantity = i64::try_from(quantity).unwrap_or(i64::MAX);
        self.stock = self.stock.saturating_add(quantity);
    }
}
