//! Cart normalisation and order totals.

use super::{CartItem, LineItem, Money, OrderError};

/// Validates a submitted cart and merges duplicate product references.
///
/// The first occurrence of a product fixes its position in the result.
pub fn normalize_cart(items: Vec<CartItem>) -> Result<Vec<CartItem>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    let mut merged: Vec<CartItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: 0,
            });
        }

        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(item.quantity).ok_or(
                    OrderError::InvalidQuantity {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    },
                )?;
            }
            None => merged.push(item),
        }
    }

    Ok(merged)
}

/// Sum of quantity * unit price over the given lines.
///
/// Fails with `TotalOverflow` when a line or the sum does not fit in cents.
pub fn compute_total(items: &[LineItem]) -> Result<Money, OrderError> {
    items
        .iter()
        .try_fold(Money::zero(), |acc, item| {
            item.total_price().and_then(|line| acc.checked_add(line))
        })
        .ok_or(OrderError::TotalOverflow)
}
