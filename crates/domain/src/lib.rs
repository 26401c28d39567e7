//! Domain layer for the storefront order workflow.
//!
//! This crate holds the pure, storage-agnostic rules:
//! - `Order` aggregate with its payment and fulfillment state machines
//! - Catalog `Product` with stock accounting
//! - Cart normalisation and price totals frozen at order creation
//!
//! Nothing here performs I/O; the `store` and `lifecycle` crates sequence
//! these rules inside transactions.

pub mod order;
pub mod product;
pub mod user;

pub use order::{
    CancellationOutcome, CartItem, FulfillmentStatus, LineItem, Money, Order, OrderError,
    OrderParts, OrderUpdate, PaymentStatus, ProductId, ShippingAddress, compute_total,
    normalize_cart,
};
pub use product::{Product, StockShortfall};
pub use user::User;
