//! Step names used in lifecycle logs.

/// Step name: lock products, check and debit stock.
pub const STEP_RESERVE_STOCK: &str = "reserve_stock";

/// Step name: insert the pending order.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// Step name: open the hosted checkout session.
pub const STEP_OPEN_CHECKOUT: &str = "open_checkout";

/// Step name: commit the reservation and the order.
pub const STEP_COMMIT: &str = "commit";

/// Compensation: expire a session whose order no longer exists.
pub const STEP_EXPIRE_SESSION: &str = "expire_session";
