//! Order lifecycle orchestration.
//!
//! [`OrderLifecycle`] ties the inventory ledger, the order aggregate and the
//! checkout bridge together:
//! 1. Reserve stock and persist the pending order
//! 2. Open a checkout session for it
//! 3. Commit, or roll the reservation back if the session could not be opened
//!
//! Payment outcomes are later reconciled into the order and the ledger, and
//! [`ExpirySweeper`] releases reservations nobody ever paid for.

pub mod error;
pub mod orchestrator;
pub mod state;
pub mod steps;
pub mod sweeper;

pub use error::{LifecycleError, Result};
pub use orchestrator::{
    CancellationResult, CheckoutCancellation, CreatedOrder, LifecycleConfig, OrderLifecycle,
    PaymentConfirmation, SweepReport,
};
pub use state::LifecycleState;
pub use sweeper::ExpirySweeper;
