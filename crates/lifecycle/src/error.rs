//! Lifecycle error types.

use std::time::Duration;

use checkout::CheckoutError;
use common::{ErrorKind, OrderId};
use domain::OrderError;
use store::{LedgerError, StoreError};
use thiserror::Error;

/// Errors that can occur while driving an order through its lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Checkout session not found: {0}")]
    SessionNotFound(String),

    /// Success was reported for a session the provider says is unpaid.
    #[error("Checkout session {0} has not been paid")]
    PaymentNotCompleted(String),

    /// A cancel was reported for a session that was paid; the order must be
    /// cancelled (and refunded) through the order cancel path instead.
    #[error("Checkout session {0} is already paid; cancel the order instead")]
    SessionAlreadyPaid(String),

    #[error("Checkout session {0} carries no order reference")]
    UncorrelatedSession(String),

    #[error("Checkout provider did not answer within {0:?}")]
    CheckoutTimeout(Duration),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::OrderNotFound(_) | LifecycleError::SessionNotFound(_) => {
                ErrorKind::NotFound
            }
            LifecycleError::PaymentNotCompleted(_) | LifecycleError::SessionAlreadyPaid(_) => {
                ErrorKind::Conflict
            }
            LifecycleError::UncorrelatedSession(_) | LifecycleError::CheckoutTimeout(_) => {
                ErrorKind::UpstreamFailure
            }
            LifecycleError::Order(e) => e.kind(),
            LifecycleError::Ledger(e) => e.kind(),
            LifecycleError::Store(e) => e.kind(),
            LifecycleError::Checkout(e) => e.kind(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            LifecycleError::Checkout(e) => e.is_retryable(),
            LifecycleError::CheckoutTimeout(_) => true,
            _ => false,
        }
    }
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use domain::ProductId;

    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            LifecycleError::OrderNotFound(OrderId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LifecycleError::SessionAlreadyPaid("cs".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            LifecycleError::CheckoutTimeout(Duration::from_secs(1)).kind(),
            ErrorKind::UpstreamFailure
        );
        assert_eq!(
            LifecycleError::from(LedgerError::ProductNotFound(ProductId::new("P"))).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LifecycleError::from(OrderError::EmptyCart).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn only_upstream_failures_are_retryable() {
        assert!(LifecycleError::CheckoutTimeout(Duration::from_secs(1)).is_retryable());
        assert!(LifecycleError::from(CheckoutError::Timeout).is_retryable());
        assert!(!LifecycleError::SessionNotFound("cs".into()).is_retryable());
    }
}
