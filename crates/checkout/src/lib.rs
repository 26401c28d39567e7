//! Checkout session bridge.
//!
//! Opens hosted payment sessions bound to an order and later reports what
//! happened to them. The bridge never touches orders or stock itself; it only
//! returns facts for the lifecycle orchestrator to apply.

pub mod bridge;
pub mod error;
pub mod memory;
pub mod stripe;

pub use bridge::{CheckoutBridge, CheckoutLine, CheckoutSession, RedirectTargets, SessionResolution};
pub use error::{CheckoutError, Result};
pub use memory::InMemoryCheckoutProvider;
pub use stripe::{CheckoutConfig, StripeCheckout};
