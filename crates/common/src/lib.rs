//! Shared types used across the storefront order workflow crates.

pub mod actor;
pub mod error;
pub mod types;

pub use actor::{Actor, Role};
pub use error::ErrorKind;
pub use types::{OrderId, UserId};
