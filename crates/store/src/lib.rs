//! Storage layer for the order workflow.
//!
//! - [`Store`] / [`StoreTx`]: session-scoped transactions over orders, products and users
//! - [`InMemoryStore`] and [`PostgresStore`] backends with the same isolation guarantees
//! - [`ledger`]: stock reservation and release, always run inside a transaction

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use ledger::{LedgerError, ReleaseSummary};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use query::OrderQuery;
pub use store::{Store, StoreTx};
