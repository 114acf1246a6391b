//! Transactional storage for carts, stock, coupons, orders, payments,
//! invoices and the transaction log.
//!
//! [`Store`] serves committed reads and opens transactions; [`StoreTx`]
//! carries row locks and staged writes until [`StoreTx::commit`]. Dropping a
//! transaction without committing rolls it back.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError, constraints};
pub use memory::{InMemoryStore, InMemoryTx, RowCounts};
pub use postgres::{PostgresStore, PostgresTx};
pub use store::{OrderFilter, Store, StoreTx};
