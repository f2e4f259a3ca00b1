//! Read models built from the change feed.
//!
//! Projections are rebuildable: drop one and replay the feed (or
//! `EventStore::read_all(0)`) to get it back.

pub mod customer_balance;

pub use customer_balance::{CustomerBalance, CustomerBalanceProjection};
