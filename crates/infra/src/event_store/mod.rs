//! Append-only event store boundary.
//!
//! Consulted services and payment vouchers are both kept as event streams;
//! current state is rebuilt by replaying a stream through the aggregate's
//! `apply`.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
