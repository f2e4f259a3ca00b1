//! Change-feed primitives: domain events, envelopes, pub/sub and projections.
//!
//! Committed changes to consulted services and payment vouchers are published
//! here for downstream readers (reporting, treatment log). Nothing in this
//! crate performs IO.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
