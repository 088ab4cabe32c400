//! Append-only event store boundary.
//!
//! An infrastructure-facing abstraction for storing and loading aggregate event
//! streams without making storage assumptions. A commit may span several streams
//! and is all-or-nothing; this is the transaction boundary of every mutating
//! fulfillment operation.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
