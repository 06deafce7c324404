//! Append-only event store boundary.
//!
//! Tenant-scoped event streams without storage assumptions. The store is the
//! source of truth; read models and bus subscribers are derived from it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
