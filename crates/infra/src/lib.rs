//! Infrastructure and application layer: event store, command pipeline,
//! read models and the manufacturing services built on them.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod tenant_locks;

pub use config::ManufacturingConfig;
pub use services::{ErrorKind, InMemoryManufacturingService, ManufacturingService, ServiceError};

#[cfg(test)]
mod integration_tests;
