//! `kasaku-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the inventory,
//! manufacturing and accounting modules (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod patch;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
pub use value_object::ValueObject;
