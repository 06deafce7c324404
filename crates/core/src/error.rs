//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. Each variant carries enough context
/// for the caller to act on it (which material, which orders, which lines
/// are short). Mapping to transport status codes happens outside the domain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or invalid input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The entity, or something it references, does not exist for this owner.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is blocked by other records (e.g. delete while referenced).
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        references: Vec<String>,
    },

    /// Not enough stock; `details` is the per-line shortage report.
    #[error("insufficient stock: {message}")]
    InsufficientStock {
        message: String,
        details: Vec<String>,
    },

    /// Illegal status change.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            references: Vec::new(),
        }
    }

    pub fn conflict_with<I, S>(msg: impl Into<String>, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self::Conflict {
            message: msg.into(),
            references: references.into_iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn insufficient_stock(msg: impl Into<String>, details: Vec<String>) -> Self {
        Self::InsufficientStock {
            message: msg.into(),
            details,
        }
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Machine-usable detail list: the shortage report or the conflicting ids.
    pub fn details(&self) -> &[String] {
        match self {
            Self::Conflict { references, .. } => references,
            Self::InsufficientStock { details, .. } => details,
            _ => &[],
        }
    }
}
