//! Transport-independent service errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kasaku_core::DomainError;

use crate::command_dispatcher::DispatchError;

/// Coarse error category; an API layer maps these to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientStock,
    InvalidTransition,
    Unauthorized,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Another write of the same records won the race; the caller may retry.
    #[error("records changed concurrently: {0}")]
    Concurrency(String),

    /// Unexpected infrastructure failure; the message is for logs, not users.
    #[error("internal error")]
    Internal(String),
}

impl ServiceError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(e) => match e {
                DomainError::Validation(_)
                | DomainError::InvariantViolation(_)
                | DomainError::InvalidId(_) => ErrorKind::Validation,
                DomainError::NotFound(_) => ErrorKind::NotFound,
                DomainError::Conflict { .. } => ErrorKind::Conflict,
                DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
                DomainError::Unauthorized => ErrorKind::Unauthorized,
            },
            ServiceError::Concurrency(_) => ErrorKind::Conflict,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shortage report or conflicting ids; empty for other errors.
    pub fn details(&self) -> &[String] {
        match self {
            ServiceError::Domain(e) => e.details(),
            _ => &[],
        }
    }

    /// Caller-facing message. Internal failures stay opaque.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<DispatchError> for ServiceError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Domain(e) => ServiceError::Domain(e),
            DispatchError::Concurrency(msg) => {
                tracing::warn!(%msg, "write rejected by optimistic concurrency check");
                ServiceError::Concurrency(msg)
            }
            other => {
                tracing::error!(error = %other, "command dispatch failed");
                ServiceError::Internal(other.to_string())
            }
        }
    }
}
