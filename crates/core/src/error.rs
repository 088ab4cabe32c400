//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// One variant per business failure class. Infrastructure concerns (storage
/// outages, serialization) belong to the infra layer's error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input failed validation before any state was consulted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An order number is already claimed by another blanket order.
    #[error("order number '{0}' already exists")]
    DuplicateOrderNumber(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A release asked for more than the line has left to commit.
    #[error("insufficient remaining quantity (remaining: {remaining}, requested: {requested})")]
    InsufficientRemainingQuantity { remaining: i64, requested: i64 },

    /// The requested lifecycle transition is not allowed from the current state.
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// The release is already delivered; its deduction must never repeat.
    #[error("release already delivered")]
    AlreadyDelivered,

    /// Available stock cannot cover the requested outbound quantity.
    #[error("insufficient stock (available: {available}, requested: {requested})")]
    InsufficientStock { available: i64, requested: i64 },

    /// A concurrent writer won the race; the identical request may be retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The actor is not allowed to perform the action.
    #[error("unauthorized")]
    Unauthorized,

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A domain invariant was violated (indicates corrupt or foreign input).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
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

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: &'static str) -> Self {
        Self::NotFound(what)
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Only optimistic-concurrency conflicts are worth an identical retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
