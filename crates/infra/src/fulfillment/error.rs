use thiserror::Error;

use stockline_auth::AuthzError;
use stockline_core::DomainError;

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStoreError;

/// Error returned by every fulfillment operation.
///
/// Business variants mirror `DomainError`; the rest describe what happened to
/// the write so the caller knows whether a retry makes sense.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order number '{0}' already exists")]
    DuplicateOrderNumber(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient remaining quantity (remaining: {remaining}, requested: {requested})")]
    InsufficientRemainingQuantity { remaining: i64, requested: i64 },

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("release already delivered")]
    AlreadyDelivered,

    #[error("insufficient stock (available: {available}, requested: {requested})")]
    InsufficientStock { available: i64, requested: i64 },

    /// Lost the race against concurrent writers after the retry budget. Nothing
    /// was written; the identical request may be sent again.
    #[error("concurrent modification, retry the request: {0}")]
    RetryableConflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthzError),

    /// The store did not answer. The write may or may not have happened.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Corrupt stream or broken invariant in stored data.
    #[error("store failure: {0}")]
    Store(String),

    /// Committed, but projections or the bus did not receive it.
    #[error("committed but not propagated: {0}")]
    Publish(String),
}

impl FulfillmentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FulfillmentError::Validation(_) => "validation_error",
            FulfillmentError::DuplicateOrderNumber(_) => "duplicate_order_number",
            FulfillmentError::NotFound(_) => "not_found",
            FulfillmentError::InsufficientRemainingQuantity { .. } => "insufficient_remaining_quantity",
            FulfillmentError::InvalidStatusTransition { .. } => "invalid_status_transition",
            FulfillmentError::AlreadyDelivered => "already_delivered",
            FulfillmentError::InsufficientStock { .. } => "insufficient_stock",
            FulfillmentError::RetryableConflict(_) => "retryable_conflict",
            FulfillmentError::Unauthorized(_) => "unauthorized",
            FulfillmentError::Transient(_) => "transient",
            FulfillmentError::Store(_) => "store_error",
            FulfillmentError::Publish(_) => "publish_error",
        }
    }

    /// Rejected by a business rule or by the caller's input (no write happened).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FulfillmentError::Validation(_)
                | FulfillmentError::DuplicateOrderNumber(_)
                | FulfillmentError::NotFound(_)
                | FulfillmentError::InsufficientRemainingQuantity { .. }
                | FulfillmentError::InvalidStatusTransition { .. }
                | FulfillmentError::AlreadyDelivered
                | FulfillmentError::InsufficientStock { .. }
                | FulfillmentError::Unauthorized(_)
        )
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => FulfillmentError::Validation(msg),
            DomainError::DuplicateOrderNumber(n) => FulfillmentError::DuplicateOrderNumber(n),
            DomainError::NotFound(what) => FulfillmentError::NotFound(what),
            DomainError::InsufficientRemainingQuantity { remaining, requested } => {
                FulfillmentError::InsufficientRemainingQuantity { remaining, requested }
            }
            DomainError::InvalidStatusTransition { from, to } => {
                FulfillmentError::InvalidStatusTransition { from, to }
            }
            DomainError::AlreadyDelivered => FulfillmentError::AlreadyDelivered,
            DomainError::InsufficientStock { available, requested } => {
                FulfillmentError::InsufficientStock { available, requested }
            }
            DomainError::Conflict(msg) => FulfillmentError::RetryableConflict(msg),
            DomainError::Unauthorized => FulfillmentError::Store("domain reported unauthorized".to_string()),
            DomainError::InvariantViolation(msg) => FulfillmentError::Store(format!("invariant violated: {msg}")),
        }
    }
}

impl From<DispatchError> for FulfillmentError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => err.into(),
            DispatchError::Concurrency(msg) => FulfillmentError::RetryableConflict(msg),
            DispatchError::Deserialize(msg) => FulfillmentError::Store(msg),
            DispatchError::Store(EventStoreError::Unavailable(msg)) => FulfillmentError::Transient(msg),
            DispatchError::Store(err) => FulfillmentError::Store(err.to_string()),
            DispatchError::Publish(msg) => FulfillmentError::Publish(msg),
        }
    }
}
