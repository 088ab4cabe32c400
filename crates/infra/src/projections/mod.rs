//! Projection implementations (read model builders).
//!
//! Projections consume committed events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from the event log
//! - **Idempotent**: envelopes at or below a stream's cursor are ignored
//! - **Derived only**: no read model value is ever taken from client input

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockline_core::AggregateId;
use stockline_events::EventEnvelope;

use crate::event_store::{EventStore, EventStoreError};

pub mod available_lines;
pub mod movement_log;
pub mod read_models;
pub mod release_tracking;

pub use available_lines::{AvailableLinesProjection, LineView};
pub use movement_log::MovementLogProjection;
pub use read_models::FulfillmentReadModels;
pub use release_tracking::{PositionTally, ReleaseTrackingProjection, ReleaseView, StockPosition};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize {event_type}: {message}")]
    Deserialize { event_type: String, message: String },

    #[error("non-monotonic sequence number on {aggregate_id} (last={last}, found={found})")]
    NonMonotonicSequence {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("projection state lock poisoned")]
    Poisoned,
}

/// Something that follows the event log and must be current after each commit.
pub trait Projector: Send + Sync {
    fn catch_up(&self, store: &dyn EventStore) -> Result<(), ProjectionError>;
}

/// Per-stream cursors for at-least-once delivery.
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: Mutex<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    /// `Ok(true)` if the envelope is next in its stream and should be applied,
    /// `Ok(false)` for a duplicate.
    pub(crate) fn admit(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let cursors = self.inner.lock().map_err(|_| ProjectionError::Poisoned)?;
        let aggregate_id = envelope.aggregate_id();
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);
        let found = envelope.sequence_number();

        if found <= last {
            return Ok(false);
        }
        if found != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                aggregate_id,
                last,
                found,
            });
        }
        Ok(true)
    }

    /// Record a successful apply.
    pub(crate) fn advance(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let mut cursors = self.inner.lock().map_err(|_| ProjectionError::Poisoned)?;
        cursors.insert(envelope.aggregate_id(), envelope.sequence_number());
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<(), ProjectionError> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.inner.clear_poison();
        Ok(())
    }
}

pub(crate) fn decode<E: DeserializeOwned>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        event_type: envelope.event_type().to_string(),
        message: e.to_string(),
    })
}
