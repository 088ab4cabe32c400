use std::sync::{PoisonError, RwLock};

use serde_json::Value as JsonValue;

use stockline_core::Aggregate;
use stockline_events::EventEnvelope;
use stockline_inventory::{InventoryEvent, InventoryItem, ItemId, Movement};

use super::{ProjectionError, StreamCursors, decode};

/// Store-wide movement log in commit order.
///
/// Each item's stream is already its own ledger; this projection interleaves
/// them by global position for cross-item listings and demand exports.
#[derive(Debug, Default)]
pub struct MovementLogProjection {
    log: RwLock<Vec<Movement>>,
    cursors: StreamCursors,
}

impl MovementLogProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Movements in commit order, optionally for one item.
    pub fn list(&self, item_id: Option<ItemId>) -> Vec<Movement> {
        let Ok(log) = self.log.read() else {
            return vec![];
        };
        log.iter()
            .filter(|m| item_id.is_none_or(|id| m.item_id == id))
            .cloned()
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != InventoryItem::AGGREGATE_TYPE {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }

        if let Some(movement) = decode::<InventoryEvent>(envelope)?.movement() {
            self.log.write().map_err(|_| ProjectionError::Poisoned)?.push(movement);
        }

        self.cursors.advance(envelope)
    }

    pub fn clear(&self) -> Result<(), ProjectionError> {
        self.log.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.log.clear_poison();
        self.cursors.clear()
    }
}
