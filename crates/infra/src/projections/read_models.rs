use std::sync::{Mutex, PoisonError};

use stockline_inventory::ItemId;
use stockline_orders::{OrderLineId, ReleaseId};

use super::{
    AvailableLinesProjection, LineView, MovementLogProjection, ProjectionError, Projector,
    PositionTally, ReleaseTrackingProjection, ReleaseView,
};
use crate::event_store::EventStore;
use crate::read_model::InMemoryReadStore;

/// All fulfillment read models, fed from the global log in commit order.
#[derive(Debug, Default)]
pub struct FulfillmentReadModels {
    /// Last applied global position. Held for the whole catch-up so envelopes
    /// are applied exactly once and in order.
    position: Mutex<u64>,
    pub lines: AvailableLinesProjection<InMemoryReadStore<OrderLineId, LineView>>,
    pub releases: ReleaseTrackingProjection<
        InMemoryReadStore<ReleaseId, ReleaseView>,
        InMemoryReadStore<ItemId, PositionTally>,
    >,
    pub movements: MovementLogProjection,
}

impl FulfillmentReadModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.position.lock().map(|p| *p).unwrap_or(0)
    }

    /// Drop every read model and replay the whole log.
    pub fn rebuild(&self, store: &dyn EventStore) -> Result<(), ProjectionError> {
        {
            let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
            self.reset(&mut position)?;
            self.position.clear_poison();
        }
        self.catch_up(store)
    }

    fn reset(&self, position: &mut u64) -> Result<(), ProjectionError> {
        self.lines.clear()?;
        self.releases.clear()?;
        self.movements.clear()?;
        *position = 0;
        Ok(())
    }
}

impl Projector for FulfillmentReadModels {
    fn catch_up(&self, store: &dyn EventStore) -> Result<(), ProjectionError> {
        // A catch-up that died part way left the models in an unknown state.
        let mut position = match self.position.lock() {
            Ok(position) => position,
            Err(poisoned) => {
                tracing::warn!("read model catch-up was interrupted; rebuilding from the log");
                let mut position = poisoned.into_inner();
                self.reset(&mut position)?;
                self.position.clear_poison();
                position
            }
        };

        for stored in store.load_since(*position)? {
            let envelope = stored.to_envelope();
            self.lines.apply_envelope(&envelope)?;
            self.releases.apply_envelope(&envelope)?;
            self.movements.apply_envelope(&envelope)?;
            *position = stored.global_position;
        }

        Ok(())
    }
}
