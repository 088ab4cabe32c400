//! Inventory ledger operations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use stockline_auth::{Action, Actor};
use stockline_core::{Aggregate, DomainError};
use stockline_events::{EventBus, EventEnvelope};
use stockline_inventory::{
    Adjust, Deduct, InventoryCommand, InventoryEvent, InventoryItem, ItemId, Movement,
    MovementDirection, ReferenceType, RegisterItem, StockPolicy, StockStatus,
};

use super::registry::item_loader;
use super::{FulfillmentError, FulfillmentResult, FulfillmentService};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::external::DemandSeries;

/// Manual outbound movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductStock {
    pub item_id: ItemId,
    pub quantity: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

/// Manual correction in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_id: ItemId,
    pub direction: MovementDirection,
    pub quantity: i64,
    pub reason: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

/// Current stock figures for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub item_id: ItemId,
    pub name: String,
    pub available_stock: i64,
    /// Committed to PENDING releases.
    pub reserved_stock: i64,
    /// Committed to SHIPPED releases.
    pub in_transit_stock: i64,
    pub stock_status: StockStatus,
    pub policy: StockPolicy,
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Catalog hook: create an item's ledger at zero stock.
    #[instrument(skip(self, actor, name, policy))]
    pub fn register_item(
        &self,
        actor: &Actor,
        item_id: ItemId,
        name: &str,
        policy: StockPolicy,
    ) -> FulfillmentResult<StockBalance> {
        self.authorize(actor, Action::RegisterItem)?;

        let committed = self
            .dispatcher
            .dispatch(
                item_id.aggregate_id(),
                InventoryCommand::RegisterItem(RegisterItem {
                    item_id,
                    name: name.to_string(),
                    policy,
                    occurred_at: Utc::now(),
                }),
                item_loader,
            )
            .map_err(|err| self.rejected("register_item", err))?;

        info!(%item_id, name = committed.value.name(), "inventory item registered");
        Ok(self.balance_of(&committed.value))
    }

    /// Manual deduction. Release-driven deductions only happen on delivery.
    #[instrument(skip(self, actor, request), fields(item_id = %request.item_id, quantity = request.quantity))]
    pub fn deduct(&self, actor: &Actor, request: DeductStock) -> FulfillmentResult<Movement> {
        self.authorize(actor, Action::DeductStock)?;
        if request.reference_type == ReferenceType::Release {
            return Err(FulfillmentError::Validation(
                "release movements are recorded by delivery reconciliation only".to_string(),
            ));
        }

        let command = InventoryCommand::Deduct(Deduct {
            item_id: request.item_id,
            movement_id: Uuid::now_v7(),
            quantity: request.quantity,
            reference_type: request.reference_type,
            reference_id: request.reference_id,
            occurred_at: Utc::now(),
        });
        self.move_stock("deduct", request.item_id, command)
    }

    #[instrument(skip(self, actor, request), fields(item_id = %request.item_id, direction = %request.direction, quantity = request.quantity))]
    pub fn adjust(&self, actor: &Actor, request: AdjustStock) -> FulfillmentResult<Movement> {
        self.authorize(actor, Action::AdjustStock)?;

        let command = InventoryCommand::Adjust(Adjust {
            item_id: request.item_id,
            movement_id: Uuid::now_v7(),
            direction: request.direction,
            quantity: request.quantity,
            reason: request.reason,
            reference_type: request.reference_type,
            reference_id: request.reference_id,
            occurred_at: Utc::now(),
        });
        self.move_stock("adjust", request.item_id, command)
    }

    fn move_stock(
        &self,
        operation: &'static str,
        item_id: ItemId,
        command: InventoryCommand,
    ) -> FulfillmentResult<Movement> {
        let committed = self
            .dispatcher
            .transact(|uow| {
                let mut item = uow.load(item_id.aggregate_id(), item_loader)?;
                let events = uow.execute(item_id.aggregate_id(), &mut item, &command)?;
                events
                    .iter()
                    .find_map(InventoryEvent::movement)
                    .ok_or_else(|| DispatchError::Domain(DomainError::invariant("no movement recorded")))
            })
            .map_err(|err| self.rejected(operation, err))?;

        let movement = committed.value;
        info!(
            %item_id,
            movement_id = %movement.id,
            direction = %movement.direction,
            quantity = movement.quantity,
            balance_after = movement.balance_after,
            "stock moved"
        );
        Ok(movement)
    }

    pub fn get_balance(&self, item_id: ItemId) -> FulfillmentResult<StockBalance> {
        let item = self.dispatcher.load(item_id.aggregate_id(), item_loader)?;
        if !item.is_registered() {
            return Err(FulfillmentError::NotFound("inventory item"));
        }
        Ok(self.balance_of(&item))
    }

    /// Ledger entries in commit order.
    ///
    /// For one item this reads the item's own stream, which is authoritative.
    /// Without a filter it reads the store-wide movement log.
    pub fn list_movements(&self, item_id: Option<ItemId>) -> FulfillmentResult<Vec<Movement>> {
        match item_id {
            Some(item_id) => self.item_ledger(item_id).map(|(_, movements)| movements),
            None => Ok(self.read_models.movements.list(None)),
        }
    }

    /// Daily OUT quantities for the forecast collaborator.
    pub fn demand_history(&self, item_id: ItemId) -> FulfillmentResult<DemandSeries> {
        let (_, movements) = self.item_ledger(item_id)?;
        Ok(DemandSeries::from_movements(item_id, &movements))
    }

    /// Rehydrate an item and collect its movements from one stream read.
    pub(super) fn item_ledger(&self, item_id: ItemId) -> FulfillmentResult<(InventoryItem, Vec<Movement>)> {
        let stream = self
            .dispatcher
            .store()
            .load_stream(item_id.aggregate_id())
            .map_err(DispatchError::from)?;

        let mut item = InventoryItem::empty(item_id);
        let mut movements = Vec::new();
        for stored in &stream {
            let event: InventoryEvent = serde_json::from_value(stored.payload.clone()).map_err(|e| {
                FulfillmentError::Store(format!("{} #{}: {e}", stored.event_type, stored.sequence_number))
            })?;
            movements.extend(event.movement());
            item.apply(&event);
        }

        if !item.is_registered() {
            return Err(FulfillmentError::NotFound("inventory item"));
        }
        Ok((item, movements))
    }

    fn balance_of(&self, item: &InventoryItem) -> StockBalance {
        let position = self.read_models.releases.position(&item.id_typed());
        StockBalance {
            item_id: item.id_typed(),
            name: item.name().to_string(),
            available_stock: item.available_stock(),
            reserved_stock: position.reserved,
            in_transit_stock: position.in_transit,
            stock_status: item.stock_status(),
            policy: item.policy(),
        }
    }
}
