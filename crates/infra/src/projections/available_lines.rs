use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockline_core::Aggregate;
use stockline_events::EventEnvelope;
use stockline_inventory::ItemId;
use stockline_orders::{
    BlanketOrder, BlanketOrderEvent, BlanketOrderId, BlanketOrderStatus, OrderLine, OrderLineEvent,
    OrderLineId,
};

use super::{ProjectionError, StreamCursors, decode};
use crate::read_model::ReadStore;

/// Queryable order line with its order's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineView {
    pub line_id: OrderLineId,
    pub order_id: BlanketOrderId,
    pub order_number: String,
    pub line_no: u32,
    pub item_id: ItemId,
    pub total_quantity: i64,
    pub released_quantity: i64,
    pub delivered_quantity: i64,
    pub remaining_quantity: i64,
    pub order_status: BlanketOrderStatus,
}

impl LineView {
    /// A line can take a new release.
    pub fn is_available(&self) -> bool {
        self.remaining_quantity > 0 && self.order_status == BlanketOrderStatus::Active
    }
}

/// Line board projection: every line with its counters and order status.
#[derive(Debug)]
pub struct AvailableLinesProjection<S>
where
    S: ReadStore<OrderLineId, LineView>,
{
    store: S,
    /// Order id → (status, lines), needed to fan status changes out to lines.
    orders: RwLock<HashMap<BlanketOrderId, (BlanketOrderStatus, Vec<OrderLineId>)>>,
    cursors: StreamCursors,
}

impl<S> Default for AvailableLinesProjection<S>
where
    S: ReadStore<OrderLineId, LineView> + Default,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> AvailableLinesProjection<S>
where
    S: ReadStore<OrderLineId, LineView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            orders: RwLock::new(HashMap::new()),
            cursors: StreamCursors::default(),
        }
    }

    pub fn get(&self, line_id: &OrderLineId) -> Option<LineView> {
        self.store.get(line_id)
    }

    /// Lines with remaining quantity on active orders, by order number then line number.
    pub fn available(&self) -> Vec<LineView> {
        let mut lines: Vec<LineView> = self.store.list().into_iter().filter(LineView::is_available).collect();
        lines.sort_by(|a, b| {
            a.order_number
                .cmp(&b.order_number)
                .then(a.line_no.cmp(&b.line_no))
        });
        lines
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != BlanketOrder::AGGREGATE_TYPE && aggregate_type != OrderLine::AGGREGATE_TYPE {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }

        if aggregate_type == BlanketOrder::AGGREGATE_TYPE {
            self.apply_order(decode(envelope)?)?;
        } else {
            self.apply_line(decode(envelope)?)?;
        }

        self.cursors.advance(envelope)
    }

    fn apply_order(&self, event: BlanketOrderEvent) -> Result<(), ProjectionError> {
        let mut orders = self.orders.write().map_err(|_| ProjectionError::Poisoned)?;
        match event {
            BlanketOrderEvent::BlanketOrderCreated(e) => {
                let line_ids = e.lines.iter().map(|l| l.line_id).collect();
                orders.insert(e.order_id, (BlanketOrderStatus::Active, line_ids));
            }
            BlanketOrderEvent::OrderStatusChanged(e) => {
                let Some((status, line_ids)) = orders.get_mut(&e.order_id) else {
                    return Ok(());
                };
                *status = e.status;
                for line_id in line_ids.iter() {
                    self.store.update(*line_id, |view| {
                        view.map(|mut v| {
                            v.order_status = e.status;
                            v
                        })
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_line(&self, event: OrderLineEvent) -> Result<(), ProjectionError> {
        match event {
            OrderLineEvent::LineOpened(e) => {
                let order_status = self
                    .orders
                    .read()
                    .map_err(|_| ProjectionError::Poisoned)?
                    .get(&e.order_id)
                    .map(|(status, _)| *status)
                    .unwrap_or(BlanketOrderStatus::Active);

                self.store.upsert(
                    e.line_id,
                    LineView {
                        line_id: e.line_id,
                        order_id: e.order_id,
                        order_number: e.order_number,
                        line_no: e.line_no,
                        item_id: e.item_id,
                        total_quantity: e.total_quantity,
                        released_quantity: 0,
                        delivered_quantity: 0,
                        remaining_quantity: e.total_quantity,
                        order_status,
                    },
                );
            }
            OrderLineEvent::QuantityCommitted(e) => {
                self.store.update(e.line_id, |view| {
                    view.map(|mut v| {
                        v.released_quantity += e.quantity;
                        v.remaining_quantity = v.total_quantity - v.released_quantity;
                        v
                    })
                });
            }
            OrderLineEvent::DeliveryRecorded(e) => {
                self.store.update(e.line_id, |view| {
                    view.map(|mut v| {
                        v.delivered_quantity += e.quantity;
                        v
                    })
                });
            }
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ProjectionError> {
        self.store.clear();
        self.orders.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.orders.clear_poison();
        self.cursors.clear()
    }
}
