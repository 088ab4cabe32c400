//! Order & line registry.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use stockline_auth::{Action, Actor};
use stockline_core::DomainError;
use stockline_events::{EventBus, EventEnvelope};
use stockline_inventory::{InventoryItem, ItemId};
use stockline_orders::{
    BlanketOrder, BlanketOrderCommand, BlanketOrderId, BlanketOrderStatus, CancelOrder,
    ClaimOrderNumber, CompleteOrder, CreateBlanketOrder, NewOrderLine, OpenLine, OrderLine,
    OrderLineCommand, OrderLineId, OrderNumberClaim,
};

use super::{FulfillmentError, FulfillmentResult, FulfillmentService};
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::projections::LineView;

/// Order header as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub order_number: String,
    pub customer_name: String,
    pub order_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub item_id: ItemId,
    pub total_quantity: i64,
}

/// A blanket order with its lines' current counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: BlanketOrderId,
    pub order_number: String,
    pub customer_name: String,
    pub order_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BlanketOrderStatus,
    pub lines: Vec<LineView>,
}

pub(super) fn order_loader(id: stockline_core::AggregateId) -> BlanketOrder {
    BlanketOrder::empty(BlanketOrderId::new(id))
}

pub(super) fn line_loader(id: stockline_core::AggregateId) -> OrderLine {
    OrderLine::empty(OrderLineId::new(id))
}

pub(super) fn item_loader(id: stockline_core::AggregateId) -> InventoryItem {
    InventoryItem::empty(ItemId::new(id))
}

/// Snapshot of a line aggregate, tagged with its order's status.
pub(super) fn line_view(line: &OrderLine, order_status: BlanketOrderStatus) -> FulfillmentResult<LineView> {
    let (Some(order_id), Some(item_id)) = (line.order_id(), line.item_id()) else {
        return Err(FulfillmentError::NotFound("order line"));
    };
    Ok(LineView {
        line_id: line.id_typed(),
        order_id,
        order_number: line.order_number().to_string(),
        line_no: line.line_no(),
        item_id,
        total_quantity: line.total_quantity(),
        released_quantity: line.released_quantity(),
        delivered_quantity: line.delivered_quantity(),
        remaining_quantity: line.remaining_quantity(),
        order_status,
    })
}

fn order_snapshot(order: &BlanketOrder, lines: Vec<LineView>) -> FulfillmentResult<OrderSnapshot> {
    let (Some(order_date), Some(start_date), Some(end_date)) =
        (order.order_date(), order.start_date(), order.end_date())
    else {
        return Err(FulfillmentError::NotFound("blanket order"));
    };
    Ok(OrderSnapshot {
        order_id: order.id_typed(),
        order_number: order.order_number().to_string(),
        customer_name: order.customer_name().to_string(),
        order_date,
        start_date,
        end_date,
        status: order.status(),
        lines,
    })
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create an order with all its lines in one commit.
    ///
    /// The order number is claimed in the same commit, so two concurrent
    /// creates with one number cannot both succeed.
    #[instrument(skip(self, actor, header, lines), fields(order_number = %header.order_number, lines = lines.len()))]
    pub fn create_order(
        &self,
        actor: &Actor,
        header: OrderHeader,
        lines: Vec<NewLine>,
    ) -> FulfillmentResult<OrderSnapshot> {
        self.authorize(actor, Action::CreateOrder)?;

        let order_id = BlanketOrderId::generate();
        let command = CreateBlanketOrder {
            order_id,
            order_number: header.order_number.clone(),
            customer_name: header.customer_name.clone(),
            order_date: header.order_date,
            start_date: header.start_date,
            end_date: header.end_date,
            lines: lines
                .iter()
                .map(|l| NewOrderLine {
                    line_id: OrderLineId::generate(),
                    item_id: l.item_id,
                    total_quantity: l.total_quantity,
                })
                .collect(),
            occurred_at: Utc::now(),
        };

        let committed = self
            .dispatcher
            .transact(|uow| {
                let mut order = uow.load(order_id.aggregate_id(), order_loader)?;
                uow.execute(
                    order_id.aggregate_id(),
                    &mut order,
                    &BlanketOrderCommand::CreateBlanketOrder(command.clone()),
                )?;

                for line in order.lines() {
                    let item = uow.load(line.item_id.aggregate_id(), item_loader)?;
                    if !item.is_registered() {
                        return Err(DomainError::not_found("inventory item").into());
                    }
                }

                let claim_id = OrderNumberClaim::id_for(order.order_number());
                let mut claim = uow.load(claim_id, OrderNumberClaim::empty)?;
                uow.execute(
                    claim_id,
                    &mut claim,
                    &ClaimOrderNumber {
                        order_number: order.order_number().to_string(),
                        order_id,
                        occurred_at: command.occurred_at,
                    },
                )?;

                let mut views = Vec::with_capacity(order.lines().len());
                for line_ref in order.lines() {
                    let line_id = line_ref.line_id.aggregate_id();
                    let mut line = uow.load(line_id, line_loader)?;
                    uow.execute(
                        line_id,
                        &mut line,
                        &OrderLineCommand::OpenLine(OpenLine {
                            line_id: line_ref.line_id,
                            order_id,
                            order_number: order.order_number().to_string(),
                            line_no: line_ref.line_no,
                            item_id: line_ref.item_id,
                            total_quantity: line_ref.total_quantity,
                            occurred_at: command.occurred_at,
                        }),
                    )?;
                    views.push(line);
                }

                Ok((order, views))
            })
            .map_err(|err| self.rejected("create_order", err))?;

        let (order, lines) = committed.value;
        let lines = lines
            .iter()
            .map(|l| line_view(l, order.status()))
            .collect::<FulfillmentResult<Vec<_>>>()?;
        info!(%order_id, order_number = %order.order_number(), "blanket order created");
        order_snapshot(&order, lines)
    }

    pub fn get_order(&self, order_id: BlanketOrderId) -> FulfillmentResult<OrderSnapshot> {
        let order = self.dispatcher.load(order_id.aggregate_id(), order_loader)?;
        if !order.exists() {
            return Err(FulfillmentError::NotFound("blanket order"));
        }
        self.snapshot(&order)
    }

    pub fn get_line(&self, line_id: OrderLineId) -> FulfillmentResult<LineView> {
        let line = self.dispatcher.load(line_id.aggregate_id(), line_loader)?;
        let Some(order_id) = line.order_id().filter(|_| line.exists()) else {
            return Err(FulfillmentError::NotFound("order line"));
        };
        let order = self.dispatcher.load(order_id.aggregate_id(), order_loader)?;
        line_view(&line, order.status())
    }

    /// Lines that can still take a release.
    pub fn list_available_lines(&self) -> Vec<LineView> {
        self.read_models.lines.available()
    }

    #[instrument(skip(self, actor))]
    pub fn cancel_order(&self, actor: &Actor, order_id: BlanketOrderId) -> FulfillmentResult<OrderSnapshot> {
        self.authorize(actor, Action::CancelOrder)?;

        let committed = self
            .dispatcher
            .dispatch(
                order_id.aggregate_id(),
                BlanketOrderCommand::CancelOrder(CancelOrder {
                    order_id,
                    occurred_at: Utc::now(),
                }),
                order_loader,
            )
            .map_err(|err| self.rejected("cancel_order", err))?;

        info!(%order_id, "blanket order cancelled");
        self.snapshot(&committed.value)
    }

    /// Close an order whose lines are all fully delivered.
    #[instrument(skip(self, actor))]
    pub fn complete_order(&self, actor: &Actor, order_id: BlanketOrderId) -> FulfillmentResult<OrderSnapshot> {
        self.authorize(actor, Action::CompleteOrder)?;

        let committed = self
            .dispatcher
            .transact(|uow| {
                let mut order = uow.load(order_id.aggregate_id(), order_loader)?;
                if !order.exists() {
                    return Err(DomainError::not_found("blanket order").into());
                }

                let mut undelivered_lines = 0;
                for line_ref in order.lines() {
                    let line = uow.load(line_ref.line_id.aggregate_id(), line_loader)?;
                    if !line.is_fully_delivered() {
                        undelivered_lines += 1;
                    }
                    uow.guard(line_ref.line_id.aggregate_id(), &line);
                }

                uow.execute(
                    order_id.aggregate_id(),
                    &mut order,
                    &BlanketOrderCommand::CompleteOrder(CompleteOrder {
                        order_id,
                        undelivered_lines,
                        occurred_at: Utc::now(),
                    }),
                )?;
                Ok(order)
            })
            .map_err(|err| self.rejected("complete_order", err))?;

        info!(%order_id, "blanket order completed");
        self.snapshot(&committed.value)
    }

    fn snapshot(&self, order: &BlanketOrder) -> FulfillmentResult<OrderSnapshot> {
        let lines = order
            .lines()
            .iter()
            .map(|line_ref| {
                let line = self.dispatcher.load(line_ref.line_id.aggregate_id(), line_loader)?;
                line_view(&line, order.status())
            })
            .collect::<FulfillmentResult<Vec<_>>>()?;
        order_snapshot(order, lines)
    }

    /// Log a failed unit of work at the right level and convert it.
    pub(super) fn rejected(&self, operation: &'static str, err: DispatchError) -> FulfillmentError {
        let err = FulfillmentError::from(err);
        if err.is_rejection() {
            warn!(operation, code = err.code(), error = %err, "operation rejected");
        } else {
            tracing::error!(operation, code = err.code(), error = %err, "operation failed");
        }
        err
    }
}
