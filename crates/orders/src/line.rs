use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{Aggregate, AggregateRoot, DomainError, typed_aggregate_id};
use stockline_events::Event;
use stockline_inventory::ItemId;

use crate::order::BlanketOrderId;
use crate::release::ReleaseId;

typed_aggregate_id!(
    /// Order line identifier.
    OrderLineId
);

/// Aggregate root: OrderLine.
///
/// Tracks the committed (`released`) and fulfilled (`delivered`) quantity
/// against the contracted total. Invariant: `0 <= delivered <= released <= total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    id: OrderLineId,
    order_id: Option<BlanketOrderId>,
    order_number: String,
    line_no: u32,
    item_id: Option<ItemId>,
    total_quantity: i64,
    released_quantity: i64,
    delivered_quantity: i64,
    version: u64,
    opened: bool,
}

impl OrderLine {
    pub fn empty(id: OrderLineId) -> Self {
        Self {
            id,
            order_id: None,
            order_number: String::new(),
            line_no: 0,
            item_id: None,
            total_quantity: 0,
            released_quantity: 0,
            delivered_quantity: 0,
            version: 0,
            opened: false,
        }
    }

    pub fn id_typed(&self) -> OrderLineId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.opened
    }

    pub fn order_id(&self) -> Option<BlanketOrderId> {
        self.order_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    pub fn released_quantity(&self) -> i64 {
        self.released_quantity
    }

    pub fn delivered_quantity(&self) -> i64 {
        self.delivered_quantity
    }

    /// Quantity still available to schedule.
    pub fn remaining_quantity(&self) -> i64 {
        self.total_quantity - self.released_quantity
    }

    pub fn is_fully_delivered(&self) -> bool {
        self.opened && self.delivered_quantity == self.total_quantity
    }
}

impl AggregateRoot for OrderLine {
    type Id = OrderLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenLine (issued once per line when its order is created).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLine {
    pub line_id: OrderLineId,
    pub order_id: BlanketOrderId,
    pub order_number: String,
    pub line_no: u32,
    pub item_id: ItemId,
    pub total_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CommitRelease (reserve part of the remaining quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRelease {
    pub line_id: OrderLineId,
    pub release_id: ReleaseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub line_id: OrderLineId,
    pub release_id: ReleaseId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderLineCommand {
    OpenLine(OpenLine),
    CommitRelease(CommitRelease),
    RecordDelivery(RecordDelivery),
}

/// Event: LineOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineOpened {
    pub line_id: OrderLineId,
    pub order_id: BlanketOrderId,
    pub order_number: String,
    pub line_no: u32,
    pub item_id: ItemId,
    pub total_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuantityCommitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityCommitted {
    pub line_id: OrderLineId,
    pub release_id: ReleaseId,
    pub quantity: i64,
    pub remaining_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecorded {
    pub line_id: OrderLineId,
    pub release_id: ReleaseId,
    pub quantity: i64,
    pub delivered_after: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderLineEvent {
    LineOpened(LineOpened),
    QuantityCommitted(QuantityCommitted),
    DeliveryRecorded(DeliveryRecorded),
}

impl Event for OrderLineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderLineEvent::LineOpened(_) => "orders.order_line.opened",
            OrderLineEvent::QuantityCommitted(_) => "orders.order_line.quantity_committed",
            OrderLineEvent::DeliveryRecorded(_) => "orders.order_line.delivery_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderLineEvent::LineOpened(e) => e.occurred_at,
            OrderLineEvent::QuantityCommitted(e) => e.occurred_at,
            OrderLineEvent::DeliveryRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for OrderLine {
    type Command = OrderLineCommand;
    type Event = OrderLineEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "orders.order_line";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderLineEvent::LineOpened(e) => {
                self.id = e.line_id;
                self.order_id = Some(e.order_id);
                self.order_number = e.order_number.clone();
                self.line_no = e.line_no;
                self.item_id = Some(e.item_id);
                self.total_quantity = e.total_quantity;
                self.opened = true;
            }
            OrderLineEvent::QuantityCommitted(e) => {
                self.released_quantity += e.quantity;
            }
            OrderLineEvent::DeliveryRecorded(e) => {
                self.delivered_quantity += e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderLineCommand::OpenLine(cmd) => self.handle_open(cmd),
            OrderLineCommand::CommitRelease(cmd) => self.handle_commit(cmd),
            OrderLineCommand::RecordDelivery(cmd) => self.handle_delivery(cmd),
        }
    }
}

impl OrderLine {
    fn ensure_line(&self, line_id: OrderLineId) -> Result<(), DomainError> {
        if !self.opened {
            return Err(DomainError::not_found("order line"));
        }
        if self.id != line_id {
            return Err(DomainError::invariant("line_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenLine) -> Result<Vec<OrderLineEvent>, DomainError> {
        if self.opened {
            return Err(DomainError::conflict("order line already exists"));
        }
        if cmd.total_quantity <= 0 {
            return Err(DomainError::validation("total_quantity must be positive"));
        }

        Ok(vec![OrderLineEvent::LineOpened(LineOpened {
            line_id: cmd.line_id,
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            line_no: cmd.line_no,
            item_id: cmd.item_id,
            total_quantity: cmd.total_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_commit(&self, cmd: &CommitRelease) -> Result<Vec<OrderLineEvent>, DomainError> {
        self.ensure_line(cmd.line_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let remaining = self.remaining_quantity();
        if cmd.quantity > remaining {
            return Err(DomainError::InsufficientRemainingQuantity {
                remaining,
                requested: cmd.quantity,
            });
        }

        Ok(vec![OrderLineEvent::QuantityCommitted(QuantityCommitted {
            line_id: cmd.line_id,
            release_id: cmd.release_id,
            quantity: cmd.quantity,
            remaining_after: remaining - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delivery(&self, cmd: &RecordDelivery) -> Result<Vec<OrderLineEvent>, DomainError> {
        self.ensure_line(cmd.line_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let undelivered = self.released_quantity - self.delivered_quantity;
        if cmd.quantity > undelivered {
            return Err(DomainError::invariant(format!(
                "delivering {} exceeds the {undelivered} released but undelivered",
                cmd.quantity
            )));
        }
        let delivered_after = self.delivered_quantity + cmd.quantity;

        Ok(vec![OrderLineEvent::DeliveryRecorded(DeliveryRecorded {
            line_id: cmd.line_id,
            release_id: cmd.release_id,
            quantity: cmd.quantity,
            delivered_after,
            occurred_at: cmd.occurred_at,
        })])
    }
}
