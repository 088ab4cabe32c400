use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, typed_aggregate_id};
use stockline_events::Event;
use stockline_inventory::ItemId;

use crate::line::OrderLineId;

typed_aggregate_id!(
    /// Blanket order identifier.
    BlanketOrderId
);

/// Blanket order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlanketOrderStatus {
    Active,
    Completed,
    Cancelled,
}

impl core::fmt::Display for BlanketOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            BlanketOrderStatus::Active => "ACTIVE",
            BlanketOrderStatus::Completed => "COMPLETED",
            BlanketOrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// A line as requested at order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub line_id: OrderLineId,
    pub item_id: ItemId,
    pub total_quantity: i64,
}

/// A line as recorded on the order header (quantities live on the line stream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRef {
    pub line_id: OrderLineId,
    pub line_no: u32,
    pub item_id: ItemId,
    pub total_quantity: i64,
}

/// Aggregate root: BlanketOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlanketOrder {
    id: BlanketOrderId,
    order_number: String,
    customer_name: String,
    order_date: Option<NaiveDate>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    status: BlanketOrderStatus,
    lines: Vec<OrderLineRef>,
    version: u64,
    created: bool,
}

impl BlanketOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BlanketOrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            customer_name: String::new(),
            order_date: None,
            start_date: None,
            end_date: None,
            status: BlanketOrderStatus::Active,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BlanketOrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn status(&self) -> BlanketOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLineRef] {
        &self.lines
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status == BlanketOrderStatus::Active
    }
}

impl AggregateRoot for BlanketOrder {
    type Id = BlanketOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBlanketOrder (header + lines in one step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBlanketOrder {
    pub order_id: BlanketOrderId,
    pub order_number: String,
    pub customer_name: String,
    pub order_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: BlanketOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteOrder.
///
/// `undelivered_lines` is counted by the caller from the current line streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: BlanketOrderId,
    pub undelivered_lines: usize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlanketOrderCommand {
    CreateBlanketOrder(CreateBlanketOrder),
    CancelOrder(CancelOrder),
    CompleteOrder(CompleteOrder),
}

/// Event: BlanketOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlanketOrderCreated {
    pub order_id: BlanketOrderId,
    pub order_number: String,
    pub customer_name: String,
    pub order_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub lines: Vec<OrderLineRef>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged (ACTIVE → COMPLETED | CANCELLED).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: BlanketOrderId,
    pub status: BlanketOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlanketOrderEvent {
    BlanketOrderCreated(BlanketOrderCreated),
    OrderStatusChanged(OrderStatusChanged),
}

impl Event for BlanketOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BlanketOrderEvent::BlanketOrderCreated(_) => "orders.blanket_order.created",
            BlanketOrderEvent::OrderStatusChanged(_) => "orders.blanket_order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BlanketOrderEvent::BlanketOrderCreated(e) => e.occurred_at,
            BlanketOrderEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BlanketOrder {
    type Command = BlanketOrderCommand;
    type Event = BlanketOrderEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "orders.blanket_order";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BlanketOrderEvent::BlanketOrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.customer_name = e.customer_name.clone();
                self.order_date = Some(e.order_date);
                self.start_date = Some(e.start_date);
                self.end_date = Some(e.end_date);
                self.status = BlanketOrderStatus::Active;
                self.lines = e.lines.clone();
                self.created = true;
            }
            BlanketOrderEvent::OrderStatusChanged(e) => {
                self.status = e.status;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BlanketOrderCommand::CreateBlanketOrder(cmd) => self.handle_create(cmd),
            BlanketOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            BlanketOrderCommand::CompleteOrder(cmd) => self.handle_complete(cmd),
        }
    }
}

impl BlanketOrder {
    fn ensure_order(&self, order_id: BlanketOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("blanket order"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreateBlanketOrder,
    ) -> Result<Vec<BlanketOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("blanket order already exists"));
        }

        let order_number = cmd.order_number.trim();
        if order_number.is_empty() {
            return Err(DomainError::validation("order_number cannot be empty"));
        }
        if cmd.customer_name.trim().is_empty() {
            return Err(DomainError::validation("customer_name cannot be empty"));
        }
        if cmd.start_date > cmd.end_date {
            return Err(DomainError::validation("start_date must not be after end_date"));
        }
        if cmd.order_date > cmd.end_date {
            return Err(DomainError::validation("order_date must not be after end_date"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }

        let mut lines: Vec<OrderLineRef> = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.total_quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {}: total_quantity must be positive",
                    idx + 1
                )));
            }
            if lines.iter().any(|l| l.line_id == line.line_id) {
                return Err(DomainError::validation("duplicate line id"));
            }
            lines.push(OrderLineRef {
                line_id: line.line_id,
                line_no: (idx as u32) + 1,
                item_id: line.item_id,
                total_quantity: line.total_quantity,
            });
        }

        Ok(vec![BlanketOrderEvent::BlanketOrderCreated(BlanketOrderCreated {
            order_id: cmd.order_id,
            order_number: order_number.to_string(),
            customer_name: cmd.customer_name.trim().to_string(),
            order_date: cmd.order_date,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<BlanketOrderEvent>, DomainError> {
        self.ensure_order(cmd.order_id)?;
        if self.status != BlanketOrderStatus::Active {
            return Err(DomainError::invalid_transition(
                self.status,
                BlanketOrderStatus::Cancelled,
            ));
        }

        Ok(vec![BlanketOrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: cmd.order_id,
            status: BlanketOrderStatus::Cancelled,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteOrder) -> Result<Vec<BlanketOrderEvent>, DomainError> {
        self.ensure_order(cmd.order_id)?;
        if self.status != BlanketOrderStatus::Active || cmd.undelivered_lines > 0 {
            return Err(DomainError::invalid_transition(
                self.status,
                BlanketOrderStatus::Completed,
            ));
        }

        Ok(vec![BlanketOrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: cmd.order_id,
            status: BlanketOrderStatus::Completed,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Key under which an order number is claimed (case and padding insensitive).
pub fn order_number_key(order_number: &str) -> String {
    order_number.trim().to_ascii_uppercase()
}

/// Aggregate root: OrderNumberClaim.
///
/// One stream per normalised order number, addressed by a name-derived id, so
/// that two orders claiming the same number collide on the same stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNumberClaim {
    id: AggregateId,
    order_id: Option<BlanketOrderId>,
    version: u64,
}

impl OrderNumberClaim {
    pub const ID_KIND: &'static str = "orders.order_number";

    pub fn id_for(order_number: &str) -> AggregateId {
        AggregateId::from_name(Self::ID_KIND, &order_number_key(order_number))
    }

    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            order_id: None,
            version: 0,
        }
    }

    pub fn claimed_by(&self) -> Option<BlanketOrderId> {
        self.order_id
    }
}

impl AggregateRoot for OrderNumberClaim {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ClaimOrderNumber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOrderNumber {
    pub order_number: String,
    pub order_id: BlanketOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderNumberClaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNumberClaimed {
    pub order_number: String,
    pub order_id: BlanketOrderId,
    pub occurred_at: DateTime<Utc>,
}

impl Event for OrderNumberClaimed {
    fn event_type(&self) -> &'static str {
        "orders.order_number.claimed"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl Aggregate for OrderNumberClaim {
    type Command = ClaimOrderNumber;
    type Event = OrderNumberClaimed;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "orders.order_number";

    fn apply(&mut self, event: &Self::Event) {
        self.order_id = Some(event.order_id);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if self.order_id.is_some() {
            return Err(DomainError::DuplicateOrderNumber(
                command.order_number.trim().to_string(),
            ));
        }
        Ok(vec![OrderNumberClaimed {
            order_number: command.order_number.trim().to_string(),
            order_id: command.order_id,
            occurred_at: command.occurred_at,
        }])
    }
}
