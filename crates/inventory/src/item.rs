use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockline_core::{Aggregate, AggregateRoot, DomainError, typed_aggregate_id};
use stockline_events::Event;

use crate::movement::{Movement, MovementDirection, ReferenceType};

typed_aggregate_id!(
    /// Inventory item identifier (shared with the catalog collaborator).
    ItemId
);

/// Catalog-supplied stock thresholds for one item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockPolicy {
    pub min_stock: i64,
    pub max_stock: i64,
    pub safety_stock: i64,
}

impl StockPolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_stock < 0 || self.max_stock < 0 || self.safety_stock < 0 {
            return Err(DomainError::validation("stock thresholds cannot be negative"));
        }
        if self.min_stock > self.max_stock {
            return Err(DomainError::validation("min_stock cannot exceed max_stock"));
        }
        if self.safety_stock > self.max_stock {
            return Err(DomainError::validation("safety_stock cannot exceed max_stock"));
        }
        Ok(())
    }

    /// Classify an available stock level against the thresholds.
    ///
    /// A zero `max_stock` means "no upper bound".
    pub fn classify(&self, available: i64) -> StockStatus {
        if available < self.safety_stock {
            StockStatus::BelowSafety
        } else if available < self.min_stock {
            StockStatus::BelowMin
        } else if self.max_stock > 0 && available > self.max_stock {
            StockStatus::AboveMax
        } else {
            StockStatus::Normal
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    BelowSafety,
    BelowMin,
    Normal,
    AboveMax,
}

/// Aggregate root: InventoryItem.
///
/// Holds the authoritative `available_stock`; its event stream is the
/// movement ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: ItemId,
    name: String,
    policy: StockPolicy,
    available_stock: i64,
    version: u64,
    registered: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            name: String::new(),
            policy: StockPolicy::default(),
            available_stock: 0,
            version: 0,
            registered: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> StockPolicy {
        self.policy
    }

    pub fn available_stock(&self) -> i64 {
        self.available_stock
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn stock_status(&self) -> StockStatus {
        self.policy.classify(self.available_stock)
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem (catalog hook; row starts at zero stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: ItemId,
    pub name: String,
    pub policy: StockPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Deduct (outbound movement against a business reference).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduct {
    pub item_id: ItemId,
    pub movement_id: Uuid,
    pub quantity: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Adjust (manual ledger entry in either direction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjust {
    pub item_id: ItemId,
    pub movement_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: i64,
    pub reason: String,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterItem(RegisterItem),
    Deduct(Deduct),
    Adjust(Adjust),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: ItemId,
    pub name: String,
    pub policy: StockPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved (one ledger entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub item_id: ItemId,
    pub movement_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: i64,
    pub balance_after: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl StockMoved {
    pub fn to_movement(&self) -> Movement {
        Movement {
            id: self.movement_id,
            item_id: self.item_id,
            direction: self.direction,
            quantity: self.quantity,
            balance_after: self.balance_after,
            reference_type: self.reference_type,
            reference_id: self.reference_id.clone(),
            reason: self.reason.clone(),
            created_at: self.occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemRegistered(ItemRegistered),
    StockMoved(StockMoved),
}

impl InventoryEvent {
    /// The ledger entry recorded by this event, if any.
    pub fn movement(&self) -> Option<Movement> {
        match self {
            InventoryEvent::StockMoved(e) => Some(e.to_movement()),
            InventoryEvent::ItemRegistered(_) => None,
        }
    }

    pub fn item_id(&self) -> ItemId {
        match self {
            InventoryEvent::ItemRegistered(e) => e.item_id,
            InventoryEvent::StockMoved(e) => e.item_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemRegistered(_) => "inventory.item.registered",
            InventoryEvent::StockMoved(_) => "inventory.item.stock_moved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemRegistered(e) => e.occurred_at,
            InventoryEvent::StockMoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "inventory.item";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.name = e.name.clone();
                self.policy = e.policy;
                self.available_stock = 0;
                self.registered = true;
            }
            InventoryEvent::StockMoved(e) => {
                self.available_stock = e.balance_after;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterItem(cmd) => self.handle_register(cmd),
            InventoryCommand::Deduct(cmd) => self.handle_deduct(cmd),
            InventoryCommand::Adjust(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_registered(&self, item_id: ItemId) -> Result<(), DomainError> {
        if !self.registered {
            return Err(DomainError::not_found("inventory item"));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    /// Shared outbound rule: available stock must cover the quantity.
    fn balance_after(
        &self,
        direction: MovementDirection,
        quantity: i64,
    ) -> Result<i64, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if direction == MovementDirection::Out && self.available_stock < quantity {
            return Err(DomainError::InsufficientStock {
                available: self.available_stock,
                requested: quantity,
            });
        }
        self.available_stock
            .checked_add(direction.signed(quantity))
            .ok_or_else(|| DomainError::validation("quantity overflows stock balance"))
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.registered {
            return Err(DomainError::validation("item already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        cmd.policy.validate()?;

        Ok(vec![InventoryEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            policy: cmd.policy,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deduct(&self, cmd: &Deduct) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_registered(cmd.item_id)?;
        if cmd.reference_id.trim().is_empty() {
            return Err(DomainError::validation("reference_id cannot be empty"));
        }
        let balance_after = self.balance_after(MovementDirection::Out, cmd.quantity)?;

        Ok(vec![InventoryEvent::StockMoved(StockMoved {
            item_id: cmd.item_id,
            movement_id: cmd.movement_id,
            direction: MovementDirection::Out,
            quantity: cmd.quantity,
            balance_after,
            reference_type: cmd.reference_type,
            reference_id: cmd.reference_id.clone(),
            reason: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &Adjust) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_registered(cmd.item_id)?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason is required"));
        }
        if !cmd.reference_type.is_manual() {
            return Err(DomainError::validation(
                "release movements are recorded by delivery reconciliation only",
            ));
        }
        let balance_after = self.balance_after(cmd.direction, cmd.quantity)?;

        Ok(vec![InventoryEvent::StockMoved(StockMoved {
            item_id: cmd.item_id,
            movement_id: cmd.movement_id,
            direction: cmd.direction,
            quantity: cmd.quantity,
            balance_after,
            reference_type: cmd.reference_type,
            reference_id: cmd.reference_id.clone(),
            reason: Some(cmd.reason.trim().to_string()),
            occurred_at: cmd.occurred_at,
        })])
    }
}
