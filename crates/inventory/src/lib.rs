//! Inventory domain module (event-sourced).
//!
//! Business rules for per-item stock and the movement ledger, implemented as
//! deterministic domain logic (no IO, no HTTP, no storage). An item's event
//! stream *is* its ledger: every `StockMoved` event is one immutable movement.

pub mod item;
pub mod movement;

pub use item::{
    Adjust, Deduct, InventoryCommand, InventoryEvent, InventoryItem, ItemId, ItemRegistered,
    RegisterItem, StockMoved, StockPolicy, StockStatus,
};
pub use movement::{LedgerReplayError, Movement, MovementDirection, ReferenceType, replay_balance};
