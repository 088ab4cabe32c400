//! Blanket order domain module (event-sourced).
//!
//! Three aggregates share the fulfillment rules: the `BlanketOrder` header, one
//! `OrderLine` per contracted item carrying the released/delivered counters, and
//! one `Release` per scheduled delivery. `OrderNumberClaim` keeps order numbers
//! unique. Cross-aggregate steps (reserve on schedule, deduct on delivery) are
//! composed by the infra layer inside a single atomic commit.

pub mod line;
pub mod order;
pub mod release;

pub use line::{
    CommitRelease, DeliveryRecorded, LineOpened, OpenLine, OrderLine, OrderLineCommand,
    OrderLineEvent, OrderLineId, QuantityCommitted, RecordDelivery,
};
pub use order::{
    BlanketOrder, BlanketOrderCommand, BlanketOrderCreated, BlanketOrderEvent, BlanketOrderId,
    BlanketOrderStatus, CancelOrder, ClaimOrderNumber, CompleteOrder, CreateBlanketOrder,
    NewOrderLine, OrderLineRef, OrderNumberClaim, OrderNumberClaimed, OrderStatusChanged,
    order_number_key,
};
pub use release::{
    ChangeStatus, Release, ReleaseCommand, ReleaseDelivered, ReleaseEvent, ReleaseId,
    ReleaseScheduled, ReleaseShipped, ReleaseStatus, ScheduleRelease,
};
