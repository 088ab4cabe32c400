use serde::{Deserialize, Serialize};

/// A mutating operation subject to authorization.
///
/// Reads are not gated here; every variant below changes core state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateOrder,
    CancelOrder,
    CompleteOrder,
    ScheduleRelease,
    ShipRelease,
    DeliverRelease,
    RegisterItem,
    DeductStock,
    AdjustStock,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::CreateOrder,
        Action::CancelOrder,
        Action::CompleteOrder,
        Action::ScheduleRelease,
        Action::ShipRelease,
        Action::DeliverRelease,
        Action::RegisterItem,
        Action::DeductStock,
        Action::AdjustStock,
    ];

    /// Stable dotted name, used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateOrder => "orders.create",
            Action::CancelOrder => "orders.cancel",
            Action::CompleteOrder => "orders.complete",
            Action::ScheduleRelease => "releases.schedule",
            Action::ShipRelease => "releases.ship",
            Action::DeliverRelease => "releases.deliver",
            Action::RegisterItem => "inventory.register",
            Action::DeductStock => "inventory.deduct",
            Action::AdjustStock => "inventory.adjust",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
