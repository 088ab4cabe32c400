use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{Aggregate, AggregateRoot, DomainError, typed_aggregate_id};
use stockline_events::Event;
use stockline_inventory::ItemId;

use crate::line::OrderLineId;

typed_aggregate_id!(
    /// Release identifier.
    ReleaseId
);

/// Release lifecycle: PENDING → SHIPPED → DELIVERED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseStatus {
    Pending,
    Shipped,
    Delivered,
}

impl ReleaseStatus {
    /// Check whether a release in `self` may move to `next`.
    ///
    /// Only single forward steps are allowed. Anything out of `Delivered` is
    /// `AlreadyDelivered` so callers can tell a repeat delivery from a bad request.
    pub fn ensure_transition(self, next: ReleaseStatus) -> Result<(), DomainError> {
        match (self, next) {
            (ReleaseStatus::Delivered, _) => Err(DomainError::AlreadyDelivered),
            (ReleaseStatus::Pending, ReleaseStatus::Shipped)
            | (ReleaseStatus::Shipped, ReleaseStatus::Delivered) => Ok(()),
            (from, to) => Err(DomainError::invalid_transition(from, to)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Pending => "PENDING",
            ReleaseStatus::Shipped => "SHIPPED",
            ReleaseStatus::Delivered => "DELIVERED",
        }
    }
}

impl core::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ReleaseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReleaseStatus::Pending),
            "SHIPPED" => Ok(ReleaseStatus::Shipped),
            "DELIVERED" => Ok(ReleaseStatus::Delivered),
            other => Err(DomainError::validation(format!("unknown release status '{other}'"))),
        }
    }
}

/// Aggregate root: Release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    id: ReleaseId,
    line_id: Option<OrderLineId>,
    item_id: Option<ItemId>,
    quantity: i64,
    scheduled_delivery_date: Option<NaiveDate>,
    created_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    actual_delivery_date: Option<NaiveDate>,
    status: ReleaseStatus,
    version: u64,
    scheduled: bool,
}

impl Release {
    pub fn empty(id: ReleaseId) -> Self {
        Self {
            id,
            line_id: None,
            item_id: None,
            quantity: 0,
            scheduled_delivery_date: None,
            created_at: None,
            shipped_at: None,
            actual_delivery_date: None,
            status: ReleaseStatus::Pending,
            version: 0,
            scheduled: false,
        }
    }

    pub fn id_typed(&self) -> ReleaseId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.scheduled
    }

    pub fn line_id(&self) -> Option<OrderLineId> {
        self.line_id
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn scheduled_delivery_date(&self) -> Option<NaiveDate> {
        self.scheduled_delivery_date
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn actual_delivery_date(&self) -> Option<NaiveDate> {
        self.actual_delivery_date
    }

    pub fn status(&self) -> ReleaseStatus {
        self.status
    }
}

impl AggregateRoot for Release {
    type Id = ReleaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ScheduleRelease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRelease {
    pub release_id: ReleaseId,
    pub line_id: OrderLineId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub scheduled_delivery_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus (ship or deliver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub release_id: ReleaseId,
    pub status: ReleaseStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseCommand {
    ScheduleRelease(ScheduleRelease),
    ChangeStatus(ChangeStatus),
}

/// Event: ReleaseScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseScheduled {
    pub release_id: ReleaseId,
    pub line_id: OrderLineId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub scheduled_delivery_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReleaseShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseShipped {
    pub release_id: ReleaseId,
    pub line_id: OrderLineId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReleaseDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDelivered {
    pub release_id: ReleaseId,
    pub line_id: OrderLineId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub actual_delivery_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseEvent {
    ReleaseScheduled(ReleaseScheduled),
    ReleaseShipped(ReleaseShipped),
    ReleaseDelivered(ReleaseDelivered),
}

impl ReleaseEvent {
    pub fn item_id(&self) -> ItemId {
        match self {
            ReleaseEvent::ReleaseScheduled(e) => e.item_id,
            ReleaseEvent::ReleaseShipped(e) => e.item_id,
            ReleaseEvent::ReleaseDelivered(e) => e.item_id,
        }
    }

    pub fn line_id(&self) -> OrderLineId {
        match self {
            ReleaseEvent::ReleaseScheduled(e) => e.line_id,
            ReleaseEvent::ReleaseShipped(e) => e.line_id,
            ReleaseEvent::ReleaseDelivered(e) => e.line_id,
        }
    }
}

impl Event for ReleaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReleaseEvent::ReleaseScheduled(_) => "orders.release.scheduled",
            ReleaseEvent::ReleaseShipped(_) => "orders.release.shipped",
            ReleaseEvent::ReleaseDelivered(_) => "orders.release.delivered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReleaseEvent::ReleaseScheduled(e) => e.occurred_at,
            ReleaseEvent::ReleaseShipped(e) => e.occurred_at,
            ReleaseEvent::ReleaseDelivered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Release {
    type Command = ReleaseCommand;
    type Event = ReleaseEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "orders.release";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReleaseEvent::ReleaseScheduled(e) => {
                self.id = e.release_id;
                self.line_id = Some(e.line_id);
                self.item_id = Some(e.item_id);
                self.quantity = e.quantity;
                self.scheduled_delivery_date = Some(e.scheduled_delivery_date);
                self.created_at = Some(e.occurred_at);
                self.status = ReleaseStatus::Pending;
                self.scheduled = true;
            }
            ReleaseEvent::ReleaseShipped(e) => {
                self.status = ReleaseStatus::Shipped;
                self.shipped_at = Some(e.occurred_at);
            }
            ReleaseEvent::ReleaseDelivered(e) => {
                self.status = ReleaseStatus::Delivered;
                self.actual_delivery_date = Some(e.actual_delivery_date);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReleaseCommand::ScheduleRelease(cmd) => self.handle_schedule(cmd),
            ReleaseCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
        }
    }
}

impl Release {
    fn handle_schedule(&self, cmd: &ScheduleRelease) -> Result<Vec<ReleaseEvent>, DomainError> {
        if self.scheduled {
            return Err(DomainError::conflict("release already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![ReleaseEvent::ReleaseScheduled(ReleaseScheduled {
            release_id: cmd.release_id,
            line_id: cmd.line_id,
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            scheduled_delivery_date: cmd.scheduled_delivery_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<ReleaseEvent>, DomainError> {
        if !self.scheduled {
            return Err(DomainError::not_found("release"));
        }
        if self.id != cmd.release_id {
            return Err(DomainError::invariant("release_id mismatch"));
        }
        self.status.ensure_transition(cmd.status)?;

        let (line_id, item_id) = match (self.line_id, self.item_id) {
            (Some(line_id), Some(item_id)) => (line_id, item_id),
            _ => return Err(DomainError::invariant("scheduled release without line or item")),
        };

        let event = match cmd.status {
            ReleaseStatus::Shipped => ReleaseEvent::ReleaseShipped(ReleaseShipped {
                release_id: self.id,
                line_id,
                item_id,
                quantity: self.quantity,
                occurred_at: cmd.occurred_at,
            }),
            ReleaseStatus::Delivered => ReleaseEvent::ReleaseDelivered(ReleaseDelivered {
                release_id: self.id,
                line_id,
                item_id,
                quantity: self.quantity,
                actual_delivery_date: cmd.occurred_at.date_naive(),
                occurred_at: cmd.occurred_at,
            }),
            ReleaseStatus::Pending => {
                return Err(DomainError::invalid_transition(self.status, cmd.status));
            }
        };

        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockline_core::execute;

    fn scheduled_release(quantity: i64) -> Release {
        let release_id = ReleaseId::generate();
        let mut release = Release::empty(release_id);
        execute(
            &mut release,
            &ReleaseCommand::ScheduleRelease(ScheduleRelease {
                release_id,
                line_id: OrderLineId::generate(),
                item_id: ItemId::generate(),
                quantity,
                scheduled_delivery_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        release
    }

    fn change(release: &Release, status: ReleaseStatus) -> ReleaseCommand {
        ReleaseCommand::ChangeStatus(ChangeStatus {
            release_id: release.id_typed(),
            status,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn transition_table() {
        use ReleaseStatus::*;

        assert_eq!(Pending.ensure_transition(Shipped), Ok(()));
        assert_eq!(Shipped.ensure_transition(Delivered), Ok(()));

        assert_eq!(
            Pending.ensure_transition(Delivered),
            Err(DomainError::invalid_transition("PENDING", "DELIVERED"))
        );
        assert_eq!(
            Shipped.ensure_transition(Shipped),
            Err(DomainError::invalid_transition("SHIPPED", "SHIPPED"))
        );
        assert_eq!(
            Shipped.ensure_transition(Pending),
            Err(DomainError::invalid_transition("SHIPPED", "PENDING"))
        );
        for next in [Pending, Shipped, Delivered] {
            assert_eq!(Delivered.ensure_transition(next), Err(DomainError::AlreadyDelivered));
        }
    }

    #[test]
    fn full_lifecycle_records_dates() {
        let mut release = scheduled_release(300);
        assert_eq!(release.status(), ReleaseStatus::Pending);

        let cmd = change(&release, ReleaseStatus::Shipped);
        execute(&mut release, &cmd).unwrap();
        assert_eq!(release.status(), ReleaseStatus::Shipped);
        assert!(release.shipped_at().is_some());

        let cmd = change(&release, ReleaseStatus::Delivered);
        let events = execute(&mut release, &cmd).unwrap();
        match &events[0] {
            ReleaseEvent::ReleaseDelivered(e) => assert_eq!(e.quantity, 300),
            _ => panic!("Expected ReleaseDelivered event"),
        }
        assert_eq!(release.status(), ReleaseStatus::Delivered);
        assert!(release.actual_delivery_date().is_some());
        assert_eq!(release.version(), 3);
    }

    #[test]
    fn second_delivery_is_rejected() {
        let mut release = scheduled_release(10);
        for status in [ReleaseStatus::Shipped, ReleaseStatus::Delivered] {
            let cmd = change(&release, status);
            execute(&mut release, &cmd).unwrap();
        }

        assert_eq!(
            release.handle(&change(&release, ReleaseStatus::Delivered)).unwrap_err(),
            DomainError::AlreadyDelivered
        );
    }

    #[test]
    fn schedule_rejects_non_positive_quantity() {
        let release_id = ReleaseId::generate();
        let release = Release::empty(release_id);
        let err = release
            .handle(&ReleaseCommand::ScheduleRelease(ScheduleRelease {
                release_id,
                line_id: OrderLineId::generate(),
                item_id: ItemId::generate(),
                quantity: 0,
                scheduled_delivery_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("shipped".parse::<ReleaseStatus>(), Ok(ReleaseStatus::Shipped));
        assert!("LOST".parse::<ReleaseStatus>().is_err());
    }
}
