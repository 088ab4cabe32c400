use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockline_core::Aggregate;
use stockline_events::EventEnvelope;
use stockline_inventory::ItemId;
use stockline_orders::{OrderLineId, Release, ReleaseEvent, ReleaseId, ReleaseStatus};

use super::{ProjectionError, StreamCursors, decode};
use crate::read_model::ReadStore;

/// Queryable release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseView {
    pub release_id: ReleaseId,
    pub line_id: OrderLineId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub status: ReleaseStatus,
    pub scheduled_delivery_date: NaiveDate,
    pub shipped_at: Option<DateTime<Utc>>,
    pub actual_delivery_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Per-item quantities committed to releases but not yet delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockPosition {
    /// Σ quantity of PENDING releases.
    pub reserved: i64,
    /// Σ quantity of SHIPPED releases.
    pub in_transit: i64,
}

/// Exact running sums behind a [`StockPosition`].
///
/// Many releases of one item may together exceed `i64::MAX` (one line per
/// order, each up to `i64::MAX`), so sums are kept in `i128`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionTally {
    reserved: i128,
    in_transit: i128,
}

impl PositionTally {
    /// Reported position, clamped to the `i64` range.
    pub fn position(&self) -> StockPosition {
        StockPosition {
            reserved: clamp(self.reserved),
            in_transit: clamp(self.in_transit),
        }
    }
}

fn clamp(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// Release tracking projection: release views plus reserved/in-transit per item.
#[derive(Debug)]
pub struct ReleaseTrackingProjection<R, P>
where
    R: ReadStore<ReleaseId, ReleaseView>,
    P: ReadStore<ItemId, PositionTally>,
{
    releases: R,
    positions: P,
    cursors: StreamCursors,
}

impl<R, P> Default for ReleaseTrackingProjection<R, P>
where
    R: ReadStore<ReleaseId, ReleaseView> + Default,
    P: ReadStore<ItemId, PositionTally> + Default,
{
    fn default() -> Self {
        Self::new(R::default(), P::default())
    }
}

impl<R, P> ReleaseTrackingProjection<R, P>
where
    R: ReadStore<ReleaseId, ReleaseView>,
    P: ReadStore<ItemId, PositionTally>,
{
    pub fn new(releases: R, positions: P) -> Self {
        Self {
            releases,
            positions,
            cursors: StreamCursors::default(),
        }
    }

    pub fn get(&self, release_id: &ReleaseId) -> Option<ReleaseView> {
        self.releases.get(release_id)
    }

    /// Releases of one line, oldest first.
    pub fn for_line(&self, line_id: OrderLineId) -> Vec<ReleaseView> {
        let mut views: Vec<ReleaseView> = self
            .releases
            .list()
            .into_iter()
            .filter(|r| r.line_id == line_id)
            .collect();
        views.sort_by_key(|r| (r.created_at, r.release_id));
        views
    }

    /// Releases for one item, any status.
    pub fn for_item(&self, item_id: ItemId) -> Vec<ReleaseView> {
        let mut views: Vec<ReleaseView> = self
            .releases
            .list()
            .into_iter()
            .filter(|r| r.item_id == item_id)
            .collect();
        views.sort_by_key(|r| (r.created_at, r.release_id));
        views
    }

    pub fn position(&self, item_id: &ItemId) -> StockPosition {
        self.positions.get(item_id).unwrap_or_default().position()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != Release::AGGREGATE_TYPE {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }

        match decode::<ReleaseEvent>(envelope)? {
            ReleaseEvent::ReleaseScheduled(e) => {
                self.releases.upsert(
                    e.release_id,
                    ReleaseView {
                        release_id: e.release_id,
                        line_id: e.line_id,
                        item_id: e.item_id,
                        quantity: e.quantity,
                        status: ReleaseStatus::Pending,
                        scheduled_delivery_date: e.scheduled_delivery_date,
                        shipped_at: None,
                        actual_delivery_date: None,
                        created_at: e.occurred_at,
                    },
                );
                self.shift(e.item_id, e.quantity, 0);
            }
            ReleaseEvent::ReleaseShipped(e) => {
                self.releases.update(e.release_id, |view| {
                    view.map(|mut v| {
                        v.status = ReleaseStatus::Shipped;
                        v.shipped_at = Some(e.occurred_at);
                        v
                    })
                });
                self.shift(e.item_id, -e.quantity, e.quantity);
            }
            ReleaseEvent::ReleaseDelivered(e) => {
                self.releases.update(e.release_id, |view| {
                    view.map(|mut v| {
                        v.status = ReleaseStatus::Delivered;
                        v.actual_delivery_date = Some(e.actual_delivery_date);
                        v
                    })
                });
                self.shift(e.item_id, 0, -e.quantity);
            }
        }

        self.cursors.advance(envelope)
    }

    fn shift(&self, item_id: ItemId, reserved: i64, in_transit: i64) {
        self.positions.update(item_id, |p| {
            let mut p = p.unwrap_or_default();
            p.reserved += i128::from(reserved);
            p.in_transit += i128::from(in_transit);
            Some(p)
        });
    }

    pub fn clear(&self) -> Result<(), ProjectionError> {
        self.releases.clear();
        self.positions.clear();
        self.cursors.clear()
    }
}
