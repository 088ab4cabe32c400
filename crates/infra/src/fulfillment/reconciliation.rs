//! Delivery reconciliation and consistency audits.
//!
//! Delivering a release touches three streams: the release (status), the
//! item (an OUT movement referencing the release) and the line (delivered
//! quantity). They are committed together or not at all.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use stockline_core::DomainError;
use stockline_events::{EventBus, EventEnvelope};
use stockline_inventory::{
    Deduct, InventoryCommand, ItemId, MovementDirection, ReferenceType, replay_balance,
};
use stockline_orders::{
    ChangeStatus, OrderLineCommand, OrderLineId, RecordDelivery, ReleaseCommand, ReleaseId,
    ReleaseStatus,
};

use super::registry::{item_loader, line_loader};
use super::scheduler::{release_loader, release_view};
use super::{FulfillmentError, FulfillmentResult, FulfillmentService};
use crate::event_store::EventStore;
use crate::projections::ReleaseView;

/// Cached line counters against the sums of the line's releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAudit {
    pub line_id: OrderLineId,
    pub released_quantity: i64,
    pub delivered_quantity: i64,
    /// Σ quantity over every release of the line.
    pub releases_total: i64,
    /// Σ quantity over DELIVERED releases of the line.
    pub delivered_total: i64,
    pub consistent: bool,
}

/// Item balance against its replayed ledger and delivered releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAudit {
    pub item_id: ItemId,
    pub available_stock: i64,
    /// Balance obtained by replaying the ledger from zero, if the replay succeeded.
    pub replayed_balance: Option<i64>,
    pub replay_error: Option<String>,
    /// DELIVERED releases without a matching `Release` OUT movement.
    pub unmatched_releases: Vec<ReleaseId>,
    /// DELIVERED releases referenced by more than one movement.
    pub duplicated_releases: Vec<ReleaseId>,
    pub consistent: bool,
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// SHIPPED → DELIVERED with its stock deduction and line update.
    ///
    /// Status is re-checked on the freshly loaded release in every attempt, so
    /// the loser of a concurrent delivery gets `AlreadyDelivered`. Insufficient
    /// stock aborts the whole unit; the release stays SHIPPED.
    #[instrument(skip(self))]
    pub(super) fn deliver_release(&self, release_id: ReleaseId) -> FulfillmentResult<ReleaseView> {
        let occurred_at = Utc::now();
        let movement_id = Uuid::now_v7();

        let committed = self
            .dispatcher
            .transact(|uow| {
                let mut release = uow.load(release_id.aggregate_id(), release_loader)?;
                uow.execute(
                    release_id.aggregate_id(),
                    &mut release,
                    &ReleaseCommand::ChangeStatus(ChangeStatus {
                        release_id,
                        status: ReleaseStatus::Delivered,
                        occurred_at,
                    }),
                )?;

                let (Some(line_id), Some(item_id)) = (release.line_id(), release.item_id()) else {
                    return Err(DomainError::invariant("delivered release without line or item").into());
                };

                let mut item = uow.load(item_id.aggregate_id(), item_loader)?;
                uow.execute(
                    item_id.aggregate_id(),
                    &mut item,
                    &InventoryCommand::Deduct(Deduct {
                        item_id,
                        movement_id,
                        quantity: release.quantity(),
                        reference_type: ReferenceType::Release,
                        reference_id: release_id.to_string(),
                        occurred_at,
                    }),
                )?;

                let mut line = uow.load(line_id.aggregate_id(), line_loader)?;
                uow.execute(
                    line_id.aggregate_id(),
                    &mut line,
                    &OrderLineCommand::RecordDelivery(RecordDelivery {
                        line_id,
                        release_id,
                        quantity: release.quantity(),
                        occurred_at,
                    }),
                )?;

                Ok((release, item.available_stock(), line.delivered_quantity()))
            })
            .map_err(|err| self.rejected("deliver_release", err))?;

        let (release, available_stock, delivered_quantity) = committed.value;
        info!(
            %release_id,
            %movement_id,
            quantity = release.quantity(),
            available_stock,
            delivered_quantity,
            "release delivered and stock reconciled"
        );
        release_view(&release)
    }

    /// Compare a line's cached counters with its releases.
    pub fn audit_line(&self, line_id: OrderLineId) -> FulfillmentResult<LineAudit> {
        let line = self.dispatcher.load(line_id.aggregate_id(), line_loader)?;
        if !line.exists() {
            return Err(FulfillmentError::NotFound("order line"));
        }

        let releases = self.read_models.releases.for_line(line_id);
        let releases_total: i128 = releases.iter().map(|r| i128::from(r.quantity)).sum();
        let delivered_total: i128 = releases
            .iter()
            .filter(|r| r.status == ReleaseStatus::Delivered)
            .map(|r| i128::from(r.quantity))
            .sum();

        let consistent = i128::from(line.released_quantity()) == releases_total
            && i128::from(line.delivered_quantity()) == delivered_total
            && i128::from(line.remaining_quantity()) == i128::from(line.total_quantity()) - releases_total;

        Ok(LineAudit {
            line_id,
            released_quantity: line.released_quantity(),
            delivered_quantity: line.delivered_quantity(),
            releases_total: saturate(releases_total),
            delivered_total: saturate(delivered_total),
            consistent,
        })
    }

    /// Replay an item's ledger and match delivered releases to movements.
    pub fn audit_item(&self, item_id: ItemId) -> FulfillmentResult<ItemAudit> {
        let (item, movements) = self.item_ledger(item_id)?;

        let (replayed_balance, replay_error) = match replay_balance(&movements) {
            Ok(balance) => (Some(balance), None),
            Err(err) => (None, Some(err.to_string())),
        };

        let mut references: HashMap<&str, usize> = HashMap::new();
        for m in &movements {
            if m.reference_type == ReferenceType::Release && m.direction == MovementDirection::Out {
                *references.entry(m.reference_id.as_str()).or_default() += 1;
            }
        }

        let mut unmatched_releases = Vec::new();
        let mut duplicated_releases = Vec::new();
        for release in self.read_models.releases.for_item(item_id) {
            if release.status != ReleaseStatus::Delivered {
                continue;
            }
            match references.get(release.release_id.to_string().as_str()) {
                None => unmatched_releases.push(release.release_id),
                Some(1) => {}
                Some(_) => duplicated_releases.push(release.release_id),
            }
        }

        let consistent = replayed_balance == Some(item.available_stock())
            && unmatched_releases.is_empty()
            && duplicated_releases.is_empty();

        Ok(ItemAudit {
            item_id,
            available_stock: item.available_stock(),
            replayed_balance,
            replay_error,
            unmatched_releases,
            duplicated_releases,
            consistent,
        })
    }
}

/// Clamp an exact sum into the reported `i64` range.
fn saturate(total: i128) -> i64 {
    i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
}
