//! Release scheduler.

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockline_auth::{Action, Actor};
use stockline_core::{AggregateId, DomainError};
use stockline_events::{EventBus, EventEnvelope};
use stockline_orders::{
    ChangeStatus, CommitRelease, OrderLineCommand, OrderLineId, Release, ReleaseCommand, ReleaseId,
    ReleaseStatus, ScheduleRelease,
};

use super::registry::{line_loader, order_loader};
use super::{FulfillmentError, FulfillmentResult, FulfillmentService};
use crate::event_store::EventStore;
use crate::projections::ReleaseView;

pub(super) fn release_loader(id: AggregateId) -> Release {
    Release::empty(ReleaseId::new(id))
}

pub(super) fn release_view(release: &Release) -> FulfillmentResult<ReleaseView> {
    match (
        release.line_id(),
        release.item_id(),
        release.scheduled_delivery_date(),
        release.created_at(),
    ) {
        (Some(line_id), Some(item_id), Some(scheduled_delivery_date), Some(created_at)) => Ok(ReleaseView {
            release_id: release.id_typed(),
            line_id,
            item_id,
            quantity: release.quantity(),
            status: release.status(),
            scheduled_delivery_date,
            shipped_at: release.shipped_at(),
            actual_delivery_date: release.actual_delivery_date(),
            created_at,
        }),
        _ => Err(FulfillmentError::NotFound("release")),
    }
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Reserve `quantity` of a line's remaining quantity as a new PENDING release.
    ///
    /// The line stream's expected version serializes concurrent releases on
    /// one line, and the order stream is guarded at the version whose status
    /// was checked. A lost race re-reads both and decides again.
    #[instrument(skip(self, actor))]
    pub fn create_release(
        &self,
        actor: &Actor,
        line_id: OrderLineId,
        quantity: i64,
        scheduled_delivery_date: NaiveDate,
    ) -> FulfillmentResult<ReleaseView> {
        self.authorize(actor, Action::ScheduleRelease)?;

        let release_id = ReleaseId::generate();
        let occurred_at = Utc::now();

        let committed = self
            .dispatcher
            .transact(|uow| {
                let mut line = uow.load(line_id.aggregate_id(), line_loader)?;
                let (Some(order_id), Some(item_id)) = (line.order_id(), line.item_id()) else {
                    return Err(DomainError::not_found("order line").into());
                };

                let order = uow.load(order_id.aggregate_id(), order_loader)?;
                if !order.is_active() {
                    return Err(DomainError::validation(format!(
                        "order {} is {}, releases can only be scheduled on active orders",
                        order.order_number(),
                        order.status()
                    ))
                    .into());
                }
                // A cancel or completion committed after this read must fail the release.
                uow.guard(order_id.aggregate_id(), &order);

                uow.execute(
                    line_id.aggregate_id(),
                    &mut line,
                    &OrderLineCommand::CommitRelease(CommitRelease {
                        line_id,
                        release_id,
                        quantity,
                        occurred_at,
                    }),
                )?;

                let mut release = uow.load(release_id.aggregate_id(), release_loader)?;
                uow.execute(
                    release_id.aggregate_id(),
                    &mut release,
                    &ReleaseCommand::ScheduleRelease(ScheduleRelease {
                        release_id,
                        line_id,
                        item_id,
                        quantity,
                        scheduled_delivery_date,
                        occurred_at,
                    }),
                )?;

                Ok((release, line.remaining_quantity()))
            })
            .map_err(|err| self.rejected("create_release", err))?;

        let (release, remaining) = committed.value;
        info!(
            %release_id,
            %line_id,
            quantity,
            remaining,
            retries = committed.retries,
            "release scheduled"
        );
        release_view(&release)
    }

    /// Move a release one step along PENDING → SHIPPED → DELIVERED.
    ///
    /// Delivery goes through reconciliation so the stock deduction, the
    /// release status and the line's delivered quantity commit together.
    #[instrument(skip(self, actor))]
    pub fn update_release_status(
        &self,
        actor: &Actor,
        release_id: ReleaseId,
        status: ReleaseStatus,
    ) -> FulfillmentResult<ReleaseView> {
        if status == ReleaseStatus::Delivered {
            self.authorize(actor, Action::DeliverRelease)?;
            return self.deliver_release(release_id);
        }

        self.authorize(actor, Action::ShipRelease)?;
        let committed = self
            .dispatcher
            .dispatch(
                release_id.aggregate_id(),
                ReleaseCommand::ChangeStatus(ChangeStatus {
                    release_id,
                    status,
                    occurred_at: Utc::now(),
                }),
                release_loader,
            )
            .map_err(|err| self.rejected("update_release_status", err))?;

        info!(%release_id, %status, "release status changed");
        release_view(&committed.value)
    }

    pub fn get_release(&self, release_id: ReleaseId) -> FulfillmentResult<ReleaseView> {
        let release = self.dispatcher.load(release_id.aggregate_id(), release_loader)?;
        if !release.exists() {
            return Err(FulfillmentError::NotFound("release"));
        }
        release_view(&release)
    }

    /// Releases of one line, oldest first.
    pub fn list_releases(&self, line_id: OrderLineId) -> FulfillmentResult<Vec<ReleaseView>> {
        let line = self.dispatcher.load(line_id.aggregate_id(), line_loader)?;
        if !line.exists() {
            return Err(FulfillmentError::NotFound("order line"));
        }
        Ok(self.read_models.releases.for_line(line_id))
    }
}
