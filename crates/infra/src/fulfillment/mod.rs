//! Fulfillment services: the core operations over the order, release and
//! inventory aggregates.
//!
//! Every mutating operation:
//! 1. authorizes the actor against the policy table (before any read)
//! 2. runs as one unit of work on the dispatcher (atomic multi-stream commit,
//!    bounded retry on conflicts)
//! 3. returns a snapshot built from the committed aggregates
//!
//! Reads go straight to the aggregate streams, except listings that need a
//! cross-stream view; those come from the read models kept current by the
//! dispatcher after each commit.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use stockline_auth::{Action, Actor, Policy};
use stockline_events::{EventBus, EventEnvelope, InMemoryEventBus};

use crate::command_dispatcher::CommandDispatcher;
use crate::config::DispatchConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::projections::{FulfillmentReadModels, Projector};

mod error;
mod ledger;
mod reconciliation;
mod registry;
mod scheduler;

pub use error::FulfillmentError;
pub use ledger::{AdjustStock, DeductStock, StockBalance};
pub use reconciliation::{ItemAudit, LineAudit};
pub use registry::{NewLine, OrderHeader, OrderSnapshot};

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

/// Service over an in-memory store and bus (dev, tests).
pub type InMemoryFulfillmentService =
    FulfillmentService<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

/// Blanket-order fulfillment and inventory reconciliation.
#[derive(Debug)]
pub struct FulfillmentService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    read_models: Arc<FulfillmentReadModels>,
    policy: Policy,
}

impl InMemoryFulfillmentService {
    pub fn in_memory(config: &DispatchConfig) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            config,
        )
    }
}

impl<S, B> FulfillmentService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: &DispatchConfig) -> Self {
        let read_models = Arc::new(FulfillmentReadModels::new());
        let dispatcher = CommandDispatcher::new(store, bus)
            .with_max_conflict_retries(config.max_conflict_retries)
            .with_projector(read_models.clone());

        Self {
            dispatcher,
            read_models,
            policy: Policy::default(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn read_models(&self) -> &FulfillmentReadModels {
        &self.read_models
    }

    /// Bring read models up to date with events already in the store
    /// (startup over a non-empty store).
    pub fn catch_up(&self) -> FulfillmentResult<()> {
        self.read_models
            .catch_up(self.dispatcher.store())
            .map_err(|e| FulfillmentError::Store(e.to_string()))
    }

    fn authorize(&self, actor: &Actor, action: Action) -> FulfillmentResult<()> {
        self.policy.check(actor.role, action).map_err(|err| {
            tracing::warn!(principal = %actor.principal_id, role = %actor.role, %action, "authorization denied");
            FulfillmentError::from(err)
        })
    }
}
