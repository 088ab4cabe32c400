//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! work(uow)
//!   ↓
//! 1. Load streams and rehydrate aggregates
//!   ↓
//! 2. Handle commands (pure decision logic, produces events)
//!   ↓
//! 3. Commit every touched stream atomically (optimistic expected versions)
//!   ↓  on Concurrency: drop everything, go back to 1 (bounded)
//! 4. Bring projections up to date
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! A conflicting commit writes nothing, so re-running the unit of work against
//! fresh state is always safe. Store outages are returned as-is and never retried.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockline_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use stockline_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
use crate::projections::{ProjectionError, Projector};

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Business rejection decided by an aggregate (deterministic).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency kept failing after the retry budget.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Historical payload could not be read back into its event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Post-commit propagation failed; the commit itself stands.
    #[error("post-commit propagation failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<ProjectionError> for DispatchError {
    fn from(value: ProjectionError) -> Self {
        DispatchError::Publish(value.to_string())
    }
}

/// Result of a successful unit of work.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<StoredEvent>,
    /// Number of conflict retries it took.
    pub retries: u32,
}

/// Pending writes of one attempt, collected per stream.
///
/// Loads always read committed state; `execute` records the aggregate's
/// version before the command as the stream's expected version.
pub struct UnitOfWork<'s> {
    store: &'s dyn EventStore,
    pending: Vec<StreamAppend>,
}

impl<'s> UnitOfWork<'s> {
    fn new(store: &'s dyn EventStore) -> Self {
        Self {
            store,
            pending: Vec::new(),
        }
    }

    /// Load and rehydrate an aggregate from its stream.
    pub fn load<A>(&self, aggregate_id: AggregateId, make: impl FnOnce(AggregateId) -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load_aggregate(self.store, aggregate_id, make)
    }

    /// Decide, apply, and stage the events for commit.
    pub fn execute<A>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate: &mut A,
        command: &A::Command,
    ) -> Result<Vec<A::Event>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize,
    {
        let before = aggregate.version();
        let decided = aggregate.handle(command)?;
        for ev in &decided {
            aggregate.apply(ev);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, A::AGGREGATE_TYPE, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        match self.pending.iter_mut().find(|p| p.aggregate_id == aggregate_id) {
            Some(append) => append.events.extend(uncommitted),
            None => self.pending.push(StreamAppend {
                aggregate_id,
                aggregate_type: A::AGGREGATE_TYPE.to_string(),
                expected_version: ExpectedVersion::Exact(before),
                events: uncommitted,
            }),
        }

        Ok(decided)
    }

    /// Require `aggregate`'s stream to still be at its loaded version when
    /// this unit commits, without appending to it.
    ///
    /// Use it for aggregates a decision reads but does not change.
    pub fn guard<A: Aggregate>(&mut self, aggregate_id: AggregateId, aggregate: &A) {
        if self.pending.iter().any(|p| p.aggregate_id == aggregate_id) {
            return;
        }
        self.pending.push(StreamAppend {
            aggregate_id,
            aggregate_type: A::AGGREGATE_TYPE.to_string(),
            expected_version: ExpectedVersion::Exact(aggregate.version()),
            events: Vec::new(),
        });
    }

    fn into_appends(self) -> Vec<StreamAppend> {
        self.pending
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests run on the in-memory pair and a
/// durable backend can be swapped in without touching domain code.
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    projectors: Vec<Arc<dyn Projector>>,
    max_conflict_retries: u32,
}

impl<S, B> core::fmt::Debug for CommandDispatcher<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("projectors", &self.projectors.len())
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            projectors: Vec::new(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Register a projector that is brought up to date after every commit.
    pub fn with_projector(mut self, projector: Arc<dyn Projector>) -> Self {
        self.projectors.push(projector);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate outside any unit of work (reads).
    pub fn load<A>(&self, aggregate_id: AggregateId, make: impl FnOnce(AggregateId) -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load_aggregate(&self.store, aggregate_id, make)
    }

    /// Run `work` and commit what it staged, retrying on concurrency conflicts.
    ///
    /// `work` may run several times; it must derive everything from the
    /// aggregates it loads through the unit of work.
    pub fn transact<T>(
        &self,
        mut work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T, DispatchError>,
    ) -> Result<Committed<T>, DispatchError> {
        let mut retries = 0u32;
        loop {
            let mut uow = UnitOfWork::new(&self.store);
            let value = work(&mut uow)?;

            match self.store.commit(uow.into_appends()) {
                Ok(events) => {
                    self.after_commit(&events)?;
                    return Ok(Committed { value, events, retries });
                }
                Err(EventStoreError::Concurrency(msg)) if retries < self.max_conflict_retries => {
                    retries += 1;
                    tracing::debug!(retries, reason = %msg, "commit conflicted; retrying unit of work");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Dispatch one command against one aggregate.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        command: A::Command,
        make: impl Fn(AggregateId) -> A,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        self.transact(|uow| {
            let mut aggregate = uow.load(aggregate_id, &make)?;
            uow.execute(aggregate_id, &mut aggregate, &command)?;
            Ok(aggregate)
        })
    }

    fn after_commit(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        if committed.is_empty() {
            return Ok(());
        }

        // Projections first so a caller reading right after sees its own write.
        for projector in &self.projectors {
            projector.catch_up(&self.store)?;
        }

        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(e.to_string()))?;
        }

        Ok(())
    }
}

fn load_aggregate<A>(
    store: &dyn EventStore,
    aggregate_id: AggregateId,
    make: impl FnOnce(AggregateId) -> A,
) -> Result<A, DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(aggregate_id)?;
    validate_loaded_stream(aggregate_id, &history)?;

    let mut aggregate = make(aggregate_id);
    for stored in &history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number)))?;
        aggregate.apply(&ev);
    }

    Ok(aggregate)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    // The stream must be exactly 1..=n for this aggregate, or the version
    // expectation derived from it would be wrong.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number != idx as u64 + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap or reorder in loaded stream (index {idx}, sequence_number {})",
                e.sequence_number
            ))));
        }
    }
    Ok(())
}
