use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use stockline_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

#[derive(Debug, Default)]
struct Inner {
    /// Global log in commit order; `global_position` is index + 1.
    log: Vec<StoredEvent>,
    /// Per-stream indexes into `log`.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Inner {
    fn current_version(&self, aggregate_id: &AggregateId) -> u64 {
        self.streams
            .get(aggregate_id)
            .and_then(|idx| idx.last())
            .map(|&i| self.log[i].sequence_number)
            .unwrap_or(0)
    }

    fn stream_type(&self, aggregate_id: &AggregateId) -> Option<&str> {
        self.streams
            .get(aggregate_id)
            .and_then(|idx| idx.first())
            .map(|&i| self.log[i].aggregate_type.as_str())
    }
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock makes every commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
    failing_commits: AtomicUsize,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with `Unavailable` without writing.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn validate(appends: &[StreamAppend]) -> Result<(), EventStoreError> {
        for (idx, append) in appends.iter().enumerate() {
            if appends[..idx].iter().any(|a| a.aggregate_id == append.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one commit",
                    append.aggregate_id
                )));
            }
            for e in &append.events {
                if e.aggregate_id != append.aggregate_id {
                    return Err(EventStoreError::InvalidAppend(format!(
                        "event for {} inside append for {}",
                        e.aggregate_id, append.aggregate_id
                    )));
                }
                if e.aggregate_type != append.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "event type '{}' inside append for '{}'",
                        e.aggregate_type, append.aggregate_type
                    )));
                }
            }
        }
        Ok(())
    }
}

impl EventStore for InMemoryEventStore {
    fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        // Appends without events only guard their stream's version.
        if appends.iter().all(|a| a.events.is_empty()) {
            return Ok(vec![]);
        }
        Self::validate(&appends)?;

        if self.take_injected_failure() {
            return Err(EventStoreError::Unavailable("injected outage".to_string()));
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        // Check every stream before writing anything.
        for append in &appends {
            let current = inner.current_version(&append.aggregate_id);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {} expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }
            if let Some(existing) = inner.stream_type(&append.aggregate_id) {
                if existing != append.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{existing}', attempted append with '{}'",
                        append.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for append in appends.into_iter().filter(|a| !a.events.is_empty()) {
            let mut next = inner.current_version(&append.aggregate_id) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    global_position: inner.log.len() as u64 + 1,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;

                let index = inner.log.len();
                inner.log.push(stored.clone());
                inner.streams.entry(append.aggregate_id).or_default().push(index);
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(inner
            .streams
            .get(&aggregate_id)
            .map(|idx| idx.iter().map(|&i| inner.log[i].clone()).collect())
            .unwrap_or_default())
    }

    fn load_since(&self, after: u64) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let start = usize::try_from(after).unwrap_or(usize::MAX).min(inner.log.len());
        Ok(inner.log[start..].to_vec())
    }
}
