//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! load stream(s) ─▶ rehydrate ─▶ handle (pure) ─▶ stage in a UnitOfWork
//!                                                     │
//!            publish ◀── project ◀── atomic multi-stream append
//! ```
//!
//! A [`UnitOfWork`] collects the decided events of every aggregate touched by
//! one business operation (e.g. an order, its materials and a cash-book entry
//! on completion) and commits them in a single `append_batch`, each stream
//! guarded by the exact version it was loaded at.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use kasaku_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId};
use kasaku_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Business rule rejection (deterministic).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure (stale aggregate version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-tenant or cross-stream data surfaced where it must not.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// Historical payload no longer matches the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// A rehydrated aggregate plus the events decided against it so far.
///
/// Commands run through [`Tracked::execute`] mutate the in-memory state, so a
/// second command sees the first one's effect (two recipe lines consuming the
/// same material, for instance). The stream version at load time is kept for
/// the optimistic check on commit.
#[derive(Debug)]
pub struct Tracked<A: Aggregate> {
    aggregate_id: AggregateId,
    aggregate: A,
    loaded_version: u64,
    pending: Vec<A::Event>,
}

impl<A: Aggregate> Tracked<A> {
    pub fn aggregate(&self) -> &A {
        &self.aggregate
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn loaded_version(&self) -> u64 {
        self.loaded_version
    }

    pub fn pending(&self) -> &[A::Event] {
        &self.pending
    }

    /// Decide and apply one command; on error nothing changes.
    pub fn execute(&mut self, command: &A::Command) -> Result<(), A::Error> {
        let events = kasaku_events::execute(&mut self.aggregate, command)?;
        self.pending.extend(events);
        Ok(())
    }
}

/// Events of one business operation, staged per stream, committed together.
#[derive(Debug)]
pub struct UnitOfWork {
    tenant_id: TenantId,
    appends: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            appends: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    /// Stage the pending events of `tracked` (no-op when it has none).
    pub fn stage<A>(
        &mut self,
        aggregate_type: &str,
        tracked: Tracked<A>,
    ) -> Result<(), DispatchError>
    where
        A: Aggregate,
        A::Event: kasaku_events::Event + Serialize,
    {
        if tracked.pending.is_empty() {
            return Ok(());
        }
        let events = tracked
            .pending
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    self.tenant_id,
                    tracked.aggregate_id,
                    aggregate_type,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.appends.push(StreamAppend {
            aggregate_id: tracked.aggregate_id,
            expected_version: ExpectedVersion::Exact(tracked.loaded_version),
            events,
        });
        Ok(())
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests and dev wiring use the in-memory
/// implementations while the pipeline stays the same.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate one aggregate (a fresh instance if the stream is empty).
    ///
    /// A stream written by another aggregate type also yields a fresh
    /// instance at version 0: the id does not name an `aggregate_type`, and
    /// staging anything on it fails the version check at commit.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Tracked<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let mut history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        if history
            .first()
            .is_some_and(|e| e.aggregate_type != aggregate_type)
        {
            tracing::debug!(
                tenant_id = %tenant_id,
                aggregate_id = %aggregate_id,
                expected = aggregate_type,
                found = %history[0].aggregate_type,
                "stream belongs to another aggregate type"
            );
            history.clear();
        }

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        Ok(Tracked {
            aggregate_id,
            loaded_version: stream_version(&history),
            aggregate,
            pending: Vec::new(),
        })
    }

    /// Append every staged stream atomically. Nothing is published here.
    pub fn commit(&self, uow: UnitOfWork) -> Result<Vec<StoredEvent>, DispatchError> {
        if uow.is_empty() {
            return Ok(vec![]);
        }
        let committed = self.store.append_batch(uow.tenant_id, uow.appends)?;
        tracing::debug!(
            tenant_id = %uow.tenant_id,
            events = committed.len(),
            "unit of work committed"
        );
        Ok(committed)
    }

    /// Publish committed events to the bus.
    ///
    /// The events are already durable, so a bus failure is logged and not
    /// surfaced; subscribers can catch up from the store.
    pub fn publish(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?e,
                    "event publication failed after commit"
                );
            }
        }
    }

    /// Single-aggregate shortcut: load, handle, commit, publish.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: kasaku_events::Event + Serialize + DeserializeOwned,
    {
        let mut tracked = self.load(tenant_id, aggregate_id, aggregate_type, make_aggregate)?;
        tracked.execute(&command)?;

        let mut uow = UnitOfWork::new(tenant_id);
        uow.stage(aggregate_type, tracked)?;
        let committed = self.commit(uow)?;
        self.publish(&committed);
        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A buggy backend must not leak another tenant's stream into a decision.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != stream[0].aggregate_type {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream mixes aggregate types at index {idx}"
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "gap or reorder in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    debug_assert_eq!(aggregate.version(), stream_version(history));
    Ok(())
}
