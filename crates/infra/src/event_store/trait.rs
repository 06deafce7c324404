use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use kasaku_core::{AggregateId, ExpectedVersion, TenantId, UserId};
use kasaku_events::{EventEnvelope, EventMetadata};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`], which
/// serializes the payload and copies the metadata needed to read it back
/// (event type, schema version, actor, business time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream.
///
/// `sequence_number` is the position inside the `(tenant_id, aggregate_id)`
/// stream, starting at 1 with no gaps. `global_position` orders every event of
/// the store in commit order; events of one atomic batch are contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub sequence_number: u64,
    pub global_position: u64,

    pub event_type: String,
    pub event_version: u32,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EventMetadata {
                event_id: self.event_id,
                tenant_id: self.tenant_id,
                aggregate_id: self.aggregate_id,
                aggregate_type: self.aggregate_type.clone(),
                event_type: self.event_type.clone(),
                sequence_number: self.sequence_number,
                actor: self.actor,
                occurred_at: self.occurred_at,
            },
            self.payload.clone(),
        )
    }
}

/// Events for one stream inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Event store operation error.
///
/// Infrastructure failures only; business rule violations never reach the store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event store lock poisoned")]
    Poisoned,
}

/// Append-only, tenant-scoped event store.
///
/// Streams are keyed by `(tenant_id, aggregate_id)`. Implementations must:
/// - enforce tenant isolation on reads and writes
/// - check every stream's `ExpectedVersion` before writing anything
/// - assign per-stream sequence numbers `current + 1, current + 2, ...`
/// - persist a batch entirely or not at all
pub trait EventStore: Send + Sync {
    /// Atomically append to several streams of one tenant.
    ///
    /// Either every stream passes its version check and all events are
    /// stored, or nothing is stored. Returned events are in batch order.
    fn append_batch(
        &self,
        tenant_id: TenantId,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a tenant + aggregate (empty if it does not exist).
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every event of a tenant in commit order (read-model rebuilds).
    fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Append events to a single aggregate stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let tenant_id = first.tenant_id;
        let aggregate_id = first.aggregate_id;
        self.append_batch(
            tenant_id,
            vec![StreamAppend {
                aggregate_id,
                expected_version,
                events,
            }],
        )
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append_batch(
        &self,
        tenant_id: TenantId,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_batch(tenant_id, appends)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_tenant(tenant_id)
    }
}

impl UncommittedEvent {
    /// Wrap a typed domain event with its stream metadata.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: kasaku_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            actor: event.actor(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
