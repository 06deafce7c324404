use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kasaku_core::{AggregateId, TenantId, UserId};

/// Where a committed event sits and who caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    /// Position inside the `(tenant_id, aggregate_id)` stream, starting at 1.
    pub sequence_number: u64,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// A committed event plus its stream metadata; the unit published on the bus
/// and fed to read models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    #[serde(flatten)]
    metadata: EventMetadata,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(metadata: EventMetadata, payload: E) -> Self {
        Self { metadata, payload }
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn event_id(&self) -> Uuid {
        self.metadata.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.metadata.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.metadata.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.metadata.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.metadata.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.metadata.sequence_number
    }

    pub fn actor(&self) -> UserId {
        self.metadata.actor
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
