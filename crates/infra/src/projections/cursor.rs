//! Per-stream projection cursors.
//!
//! Track the last applied `sequence_number` per `(tenant, aggregate)` so that
//! at-least-once delivery stays idempotent.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use kasaku_core::{AggregateId, TenantId};
use kasaku_events::EventEnvelope;

use super::ProjectionError;

#[derive(Debug, Default)]
pub struct StreamCursors {
    cursors: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.cursors
            .read()
            .ok()
            .and_then(|c| c.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    /// `Ok(false)` for duplicates/replays, an error for gaps.
    ///
    /// The first envelope of a stream may carry any positive sequence number;
    /// after that increments must be exactly one.
    pub fn should_apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let seq = envelope.sequence_number();
        let last = self.position(envelope.tenant_id(), envelope.aggregate_id());

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    /// Record a successfully applied envelope.
    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                (envelope.tenant_id(), envelope.aggregate_id()),
                envelope.sequence_number(),
            );
        }
    }

    pub fn reset_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|(t, _), _| *t != tenant_id);
        }
    }
}
