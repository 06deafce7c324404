use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use kasaku_core::{AggregateId, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. One write lock covers the whole batch, which is
/// what makes multi-stream appends atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: Option<&Vec<StoredEvent>>) -> u64 {
        stream
            .and_then(|s| s.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }

    fn validate(tenant_id: TenantId, appends: &[StreamAppend]) -> Result<(), EventStoreError> {
        let mut seen = HashSet::new();
        for append in appends {
            if !seen.insert(append.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one batch",
                    append.aggregate_id
                )));
            }
            let Some(first) = append.events.first() else {
                return Err(EventStoreError::InvalidAppend(format!(
                    "empty append for stream {}",
                    append.aggregate_id
                )));
            };
            for (idx, e) in append.events.iter().enumerate() {
                if e.tenant_id != tenant_id {
                    return Err(EventStoreError::TenantIsolation(format!(
                        "event for stream {} belongs to another tenant (index {idx})",
                        append.aggregate_id
                    )));
                }
                if e.aggregate_id != append.aggregate_id {
                    return Err(EventStoreError::InvalidAppend(format!(
                        "event targets {} inside the append for {} (index {idx})",
                        e.aggregate_id, append.aggregate_id
                    )));
                }
                if e.aggregate_type != first.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "append for {} mixes aggregate types (index {idx})",
                        append.aggregate_id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl EventStore for InMemoryEventStore {
    fn append_batch(
        &self,
        tenant_id: TenantId,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if appends.is_empty() {
            return Ok(vec![]);
        }
        Self::validate(tenant_id, &appends)?;

        let mut inner = self.inner.write().map_err(|_| EventStoreError::Poisoned)?;

        // Check every stream before writing any of them.
        for append in &appends {
            let key = StreamKey {
                tenant_id,
                aggregate_id: append.aggregate_id,
            };
            let stream = inner.streams.get(&key);
            let current = Self::current_version(stream);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }
            if let (Some(existing), Some(incoming)) =
                (stream.and_then(|s| s.first()), append.events.first())
            {
                if existing.aggregate_type != incoming.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, incoming.aggregate_type
                    )));
                }
            }
        }

        let mut position = inner.log.len() as u64;
        let mut committed = Vec::new();
        for append in appends {
            let key = StreamKey {
                tenant_id,
                aggregate_id: append.aggregate_id,
            };
            let mut next = Self::current_version(inner.streams.get(&key)) + 1;
            for e in append.events {
                position += 1;
                let stored = StoredEvent {
                    event_id: e.event_id,
                    tenant_id: e.tenant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    global_position: position,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    actor: e.actor,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                inner.streams.entry(key).or_default().push(stored.clone());
                inner.log.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };
        let inner = self.inner.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_tenant(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(inner
            .log
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::UncommittedEvent;
    use chrono::Utc;
    use kasaku_core::{ExpectedVersion, UserId};
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, kind: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: kind.to_string(),
            event_type: format!("{kind}.touched"),
            event_version: 1,
            actor: UserId::new(),
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![event(tenant, b, "inventory.item")], ExpectedVersion::NoStream)
            .unwrap();

        // Second stream is stale: nothing from the batch may land.
        let err = store
            .append_batch(
                tenant,
                vec![
                    StreamAppend {
                        aggregate_id: a,
                        expected_version: ExpectedVersion::NoStream,
                        events: vec![event(tenant, a, "manufacturing.production_order")],
                    },
                    StreamAppend {
                        aggregate_id: b,
                        expected_version: ExpectedVersion::Exact(0),
                        events: vec![event(tenant, b, "inventory.item")],
                    },
                ],
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(tenant, a).unwrap().is_empty());
        assert_eq!(store.load_tenant(tenant).unwrap().len(), 1);
    }

    #[test]
    fn sequences_are_per_stream_and_positions_global() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        let committed = store
            .append_batch(
                tenant,
                vec![
                    StreamAppend {
                        aggregate_id: a,
                        expected_version: ExpectedVersion::NoStream,
                        events: vec![event(tenant, a, "x"), event(tenant, a, "x")],
                    },
                    StreamAppend {
                        aggregate_id: b,
                        expected_version: ExpectedVersion::NoStream,
                        events: vec![event(tenant, b, "y")],
                    },
                ],
            )
            .unwrap();
        let seqs: Vec<_> = committed.iter().map(|e| e.sequence_number).collect();
        let positions: Vec<_> = committed.iter().map(|e| e.global_position).collect();
        assert_eq!(seqs, vec![1, 2, 1]);
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let store = InMemoryEventStore::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let id = AggregateId::new();
        store
            .append(vec![event(t1, id, "x")], ExpectedVersion::Any)
            .unwrap();
        assert!(store.load_stream(t2, id).unwrap().is_empty());
        assert!(store.load_tenant(t2).unwrap().is_empty());

        let err = store
            .append_batch(
                t2,
                vec![StreamAppend {
                    aggregate_id: id,
                    expected_version: ExpectedVersion::Any,
                    events: vec![event(t1, id, "x")],
                }],
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }
}
