use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_accounting::{TransactionEvent, TransactionId, TransactionKind};
use kasaku_core::TenantId;
use kasaku_events::{Event, EventEnvelope};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_same_stream};
use crate::read_model::TenantStore;

/// Stream type of cash-book entries.
pub const AGGREGATE_TYPE: &str = "accounting.cash_transaction";

/// One cash-book line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashEntryView {
    pub transaction_id: TransactionId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: String,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

/// Cash book projection (append-only entries).
#[derive(Debug)]
pub struct CashBookProjection<S>
where
    S: TenantStore<TransactionId, CashEntryView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CashBookProjection<S>
where
    S: TenantStore<TransactionId, CashEntryView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    /// Entries of a tenant, oldest first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<CashEntryView> {
        let mut entries = self.store.list(tenant_id);
        entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.recorded_at.cmp(&b.recorded_at)));
        entries
    }
}

impl<S> Projection for CashBookProjection<S>
where
    S: TenantStore<TransactionId, CashEntryView>,
{
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let event: TransactionEvent = decode(envelope)?;
        let tenant_id = event.tenant_id();
        ensure_same_stream(envelope, tenant_id, event.transaction_id().0)?;

        match event {
            TransactionEvent::TransactionRecorded(e) => {
                self.store.upsert(
                    tenant_id,
                    e.transaction_id,
                    CashEntryView {
                        transaction_id: e.transaction_id,
                        date: e.date,
                        description: e.description,
                        amount: e.amount,
                        kind: e.kind,
                        category: e.category,
                        notes: e.notes,
                        recorded_at: e.occurred_at,
                    },
                );
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.reset_tenant(tenant_id);
    }
}
