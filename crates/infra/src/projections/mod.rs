//! Projection implementations (read model builders).
//!
//! Projections consume committed envelopes and maintain query-shaped read
//! models. All of them are:
//! - **Rebuildable**: reconstructed from the tenant's event log on demand
//! - **Tenant-isolated**: data is partitioned by tenant
//! - **Idempotent**: envelopes at or below the stream cursor are ignored

pub mod cash_book;
pub mod cursor;
pub mod inventory_catalog;
pub mod bom_registry;
pub mod production_orders;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use kasaku_core::TenantId;
use kasaku_events::EventEnvelope;

pub use bom_registry::{BomRegistryProjection, BomView};
pub use cash_book::{CashBookProjection, CashEntryView};
pub use cursor::StreamCursors;
pub use inventory_catalog::{InventoryCatalogProjection, InventoryItemView};
pub use production_orders::{ProductionOrderView, ProductionOrdersProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {event_type}: {message}")]
    Deserialize { event_type: String, message: String },

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// A read model fed from committed envelopes.
///
/// Envelopes of aggregate types a projection does not own are ignored, so
/// callers can feed every projection the same stream.
pub trait Projection: Send + Sync {
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Forget everything about a tenant (records and cursors) before a replay.
    fn reset_tenant(&self, tenant_id: TenantId);
}

pub(crate) fn decode<E: DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        event_type: envelope.event_type().to_string(),
        message: e.to_string(),
    })
}

/// The payload must belong to the stream the envelope claims.
pub(crate) fn ensure_same_stream(
    envelope: &EventEnvelope<JsonValue>,
    tenant_id: TenantId,
    aggregate_id: kasaku_core::AggregateId,
) -> Result<(), ProjectionError> {
    if tenant_id != envelope.tenant_id() {
        return Err(ProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    if aggregate_id != envelope.aggregate_id() {
        return Err(ProjectionError::TenantIsolation(
            "event id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}
