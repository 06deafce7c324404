use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_core::TenantId;
use kasaku_events::{Event, EventEnvelope};
use kasaku_manufacturing::{BomId, ProductionEvent, ProductionOrderId, ProductionStatus};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_same_stream};
use crate::read_model::TenantStore;

/// Stream type of production orders.
pub const AGGREGATE_TYPE: &str = "manufacturing.production_order";

/// Queryable production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderView {
    pub order_id: ProductionOrderId,
    pub bom_id: BomId,
    pub order_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub quantity: u32,
    pub total_cost: Decimal,
    pub status: ProductionStatus,
    pub completed_date: Option<NaiveDate>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Production orders projection.
#[derive(Debug)]
pub struct ProductionOrdersProjection<S>
where
    S: TenantStore<ProductionOrderId, ProductionOrderView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ProductionOrdersProjection<S>
where
    S: TenantStore<ProductionOrderId, ProductionOrderView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, order_id: &ProductionOrderId) -> Option<ProductionOrderView> {
        self.store.get(tenant_id, order_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductionOrderView> {
        self.store.list(tenant_id)
    }

    /// PLANNED or IN_PROGRESS orders pointing at `bom_id`.
    pub fn active_for_bom(&self, tenant_id: TenantId, bom_id: BomId) -> Vec<ProductionOrderView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|o| o.bom_id == bom_id && o.status.is_active())
            .collect()
    }

    fn apply(&self, tenant_id: TenantId, event: ProductionEvent) {
        match event {
            ProductionEvent::ProductionPlanned(e) => {
                self.store.upsert(
                    tenant_id,
                    e.order_id,
                    ProductionOrderView {
                        order_id: e.order_id,
                        bom_id: e.bom_id,
                        order_date: e.order_date,
                        target_date: e.target_date,
                        quantity: e.quantity,
                        total_cost: e.total_cost,
                        status: ProductionStatus::Planned,
                        completed_date: None,
                        notes: e.notes,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ProductionEvent::ProductionRevised(e) => {
                self.modify(tenant_id, e.order_id, e.occurred_at, |view| {
                    view.bom_id = e.bom_id;
                    view.quantity = e.quantity;
                    view.total_cost = e.total_cost;
                    view.target_date = e.target_date;
                    view.notes = e.notes;
                });
            }
            ProductionEvent::ProductionStarted(e) => {
                self.modify(tenant_id, e.order_id, e.occurred_at, |view| {
                    view.status = ProductionStatus::InProgress;
                });
            }
            ProductionEvent::ProductionCompleted(e) => {
                self.modify(tenant_id, e.order_id, e.occurred_at, |view| {
                    view.status = ProductionStatus::Completed;
                    view.completed_date = Some(e.completed_on);
                });
            }
            ProductionEvent::ProductionCancelled(e) => {
                self.modify(tenant_id, e.order_id, e.occurred_at, |view| {
                    view.status = ProductionStatus::Cancelled;
                });
            }
            ProductionEvent::ProductionOrderDeleted(e) => {
                self.store.remove(tenant_id, &e.order_id);
            }
        }
    }

    fn modify(
        &self,
        tenant_id: TenantId,
        order_id: ProductionOrderId,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut ProductionOrderView),
    ) {
        if let Some(mut view) = self.store.get(tenant_id, &order_id) {
            change(&mut view);
            view.updated_at = at;
            self.store.upsert(tenant_id, order_id, view);
        }
    }
}

impl<S> Projection for ProductionOrdersProjection<S>
where
    S: TenantStore<ProductionOrderId, ProductionOrderView>,
{
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let event: ProductionEvent = decode(envelope)?;
        let tenant_id = event.tenant_id();
        ensure_same_stream(envelope, tenant_id, event.order_id().0)?;

        self.apply(tenant_id, event);
        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.reset_tenant(tenant_id);
    }
}
