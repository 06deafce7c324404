use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_core::TenantId;
use kasaku_events::{Event, EventEnvelope};
use kasaku_inventory::InventoryItemId;
use kasaku_manufacturing::{BomEvent, BomId, BomLine};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_same_stream};
use crate::read_model::TenantStore;

/// Stream type of bills of materials.
pub const AGGREGATE_TYPE: &str = "manufacturing.bom";

/// Queryable recipe with its stored cost snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomView {
    pub bom_id: BomId,
    pub product_name: String,
    pub product_code: Option<String>,
    pub lines: Vec<BomLine>,
    pub estimated_cost: Decimal,
    pub selling_price: Option<Decimal>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BomView {
    pub fn margin(&self) -> Option<Decimal> {
        self.selling_price.map(|p| p - self.estimated_cost)
    }

    pub fn uses_material(&self, material_id: InventoryItemId) -> bool {
        self.lines.iter().any(|l| l.material_id == material_id)
    }

    /// Summed `qty_required` of a material over all lines (duplicates add up).
    pub fn qty_required(&self, material_id: InventoryItemId) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.material_id == material_id)
            .map(|l| l.qty_required)
            .sum()
    }

    /// Case-insensitive match on product name or code.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.product_name.to_lowercase().contains(&needle)
            || self
                .product_code
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&needle))
    }
}

/// BOM registry projection.
#[derive(Debug)]
pub struct BomRegistryProjection<S>
where
    S: TenantStore<BomId, BomView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> BomRegistryProjection<S>
where
    S: TenantStore<BomId, BomView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, bom_id: &BomId) -> Option<BomView> {
        self.store.get(tenant_id, bom_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<BomView> {
        self.store.list(tenant_id)
    }

    /// Recipes with at least one line on `material_id`.
    pub fn using_material(&self, tenant_id: TenantId, material_id: InventoryItemId) -> Vec<BomView> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|b| b.uses_material(material_id))
            .collect()
    }

    fn apply(&self, tenant_id: TenantId, event: BomEvent) {
        match event {
            BomEvent::BomCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.bom_id,
                    BomView {
                        bom_id: e.bom_id,
                        product_name: e.product_name,
                        product_code: e.product_code,
                        lines: e.lines,
                        estimated_cost: e.estimated_cost,
                        selling_price: e.selling_price,
                        notes: e.notes,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            BomEvent::BomDetailsUpdated(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.bom_id) {
                    view.product_name = e.product_name;
                    view.product_code = e.product_code;
                    view.selling_price = e.selling_price;
                    view.notes = e.notes;
                    view.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.bom_id, view);
                }
            }
            BomEvent::BomLinesReplaced(e) => {
                if let Some(mut view) = self.store.get(tenant_id, &e.bom_id) {
                    view.lines = e.lines;
                    view.estimated_cost = e.estimated_cost;
                    view.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.bom_id, view);
                }
            }
            BomEvent::BomDeleted(e) => {
                self.store.remove(tenant_id, &e.bom_id);
            }
        }
    }
}

impl<S> Projection for BomRegistryProjection<S>
where
    S: TenantStore<BomId, BomView>,
{
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let event: BomEvent = decode(envelope)?;
        let tenant_id = event.tenant_id();
        ensure_same_stream(envelope, tenant_id, event.bom_id().0)?;

        self.apply(tenant_id, event);
        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.reset_tenant(tenant_id);
    }
}
