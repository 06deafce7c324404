use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_core::TenantId;
use kasaku_events::EventEnvelope;
use kasaku_inventory::{InventoryEvent, InventoryItemId};
use kasaku_manufacturing::{MaterialCatalog, MaterialSnapshot};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_same_stream};
use crate::read_model::TenantStore;

/// Stream type of inventory items.
pub const AGGREGATE_TYPE: &str = "inventory.item";

/// Queryable raw-material record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItemView {
    pub item_id: InventoryItemId,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub cost_per_unit: Decimal,
    pub current_stock: Decimal,
    pub min_stock_alert: Decimal,
    pub supplier: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItemView {
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock_alert
    }

    pub fn snapshot(&self) -> MaterialSnapshot {
        MaterialSnapshot {
            id: self.item_id,
            name: self.name.clone(),
            unit: self.unit.clone(),
            cost_per_unit: self.cost_per_unit,
            current_stock: self.current_stock,
        }
    }
}

/// Inventory catalog projection: current details and stock per item.
#[derive(Debug)]
pub struct InventoryCatalogProjection<S>
where
    S: TenantStore<InventoryItemId, InventoryItemView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> InventoryCatalogProjection<S>
where
    S: TenantStore<InventoryItemId, InventoryItemView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, item_id: &InventoryItemId) -> Option<InventoryItemView> {
        self.store.get(tenant_id, item_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InventoryItemView> {
        self.store.list(tenant_id)
    }

    /// Price/stock lookups for one tenant's materials.
    pub fn materials(&self, tenant_id: TenantId) -> TenantMaterials<'_, S> {
        TenantMaterials {
            projection: self,
            tenant_id,
        }
    }

    fn apply(&self, tenant_id: TenantId, event: InventoryEvent) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                let d = e.details;
                self.store.upsert(
                    tenant_id,
                    e.item_id,
                    InventoryItemView {
                        item_id: e.item_id,
                        name: d.name,
                        category: d.category,
                        unit: d.unit,
                        cost_per_unit: d.cost_per_unit,
                        current_stock: e.opening_stock,
                        min_stock_alert: d.min_stock_alert,
                        supplier: d.supplier,
                        notes: d.notes,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            InventoryEvent::ItemUpdated(e) => {
                self.modify(tenant_id, e.item_id, e.occurred_at, |view| {
                    let d = e.details;
                    view.name = d.name;
                    view.category = d.category;
                    view.unit = d.unit;
                    view.cost_per_unit = d.cost_per_unit;
                    view.min_stock_alert = d.min_stock_alert;
                    view.supplier = d.supplier;
                    view.notes = d.notes;
                });
            }
            InventoryEvent::StockCorrected(e) => {
                self.modify(tenant_id, e.item_id, e.occurred_at, |view| {
                    view.current_stock = e.current;
                });
            }
            InventoryEvent::StockAdjusted(e) => {
                self.modify(tenant_id, e.item_id, e.occurred_at, |view| {
                    view.current_stock += e.delta;
                });
            }
            InventoryEvent::StockConsumed(e) => {
                self.modify(tenant_id, e.item_id, e.occurred_at, |view| {
                    view.current_stock -= e.quantity;
                });
            }
            InventoryEvent::ItemDeleted(e) => {
                self.store.remove(tenant_id, &e.item_id);
            }
        }
    }

    fn modify(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut InventoryItemView),
    ) {
        if let Some(mut view) = self.store.get(tenant_id, &item_id) {
            change(&mut view);
            view.updated_at = at;
            self.store.upsert(tenant_id, item_id, view);
        }
    }
}

impl<S> Projection for InventoryCatalogProjection<S>
where
    S: TenantStore<InventoryItemId, InventoryItemView>,
{
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        let event: InventoryEvent = decode(envelope)?;
        let tenant_id = kasaku_events::Event::tenant_id(&event);
        ensure_same_stream(envelope, tenant_id, event.item_id().0)?;

        self.apply(tenant_id, event);
        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset_tenant(&self, tenant_id: TenantId) {
        self.store.clear_tenant(tenant_id);
        self.cursors.reset_tenant(tenant_id);
    }
}

/// [`MaterialCatalog`] over one tenant's inventory read model.
pub struct TenantMaterials<'a, S>
where
    S: TenantStore<InventoryItemId, InventoryItemView>,
{
    projection: &'a InventoryCatalogProjection<S>,
    tenant_id: TenantId,
}

impl<S> MaterialCatalog for TenantMaterials<'_, S>
where
    S: TenantStore<InventoryItemId, InventoryItemView>,
{
    fn material(&self, id: &InventoryItemId) -> Option<MaterialSnapshot> {
        self.projection
            .get(self.tenant_id, id)
            .map(|view| view.snapshot())
    }
}
