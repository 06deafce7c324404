use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_core::{TenantId, UserId};
use kasaku_events::{EventBus, EventEnvelope};
use kasaku_inventory::{
    AdjustStock, CreateItem, DeleteItem, InventoryCommand, InventoryItemId, ItemChanges,
    ItemDetails, StockAction, UpdateItem,
};
use kasaku_manufacturing::BomId;

use super::{ManufacturingService, ServiceError};
use crate::event_store::EventStore;
use crate::projections::inventory_catalog::AGGREGATE_TYPE;
use crate::projections::{InventoryItemView, ProductionOrderView};

/// Input of `create_inventory_item`. Unset fields take the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub cost_per_unit: Decimal,
    pub current_stock: Option<Decimal>,
    pub min_stock_alert: Option<Decimal>,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFilter {
    pub category: Option<String>,
    /// Only items at or below their reorder threshold.
    #[serde(default)]
    pub low_stock: bool,
}

/// A recipe line that consumes the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomUsage {
    pub bom_id: BomId,
    pub product_name: String,
    pub product_code: Option<String>,
    pub qty_required: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItemDetail {
    pub item: InventoryItemView,
    pub used_in_boms: Vec<BomUsage>,
    /// Newest orders whose recipe uses the item.
    pub recent_orders: Vec<ProductionOrderView>,
}

impl<S, B> ManufacturingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Items ordered by stock level (lowest first), then name.
    pub fn list_inventory(
        &self,
        tenant_id: TenantId,
        filter: &InventoryFilter,
    ) -> Vec<InventoryItemView> {
        let mut items: Vec<_> = self
            .inventory
            .list(tenant_id)
            .into_iter()
            .filter(|i| filter.category.as_ref().is_none_or(|c| &i.category == c))
            .filter(|i| !filter.low_stock || i.is_low_stock())
            .collect();
        items.sort_by(|a, b| {
            a.current_stock
                .cmp(&b.current_stock)
                .then_with(|| a.name.cmp(&b.name))
        });
        items
    }

    pub fn low_stock_items(&self, tenant_id: TenantId) -> Vec<InventoryItemView> {
        self.list_inventory(
            tenant_id,
            &InventoryFilter {
                low_stock: true,
                ..InventoryFilter::default()
            },
        )
    }

    pub fn get_inventory_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<InventoryItemDetail, ServiceError> {
        let item = self.inventory_view(tenant_id, item_id)?;

        let boms = self.boms.using_material(tenant_id, item_id);
        let bom_ids: HashSet<BomId> = boms.iter().map(|b| b.bom_id).collect();
        let used_in_boms = boms
            .into_iter()
            .map(|b| BomUsage {
                qty_required: b.qty_required(item_id),
                bom_id: b.bom_id,
                product_name: b.product_name,
                product_code: b.product_code,
            })
            .collect();

        let mut recent_orders: Vec<_> = self
            .orders
            .list(tenant_id)
            .into_iter()
            .filter(|o| bom_ids.contains(&o.bom_id))
            .collect();
        recent_orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        recent_orders.truncate(self.config.recent_orders_limit);

        Ok(InventoryItemDetail {
            item,
            used_in_boms,
            recent_orders,
        })
    }

    pub fn create_inventory_item(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        input: NewInventoryItem,
    ) -> Result<InventoryItemView, ServiceError> {
        let item_id = InventoryItemId::generate();
        let details = ItemDetails {
            name: input.name,
            category: input
                .category
                .unwrap_or_else(|| self.config.default_category.clone()),
            unit: input.unit.unwrap_or_else(|| self.config.default_unit.clone()),
            cost_per_unit: input.cost_per_unit,
            min_stock_alert: input
                .min_stock_alert
                .unwrap_or(self.config.default_min_stock_alert),
            supplier: input.supplier.unwrap_or_default(),
            notes: input.notes.unwrap_or_default(),
        };

        self.write(tenant_id, |uow| {
            let mut item = self.load_item(tenant_id, item_id)?;
            item.execute(&InventoryCommand::CreateItem(CreateItem {
                tenant_id,
                item_id,
                actor,
                details,
                opening_stock: input.current_stock.unwrap_or(Decimal::ZERO),
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, item)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, item_id = %item_id, "inventory item created");
        self.inventory_view(tenant_id, item_id)
    }

    pub fn update_inventory_item(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        item_id: InventoryItemId,
        changes: ItemChanges,
    ) -> Result<InventoryItemView, ServiceError> {
        self.write(tenant_id, |uow| {
            let mut item = self.load_item(tenant_id, item_id)?;
            item.execute(&InventoryCommand::UpdateItem(UpdateItem {
                tenant_id,
                item_id,
                actor,
                changes,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, item)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, item_id = %item_id, "inventory item updated");
        self.inventory_view(tenant_id, item_id)
    }

    /// Refused with `Conflict` while any recipe still lists the item.
    pub fn delete_inventory_item(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        item_id: InventoryItemId,
    ) -> Result<(), ServiceError> {
        self.write(tenant_id, |uow| {
            let mut item = self.load_item(tenant_id, item_id)?;
            let referenced_by = self
                .boms
                .using_material(tenant_id, item_id)
                .into_iter()
                .map(|b| b.bom_id.to_string())
                .collect();
            item.execute(&InventoryCommand::DeleteItem(DeleteItem {
                tenant_id,
                item_id,
                actor,
                referenced_by,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, item)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, item_id = %item_id, "inventory item deleted");
        Ok(())
    }

    pub fn adjust_stock(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        item_id: InventoryItemId,
        action: StockAction,
        quantity: Decimal,
        reason: Option<String>,
    ) -> Result<InventoryItemView, ServiceError> {
        self.write(tenant_id, |uow| {
            let mut item = self.load_item(tenant_id, item_id)?;
            item.execute(&InventoryCommand::AdjustStock(AdjustStock {
                tenant_id,
                item_id,
                actor,
                action,
                quantity,
                reason,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, item)?;
            Ok(())
        })?;

        tracing::info!(
            tenant_id = %tenant_id,
            item_id = %item_id,
            action = ?action,
            quantity = %quantity,
            "stock adjusted"
        );
        self.inventory_view(tenant_id, item_id)
    }
}
