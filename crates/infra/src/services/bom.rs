use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_core::{TenantId, UserId};
use kasaku_events::{EventBus, EventEnvelope};
use kasaku_manufacturing::{
    BomChanges, BomCommand, BomId, BomLine, CostBreakdown, CreateBom, DeleteBom, PricedLine,
    UpdateBom, price_lines,
};

use super::{ManufacturingService, ServiceError};
use crate::event_store::EventStore;
use crate::projections::BomView;
use crate::projections::bom_registry::AGGREGATE_TYPE;

/// Input of `create_bom`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBom {
    pub product_name: String,
    pub product_code: Option<String>,
    pub lines: Vec<BomLine>,
    pub selling_price: Option<Decimal>,
    pub notes: Option<String>,
}

/// Input of `update_bom`. `lines`, when present, replaces every line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomUpdate {
    #[serde(flatten)]
    pub changes: BomChanges,
    pub lines: Option<Vec<BomLine>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomFilter {
    /// Case-insensitive substring of product name or code.
    pub search: Option<String>,
}

/// A recipe with its lines priced at today's material costs.
///
/// `bom.estimated_cost` is the snapshot taken when the lines were last
/// saved; `computed_cost` may differ once material prices move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomDetail {
    pub bom: BomView,
    pub lines: Vec<PricedLine>,
    pub computed_cost: Decimal,
}

impl<S, B> ManufacturingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Recipes, newest first.
    pub fn list_boms(&self, tenant_id: TenantId, filter: &BomFilter) -> Vec<BomView> {
        let needle = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let mut boms: Vec<_> = self
            .boms
            .list(tenant_id)
            .into_iter()
            .filter(|b| needle.is_none_or(|n| b.matches(n)))
            .collect();
        boms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        boms
    }

    pub fn get_bom(&self, tenant_id: TenantId, bom_id: BomId) -> Result<BomDetail, ServiceError> {
        let bom = self.bom_view(tenant_id, bom_id)?;
        let priced = price_lines(&bom.lines, &self.inventory.materials(tenant_id))?;
        Ok(BomDetail {
            bom,
            lines: priced.lines,
            computed_cost: priced.total,
        })
    }

    /// Cost of a draft line list without saving anything.
    pub fn preview_bom_cost(
        &self,
        tenant_id: TenantId,
        lines: &[BomLine],
    ) -> Result<CostBreakdown, ServiceError> {
        Ok(price_lines(lines, &self.inventory.materials(tenant_id))?)
    }

    pub fn create_bom(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        input: NewBom,
    ) -> Result<BomView, ServiceError> {
        let bom_id = BomId::generate();
        self.write(tenant_id, |uow| {
            // Pricing fails on the first unknown material, before anything is staged.
            let costing = price_lines(&input.lines, &self.inventory.materials(tenant_id))?;
            let mut bom = self.load_bom(tenant_id, bom_id)?;
            bom.execute(&BomCommand::CreateBom(CreateBom {
                tenant_id,
                bom_id,
                actor,
                product_name: input.product_name,
                product_code: input.product_code,
                selling_price: input.selling_price,
                notes: input.notes.unwrap_or_default(),
                costing,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, bom)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, bom_id = %bom_id, "bill of materials created");
        self.bom_view(tenant_id, bom_id)
    }

    pub fn update_bom(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        bom_id: BomId,
        update: BomUpdate,
    ) -> Result<BomView, ServiceError> {
        self.write(tenant_id, |uow| {
            let mut bom = self.load_existing_bom(tenant_id, bom_id)?;
            let costing = update
                .lines
                .as_deref()
                .map(|lines| price_lines(lines, &self.inventory.materials(tenant_id)))
                .transpose()?;
            bom.execute(&BomCommand::UpdateBom(UpdateBom {
                tenant_id,
                bom_id,
                actor,
                changes: update.changes,
                costing,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, bom)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, bom_id = %bom_id, "bill of materials updated");
        self.bom_view(tenant_id, bom_id)
    }

    /// Refused with `Conflict` while PLANNED or IN_PROGRESS orders use the recipe.
    pub fn delete_bom(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        bom_id: BomId,
    ) -> Result<(), ServiceError> {
        self.write(tenant_id, |uow| {
            let mut bom = self.load_existing_bom(tenant_id, bom_id)?;
            let active_orders = self
                .orders
                .active_for_bom(tenant_id, bom_id)
                .into_iter()
                .map(|o| o.order_id.to_string())
                .collect();
            bom.execute(&BomCommand::DeleteBom(DeleteBom {
                tenant_id,
                bom_id,
                actor,
                active_orders,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(AGGREGATE_TYPE, bom)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, bom_id = %bom_id, "bill of materials deleted");
        Ok(())
    }
}
