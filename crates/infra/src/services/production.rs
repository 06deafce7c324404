use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kasaku_accounting::{RecordTransaction, TransactionCommand, TransactionId, TransactionKind};
use kasaku_core::{DomainError, TenantId, UserId};
use kasaku_events::{EventBus, EventEnvelope};
use kasaku_inventory::{ConsumeStock, InventoryCommand, InventoryItem, InventoryItemId};
use kasaku_manufacturing::{
    AvailabilityReport, BomId, CancelProduction, CompleteProduction, DeleteProductionOrder,
    MaterialSnapshot, PlanProduction, ProductionChanges, ProductionCommand, ProductionOrder,
    ProductionOrderId, ProductionStatus, ReviseProduction, StartProduction, check_availability,
};

use super::{ManufacturingService, ServiceError};
use crate::command_dispatcher::Tracked;
use crate::event_store::EventStore;
use crate::projections::{ProductionOrderView, cash_book, inventory_catalog, production_orders};

/// Input of `create_production_order`. `order_date` defaults to today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductionOrder {
    pub bom_id: BomId,
    pub quantity: u32,
    pub target_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub order_date: Option<NaiveDate>,
}

/// Input of `update_production_order`; `None` keeps the current value.
///
/// Field edits are applied before the status change, so a request that
/// revises the quantity and starts production checks stock for the new
/// quantity. `status` may be IN_PROGRESS or CANCELLED; completion goes
/// through `complete_production_order`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderUpdate {
    pub bom_id: Option<BomId>,
    pub quantity: Option<u32>,
    /// `Some(None)` clears the date.
    #[serde(default, deserialize_with = "kasaku_core::patch::double_option")]
    pub target_date: Option<Option<NaiveDate>>,
    pub status: Option<ProductionStatus>,
    pub notes: Option<String>,
}

/// List filter; the date range is inclusive on `order_date`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionFilter {
    pub status: Option<ProductionStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderListing {
    pub order: ProductionOrderView,
    /// `None` once the recipe has been deleted.
    pub product_name: Option<String>,
    pub product_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderDetail {
    pub order: ProductionOrderView,
    pub product_name: Option<String>,
    pub product_code: Option<String>,
    /// Cost of the order at today's material prices; `None` when the recipe
    /// or one of its materials no longer exists, or the cost leaves the
    /// decimal range.
    pub actual_cost: Option<Decimal>,
}

impl<S, B> ManufacturingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Orders, newest `order_date` first.
    pub fn list_production_orders(
        &self,
        tenant_id: TenantId,
        filter: &ProductionFilter,
    ) -> Vec<ProductionOrderListing> {
        let mut orders: Vec<_> = self
            .orders
            .list(tenant_id)
            .into_iter()
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| filter.start_date.is_none_or(|d| o.order_date >= d))
            .filter(|o| filter.end_date.is_none_or(|d| o.order_date <= d))
            .collect();
        orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        orders
            .into_iter()
            .map(|order| {
                let bom = self.boms.get(tenant_id, &order.bom_id);
                ProductionOrderListing {
                    product_name: bom.as_ref().map(|b| b.product_name.clone()),
                    product_code: bom.and_then(|b| b.product_code),
                    order,
                }
            })
            .collect()
    }

    pub fn get_production_order(
        &self,
        tenant_id: TenantId,
        order_id: ProductionOrderId,
    ) -> Result<ProductionOrderDetail, ServiceError> {
        let order = self.order_view(tenant_id, order_id)?;
        let bom = self.boms.get(tenant_id, &order.bom_id);

        let actual_cost = bom.as_ref().and_then(|bom| {
            let multiplier = Decimal::from(order.quantity);
            bom.lines.iter().try_fold(Decimal::ZERO, |total, line| {
                let material = self.inventory.get(tenant_id, &line.material_id)?;
                let line_cost = material
                    .cost_per_unit
                    .checked_mul(line.qty_required)?
                    .checked_mul(multiplier)?;
                total.checked_add(line_cost)
            })
        });

        Ok(ProductionOrderDetail {
            product_name: bom.as_ref().map(|b| b.product_name.clone()),
            product_code: bom.and_then(|b| b.product_code),
            actual_cost,
            order,
        })
    }

    /// Whether current stock covers `quantity` units of a recipe. Read-only.
    pub fn check_availability(
        &self,
        tenant_id: TenantId,
        bom_id: BomId,
        quantity: u32,
    ) -> Result<AvailabilityReport, ServiceError> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }
        let bom = self.load_bom(tenant_id, bom_id)?;
        Ok(check_availability(
            bom_id,
            Some(bom.aggregate()),
            quantity,
            &self.inventory.materials(tenant_id),
        ))
    }

    /// Plan an order. Refused with `InsufficientStock` when stock does not
    /// cover the quantity; nothing is reserved.
    pub fn create_production_order(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        input: NewProductionOrder,
    ) -> Result<ProductionOrderView, ServiceError> {
        let order_id = ProductionOrderId::generate();
        let now = Utc::now();

        self.write(tenant_id, |uow| {
            let bom = self.load_existing_bom(tenant_id, input.bom_id)?;
            let availability = check_availability(
                input.bom_id,
                Some(bom.aggregate()),
                input.quantity,
                &self.inventory.materials(tenant_id),
            );
            let mut order = self.load_order(tenant_id, order_id)?;
            order.execute(&ProductionCommand::PlanProduction(PlanProduction {
                tenant_id,
                order_id,
                actor,
                bom_id: input.bom_id,
                quantity: input.quantity,
                unit_cost: bom.aggregate().estimated_cost(),
                availability,
                order_date: input.order_date.unwrap_or_else(|| now.date_naive()),
                target_date: input.target_date,
                notes: input.notes.unwrap_or_default(),
                occurred_at: now,
            }))?;
            uow.stage(production_orders::AGGREGATE_TYPE, order)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, order_id = %order_id, "production order planned");
        self.order_view(tenant_id, order_id)
    }

    pub fn update_production_order(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        order_id: ProductionOrderId,
        update: ProductionOrderUpdate,
    ) -> Result<ProductionOrderView, ServiceError> {
        let now = Utc::now();

        self.write(tenant_id, |uow| {
            let mut order = self.load_order(tenant_id, order_id)?;
            if !order.aggregate().exists() {
                return Err(DomainError::not_found(format!("production order {order_id}")).into());
            }
            let current = order.aggregate().status();
            if current.is_terminal() {
                return Err(match update.status {
                    Some(to) => DomainError::invalid_transition(current, to),
                    None => DomainError::invariant(format!(
                        "a {current} production order cannot be edited"
                    )),
                }
                .into());
            }

            let changes = ProductionChanges {
                bom_id: update.bom_id,
                quantity: update.quantity,
                target_date: update.target_date,
                notes: update.notes,
            };
            if changes != ProductionChanges::default() {
                let unit_cost = if changes.touches_costing() {
                    let bom_id = changes.bom_id.or(order.aggregate().bom_id()).ok_or_else(|| {
                        DomainError::invariant("production order has no recipe")
                    })?;
                    Some(self.load_existing_bom(tenant_id, bom_id)?.aggregate().estimated_cost())
                } else {
                    None
                };
                order.execute(&ProductionCommand::ReviseProduction(ReviseProduction {
                    tenant_id,
                    order_id,
                    actor,
                    changes,
                    unit_cost,
                    occurred_at: now,
                }))?;
            }

            match update.status {
                None => {}
                Some(to) if to == current => {}
                Some(ProductionStatus::InProgress) => {
                    let availability = self.availability_for(tenant_id, &order)?;
                    order.execute(&ProductionCommand::StartProduction(StartProduction {
                        tenant_id,
                        order_id,
                        actor,
                        availability,
                        occurred_at: now,
                    }))?;
                }
                Some(ProductionStatus::Cancelled) => {
                    order.execute(&ProductionCommand::CancelProduction(CancelProduction {
                        tenant_id,
                        order_id,
                        actor,
                        occurred_at: now,
                    }))?;
                }
                Some(to) => return Err(DomainError::invalid_transition(current, to).into()),
            }

            uow.stage(production_orders::AGGREGATE_TYPE, order)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, order_id = %order_id, "production order updated");
        self.order_view(tenant_id, order_id)
    }

    /// Refused with `Conflict` while the order is IN_PROGRESS.
    pub fn delete_production_order(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        order_id: ProductionOrderId,
    ) -> Result<(), ServiceError> {
        self.write(tenant_id, |uow| {
            let mut order = self.load_order(tenant_id, order_id)?;
            order.execute(&ProductionCommand::DeleteProductionOrder(DeleteProductionOrder {
                tenant_id,
                order_id,
                actor,
                occurred_at: Utc::now(),
            }))?;
            uow.stage(production_orders::AGGREGATE_TYPE, order)?;
            Ok(())
        })?;

        tracing::info!(tenant_id = %tenant_id, order_id = %order_id, "production order deleted");
        Ok(())
    }

    /// Complete an order: re-check stock, consume every recipe line, mark the
    /// order COMPLETED and book the expense in the cash book.
    ///
    /// All of it is committed as one batch or not at all.
    pub fn complete_production_order(
        &self,
        tenant_id: TenantId,
        actor: UserId,
        order_id: ProductionOrderId,
    ) -> Result<ProductionOrderView, ServiceError> {
        let now = Utc::now();
        let today = now.date_naive();

        let (bom_id, quantity, total_cost) = self.write(tenant_id, |uow| {
            let mut order = self.load_order(tenant_id, order_id)?;
            let state = order.aggregate();
            if !state.exists() {
                return Err(DomainError::not_found(format!("production order {order_id}")).into());
            }
            if state.status().is_terminal() {
                return Err(
                    DomainError::invalid_transition(state.status(), ProductionStatus::Completed)
                        .into(),
                );
            }
            let bom_id = state
                .bom_id()
                .ok_or_else(|| DomainError::invariant("production order has no recipe"))?;
            let quantity = state.quantity();
            let bom = self.load_existing_bom(tenant_id, bom_id)?;

            // Stock is read from the material streams themselves; the commit
            // is guarded by exactly these versions.
            let mut materials: Vec<Tracked<InventoryItem>> = Vec::new();
            for line in bom.aggregate().lines() {
                if !materials
                    .iter()
                    .any(|m| m.aggregate().id_typed() == line.material_id)
                {
                    materials.push(self.load_item(tenant_id, line.material_id)?);
                }
            }
            let catalog: HashMap<InventoryItemId, MaterialSnapshot> = materials
                .iter()
                .map(Tracked::aggregate)
                .filter(|item| item.exists())
                .map(|item| (item.id_typed(), MaterialSnapshot::from(item)))
                .collect();
            let availability = check_availability(bom_id, Some(bom.aggregate()), quantity, &catalog);

            order.execute(&ProductionCommand::CompleteProduction(CompleteProduction {
                tenant_id,
                order_id,
                actor,
                availability,
                completed_on: today,
                occurred_at: now,
            }))?;

            let multiplier = Decimal::from(quantity);
            for line in bom.aggregate().lines() {
                let material = materials
                    .iter_mut()
                    .find(|m| m.aggregate().id_typed() == line.material_id)
                    .ok_or_else(|| {
                        ServiceError::internal(format!("material {} was not loaded", line.material_id))
                    })?;
                let consumed = line
                    .qty_required
                    .checked_mul(multiplier)
                    .ok_or_else(|| DomainError::validation("consumed quantity overflows"))?;
                material.execute(&InventoryCommand::ConsumeStock(ConsumeStock {
                    tenant_id,
                    item_id: line.material_id,
                    actor,
                    production_order: order_id.0,
                    quantity: consumed,
                    occurred_at: now,
                }))?;
            }

            let total_cost = order.aggregate().total_cost();
            let transaction_id = TransactionId::generate();
            let mut expense = self.load_transaction(tenant_id, transaction_id)?;
            expense.execute(&TransactionCommand::RecordTransaction(RecordTransaction {
                tenant_id,
                transaction_id,
                actor,
                date: today,
                description: self
                    .config
                    .expense_description(bom.aggregate().product_name(), quantity),
                amount: total_cost,
                kind: TransactionKind::Expense,
                category: self.config.production_expense_category.clone(),
                notes: format!("Order ID: {order_id}"),
                occurred_at: now,
            }))?;

            uow.stage(production_orders::AGGREGATE_TYPE, order)?;
            for material in materials {
                uow.stage(inventory_catalog::AGGREGATE_TYPE, material)?;
            }
            uow.stage(cash_book::AGGREGATE_TYPE, expense)?;
            Ok((bom_id, quantity, total_cost))
        })?;

        tracing::info!(
            tenant_id = %tenant_id,
            order_id = %order_id,
            bom_id = %bom_id,
            quantity,
            total_cost = %total_cost,
            "production completed"
        );
        self.order_view(tenant_id, order_id)
    }

    /// Availability of the order's current recipe and quantity.
    fn availability_for(
        &self,
        tenant_id: TenantId,
        order: &Tracked<ProductionOrder>,
    ) -> Result<AvailabilityReport, ServiceError> {
        let state = order.aggregate();
        let bom_id = state
            .bom_id()
            .ok_or_else(|| DomainError::invariant("production order has no recipe"))?;
        let bom = self.load_bom(tenant_id, bom_id)?;
        Ok(check_availability(
            bom_id,
            Some(bom.aggregate()),
            state.quantity(),
            &self.inventory.materials(tenant_id),
        ))
    }
}
