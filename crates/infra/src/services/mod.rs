//! Application services: one entry point per manufacturing operation.
//!
//! Every write follows the same path:
//!
//! ```text
//! tenant lock ─▶ load aggregates ─▶ execute commands ─▶ stage (UnitOfWork)
//!                                                            │
//!                      publish ◀── update read models ◀── commit batch
//! ```
//!
//! Reads are served from the projections, which are updated before the
//! tenant lock is released, so a caller always reads its own writes.

mod bom;
mod error;
mod inventory;
mod production;

use std::sync::Arc;

use serde_json::Value as JsonValue;

use kasaku_accounting::{CashTransaction, TransactionId};
use kasaku_core::{AggregateId, DomainError, TenantId};
use kasaku_events::{EventBus, EventEnvelope, InMemoryEventBus};
use kasaku_inventory::{InventoryItem, InventoryItemId};
use kasaku_manufacturing::{BillOfMaterials, BomId, ProductionOrder, ProductionOrderId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Tracked, UnitOfWork};
use crate::config::ManufacturingConfig;
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::projections::{
    BomRegistryProjection, bom_registry, cash_book, inventory_catalog, production_orders, BomView, CashBookProjection, CashEntryView, InventoryCatalogProjection,
    InventoryItemView, ProductionOrderView, ProductionOrdersProjection, Projection,
};
use crate::read_model::InMemoryTenantStore;
use crate::tenant_locks::{self, TenantLocks};

pub use bom::{BomDetail, BomFilter, BomUpdate, NewBom};
pub use error::{ErrorKind, ServiceError};
pub use inventory::{BomUsage, InventoryFilter, InventoryItemDetail, NewInventoryItem};
pub use production::{
    NewProductionOrder, ProductionFilter, ProductionOrderDetail, ProductionOrderListing,
    ProductionOrderUpdate,
};

type InventoryReadModel =
    InventoryCatalogProjection<InMemoryTenantStore<InventoryItemId, InventoryItemView>>;
type BomReadModel = BomRegistryProjection<InMemoryTenantStore<BomId, BomView>>;
type ProductionReadModel =
    ProductionOrdersProjection<InMemoryTenantStore<ProductionOrderId, ProductionOrderView>>;
type CashBookReadModel = CashBookProjection<InMemoryTenantStore<TransactionId, CashEntryView>>;

/// Dev/test wiring: in-memory store and bus.
pub type InMemoryManufacturingService = ManufacturingService<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
>;

/// Inventory, recipes and production for every tenant.
#[derive(Debug)]
pub struct ManufacturingService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    locks: TenantLocks,
    config: ManufacturingConfig,
    inventory: InventoryReadModel,
    boms: BomReadModel,
    orders: ProductionReadModel,
    cash_book: CashBookReadModel,
}

impl InMemoryManufacturingService {
    pub fn in_memory(config: ManufacturingConfig) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            config,
        )
    }
}

impl<S, B> ManufacturingService<S, B> {
    pub fn new(store: S, bus: B, config: ManufacturingConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            locks: TenantLocks::new(),
            config,
            inventory: InventoryCatalogProjection::new(InMemoryTenantStore::new()),
            boms: BomRegistryProjection::new(InMemoryTenantStore::new()),
            orders: ProductionOrdersProjection::new(InMemoryTenantStore::new()),
            cash_book: CashBookProjection::new(InMemoryTenantStore::new()),
        }
    }

    pub fn config(&self) -> &ManufacturingConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Cash-book entries of a tenant, oldest first.
    pub fn cash_book(&self, tenant_id: TenantId) -> Vec<CashEntryView> {
        self.cash_book.list(tenant_id)
    }

    fn projections(&self) -> [&dyn Projection; 4] {
        [&self.inventory, &self.boms, &self.orders, &self.cash_book]
    }

    fn inventory_view(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<InventoryItemView, ServiceError> {
        self.inventory
            .get(tenant_id, &item_id)
            .ok_or_else(|| DomainError::not_found(format!("inventory item {item_id}")).into())
    }

    fn bom_view(&self, tenant_id: TenantId, bom_id: BomId) -> Result<BomView, ServiceError> {
        self.boms
            .get(tenant_id, &bom_id)
            .ok_or_else(|| DomainError::not_found(format!("bill of materials {bom_id}")).into())
    }

    fn order_view(
        &self,
        tenant_id: TenantId,
        order_id: ProductionOrderId,
    ) -> Result<ProductionOrderView, ServiceError> {
        self.orders
            .get(tenant_id, &order_id)
            .ok_or_else(|| DomainError::not_found(format!("production order {order_id}")).into())
    }
}

impl<S, B> ManufacturingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one business operation under the tenant lock and commit whatever
    /// it staged as a single batch.
    fn write<T>(
        &self,
        tenant_id: TenantId,
        operation: impl FnOnce(&mut UnitOfWork) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let lock = self.locks.handle(tenant_id);
        let _guard = tenant_locks::hold(&lock);

        let mut uow = UnitOfWork::new(tenant_id);
        let out = operation(&mut uow)?;
        let committed = self.dispatcher.commit(uow)?;
        self.project(&committed);
        self.dispatcher.publish(&committed);
        Ok(out)
    }

    /// Feed committed events to every read model.
    ///
    /// The events are already durable; a projection failure is logged and
    /// repaired by [`ManufacturingService::rebuild_read_models`].
    fn project(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let envelope = stored.to_envelope();
            for projection in self.projections() {
                if let Err(e) = projection.apply_envelope(&envelope) {
                    tracing::error!(
                        tenant_id = %stored.tenant_id,
                        event_id = %stored.event_id,
                        event_type = %stored.event_type,
                        error = %e,
                        "read model update failed"
                    );
                }
            }
        }
    }

    /// Drop and replay every read model of a tenant from its event log.
    ///
    /// Returns the number of events replayed.
    pub fn rebuild_read_models(&self, tenant_id: TenantId) -> Result<usize, ServiceError> {
        let lock = self.locks.handle(tenant_id);
        let _guard = tenant_locks::hold(&lock);

        for projection in self.projections() {
            projection.reset_tenant(tenant_id);
        }
        let events = self
            .dispatcher
            .store()
            .load_tenant(tenant_id)
            .map_err(DispatchError::from)?;
        for stored in &events {
            let envelope = stored.to_envelope();
            for projection in self.projections() {
                projection.apply_envelope(&envelope).map_err(|e| {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        event_id = %stored.event_id,
                        error = %e,
                        "read model replay failed"
                    );
                    ServiceError::internal(e.to_string())
                })?;
            }
        }

        tracing::info!(tenant_id = %tenant_id, events = events.len(), "read models rebuilt");
        Ok(events.len())
    }

    fn load_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Tracked<InventoryItem>, ServiceError> {
        Ok(self
            .dispatcher
            .load(tenant_id, item_id.0, inventory_catalog::AGGREGATE_TYPE, |id| {
                InventoryItem::empty(InventoryItemId::new(id))
            })?)
    }

    fn load_bom(
        &self,
        tenant_id: TenantId,
        bom_id: BomId,
    ) -> Result<Tracked<BillOfMaterials>, ServiceError> {
        Ok(self
            .dispatcher
            .load(tenant_id, bom_id.0, bom_registry::AGGREGATE_TYPE, |id| {
                BillOfMaterials::empty(BomId::new(id))
            })?)
    }

    /// Like [`Self::load_bom`], but a missing or deleted recipe is `NotFound`.
    fn load_existing_bom(
        &self,
        tenant_id: TenantId,
        bom_id: BomId,
    ) -> Result<Tracked<BillOfMaterials>, ServiceError> {
        let bom = self.load_bom(tenant_id, bom_id)?;
        if !bom.aggregate().exists() {
            return Err(DomainError::not_found(format!("bill of materials {bom_id}")).into());
        }
        Ok(bom)
    }

    fn load_order(
        &self,
        tenant_id: TenantId,
        order_id: ProductionOrderId,
    ) -> Result<Tracked<ProductionOrder>, ServiceError> {
        Ok(self
            .dispatcher
            .load(tenant_id, order_id.0, production_orders::AGGREGATE_TYPE, |id| {
                ProductionOrder::empty(ProductionOrderId::new(id))
            })?)
    }

    fn load_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Tracked<CashTransaction>, ServiceError> {
        Ok(self.dispatcher.load(
            tenant_id,
            transaction_id.0,
            cash_book::AGGREGATE_TYPE,
            |id: AggregateId| CashTransaction::empty(TransactionId::new(id)),
        )?)
    }
}
