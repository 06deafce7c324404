//! End-to-end tests of the manufacturing services.
//!
//! Service call → aggregates → atomic batch → read models → bus.
//!
//! Verifies:
//! - availability gates planning, starting and completion
//! - completion consumes stock and books the expense in one batch or not at all
//! - reference checks on delete
//! - tenant isolation and read model rebuilds

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use kasaku_accounting::TransactionKind;
    use kasaku_core::{DomainError, TenantId, UserId};
    use kasaku_events::EventBus;
    use kasaku_inventory::{InventoryItemId, ItemChanges, StockAction};
    use kasaku_manufacturing::{BomChanges, BomId, BomLine, ProductionStatus};

    use crate::ManufacturingConfig;
    use crate::event_store::EventStore;
    use crate::projections::{BomView, InventoryItemView, ProductionOrderView};
    use crate::services::{
        BomFilter, BomUpdate, ErrorKind, InMemoryManufacturingService, InventoryFilter, NewBom,
        NewInventoryItem, NewProductionOrder, ProductionFilter, ProductionOrderUpdate,
        ServiceError,
    };

    struct Fixture {
        service: InMemoryManufacturingService,
        tenant: TenantId,
        actor: UserId,
    }

    fn setup() -> Fixture {
        kasaku_observability::init_for_tests();
        Fixture {
            service: InMemoryManufacturingService::in_memory(ManufacturingConfig::default()),
            tenant: TenantId::new(),
            actor: UserId::new(),
        }
    }

    impl Fixture {
        fn material(&self, name: &str, stock: Decimal, cost: Decimal) -> InventoryItemView {
            self.service
                .create_inventory_item(
                    self.tenant,
                    self.actor,
                    NewInventoryItem {
                        name: name.to_string(),
                        unit: Some("kg".to_string()),
                        cost_per_unit: cost,
                        current_stock: Some(stock),
                        ..NewInventoryItem::default()
                    },
                )
                .unwrap()
        }

        fn bom(&self, product: &str, lines: &[(InventoryItemId, Decimal)]) -> BomView {
            self.service
                .create_bom(
                    self.tenant,
                    self.actor,
                    NewBom {
                        product_name: product.to_string(),
                        lines: lines.iter().map(|(m, q)| BomLine::new(*m, *q)).collect(),
                        ..NewBom::default()
                    },
                )
                .unwrap()
        }

        fn plan(&self, bom_id: BomId, quantity: u32) -> Result<ProductionOrderView, ServiceError> {
            self.service.create_production_order(
                self.tenant,
                self.actor,
                NewProductionOrder {
                    bom_id,
                    quantity,
                    target_date: None,
                    notes: None,
                    order_date: None,
                },
            )
        }

        fn set_status(
            &self,
            order: &ProductionOrderView,
            status: ProductionStatus,
        ) -> Result<ProductionOrderView, ServiceError> {
            self.service.update_production_order(
                self.tenant,
                self.actor,
                order.order_id,
                ProductionOrderUpdate {
                    status: Some(status),
                    ..ProductionOrderUpdate::default()
                },
            )
        }

        fn stock(&self, item_id: InventoryItemId) -> Decimal {
            self.service
                .get_inventory_item(self.tenant, item_id)
                .unwrap()
                .item
                .current_stock
        }

        fn event_count(&self) -> usize {
            self.service
                .dispatcher()
                .store()
                .load_tenant(self.tenant)
                .unwrap()
                .len()
        }
    }

    /// RM-1 at 100 per kg with 50 kg on hand, a recipe using 2 kg per unit.
    fn bread(f: &Fixture) -> (InventoryItemView, BomView) {
        let rm1 = f.material("RM-1", dec!(50), dec!(100));
        let bom = f.bom("Bread", &[(rm1.item_id, dec!(2))]);
        (rm1, bom)
    }

    #[test]
    fn availability_reports_ok_when_stock_covers_the_quantity() {
        let f = setup();
        let (_, bom) = bread(&f);

        let report = f.service.check_availability(f.tenant, bom.bom_id, 10).unwrap();
        assert!(report.available);
        assert_eq!(report.details, vec!["RM-1: OK".to_string()]);
    }

    #[test]
    fn planning_beyond_stock_is_refused_with_the_shortage() {
        let f = setup();
        let (rm1, bom) = bread(&f);

        let err = f.plan(bom.bom_id, 30).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(err.details(), ["RM-1: needs 60 kg, available 50 kg".to_string()]);
        assert!(f
            .service
            .list_production_orders(f.tenant, &ProductionFilter::default())
            .is_empty());
        assert_eq!(f.stock(rm1.item_id), dec!(50));
    }

    #[test]
    fn availability_check_is_read_only_and_repeatable() {
        let f = setup();
        let (_, bom) = bread(&f);
        let before = f.event_count();

        let first = f.service.check_availability(f.tenant, bom.bom_id, 30).unwrap();
        let second = f.service.check_availability(f.tenant, bom.bom_id, 30).unwrap();
        assert_eq!(first, second);
        assert!(!first.available);
        assert_eq!(f.event_count(), before);
    }

    #[test]
    fn unknown_recipe_fails_closed() {
        let f = setup();
        let report = f
            .service
            .check_availability(f.tenant, BomId::generate(), 1)
            .unwrap();
        assert!(!report.available);
        assert_eq!(report.details.len(), 1);
    }

    #[test]
    fn completing_consumes_stock_and_books_the_expense() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        assert_eq!(bom.estimated_cost, dec!(200));

        let order = f.plan(bom.bom_id, 10).unwrap();
        assert_eq!(order.total_cost, dec!(2000));
        let order = f.set_status(&order, ProductionStatus::InProgress).unwrap();
        assert_eq!(order.status, ProductionStatus::InProgress);

        let done = f
            .service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();
        assert_eq!(done.status, ProductionStatus::Completed);
        assert!(done.completed_date.is_some());
        assert_eq!(f.stock(rm1.item_id), dec!(30));

        let cash = f.service.cash_book(f.tenant);
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].kind, TransactionKind::Expense);
        assert_eq!(cash[0].amount, dec!(2000));
        assert_eq!(cash[0].category, "Production Cost");
        assert_eq!(cash[0].description, "Production of Bread - 10 units");
        assert_eq!(cash[0].notes, format!("Order ID: {}", order.order_id));
    }

    #[test]
    fn planned_orders_can_be_completed_directly() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 5).unwrap();

        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();
        assert_eq!(f.stock(rm1.item_id), dec!(40));
    }

    #[test]
    fn completion_publishes_one_batch() {
        let f = setup();
        let (_, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 10).unwrap();
        let sub = f.service.dispatcher().bus().subscribe();

        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();

        let published: Vec<_> = sub
            .drain()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(published.len(), 3);
        assert!(published.contains(&"manufacturing.production.completed".to_string()));
        assert!(published.contains(&"accounting.cash.transaction_recorded".to_string()));
    }

    #[test]
    fn shortage_at_completion_changes_nothing() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 10).unwrap();
        f.service
            .adjust_stock(
                f.tenant,
                f.actor,
                rm1.item_id,
                StockAction::Subtract,
                dec!(45),
                Some("spoiled".to_string()),
            )
            .unwrap();
        let before = f.event_count();

        let err = f
            .service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(err.details(), ["RM-1: needs 20 kg, available 5 kg".to_string()]);

        assert_eq!(f.event_count(), before);
        assert_eq!(f.stock(rm1.item_id), dec!(5));
        let order = f.service.get_production_order(f.tenant, order.order_id).unwrap();
        assert_eq!(order.order.status, ProductionStatus::Planned);
        assert!(f.service.cash_book(f.tenant).is_empty());
    }

    #[test]
    fn second_completion_is_rejected_without_double_decrement() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 10).unwrap();
        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();

        let err = f
            .service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(f.stock(rm1.item_id), dec!(30));
        assert_eq!(f.service.cash_book(f.tenant).len(), 1);
    }

    #[test]
    fn duplicate_lines_draw_from_one_balance() {
        let f = setup();
        let rm1 = f.material("RM-1", dec!(40), dec!(1));
        let bom = f.bom("Bun", &[(rm1.item_id, dec!(2)), (rm1.item_id, dec!(3))]);

        // 20 and 30 each fit in 40, together they do not.
        let err = f.plan(bom.bom_id, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(
            err.details(),
            [
                "RM-1: OK".to_string(),
                "RM-1: needs 30 kg, available 20 kg".to_string(),
            ]
        );
        let report = f.service.check_availability(f.tenant, bom.bom_id, 10).unwrap();
        assert!(!report.available);

        let order = f.plan(bom.bom_id, 8).unwrap();
        f.service
            .adjust_stock(f.tenant, f.actor, rm1.item_id, StockAction::Subtract, dec!(1), None)
            .unwrap();
        let err = f
            .service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientStock { .. })
        ));
        assert_eq!(f.stock(rm1.item_id), dec!(39));

        f.service
            .adjust_stock(f.tenant, f.actor, rm1.item_id, StockAction::Add, dec!(1), None)
            .unwrap();
        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();
        assert_eq!(f.stock(rm1.item_id), Decimal::ZERO);
    }

    #[test]
    fn in_progress_orders_can_change_quantity() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 10).unwrap();
        let order = f.set_status(&order, ProductionStatus::InProgress).unwrap();

        let edited = f
            .service
            .update_production_order(
                f.tenant,
                f.actor,
                order.order_id,
                ProductionOrderUpdate {
                    quantity: Some(20),
                    ..ProductionOrderUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(edited.status, ProductionStatus::InProgress);
        assert_eq!(edited.quantity, 20);
        assert_eq!(edited.total_cost, dec!(4000));

        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();
        assert_eq!(f.stock(rm1.item_id), dec!(10));
    }

    #[test]
    fn target_date_can_be_cleared() {
        let f = setup();
        let (_, bom) = bread(&f);
        let due = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();
        let order = f
            .service
            .create_production_order(
                f.tenant,
                f.actor,
                NewProductionOrder {
                    bom_id: bom.bom_id,
                    quantity: 1,
                    target_date: Some(due),
                    notes: None,
                    order_date: None,
                },
            )
            .unwrap();
        assert_eq!(order.target_date, Some(due));

        let update: ProductionOrderUpdate =
            serde_json::from_str(r#"{"target_date":null}"#).unwrap();
        let cleared = f
            .service
            .update_production_order(f.tenant, f.actor, order.order_id, update)
            .unwrap();
        assert_eq!(cleared.target_date, None);
    }

    #[test]
    fn revised_quantity_is_checked_before_starting() {
        let f = setup();
        let (_, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 10).unwrap();

        let err = f
            .service
            .update_production_order(
                f.tenant,
                f.actor,
                order.order_id,
                ProductionOrderUpdate {
                    quantity: Some(30),
                    status: Some(ProductionStatus::InProgress),
                    ..ProductionOrderUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        // Neither the revision nor the start landed.
        let current = f.service.get_production_order(f.tenant, order.order_id).unwrap();
        assert_eq!(current.order.quantity, 10);
        assert_eq!(current.order.status, ProductionStatus::Planned);
    }

    #[test]
    fn status_edits_follow_the_state_machine() {
        let f = setup();
        let (_, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 1).unwrap();

        let err = f.set_status(&order, ProductionStatus::Completed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let cancelled = f.set_status(&order, ProductionStatus::Cancelled).unwrap();
        assert_eq!(cancelled.status, ProductionStatus::Cancelled);

        let err = f.set_status(&order, ProductionStatus::InProgress).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let err = f
            .service
            .update_production_order(
                f.tenant,
                f.actor,
                order.order_id,
                ProductionOrderUpdate {
                    notes: Some("late edit".to_string()),
                    ..ProductionOrderUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn orders_in_progress_cannot_be_deleted() {
        let f = setup();
        let (_, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 1).unwrap();
        f.set_status(&order, ProductionStatus::InProgress).unwrap();

        let err = f
            .service
            .delete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();
        f.service
            .delete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();
        let err = f
            .service
            .get_production_order(f.tenant, order.order_id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn materials_used_by_a_recipe_cannot_be_deleted() {
        let f = setup();
        let (rm1, bom) = bread(&f);

        let err = f
            .service
            .delete_inventory_item(f.tenant, f.actor, rm1.item_id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.details(), [bom.bom_id.to_string()]);

        f.service.delete_bom(f.tenant, f.actor, bom.bom_id).unwrap();
        f.service
            .delete_inventory_item(f.tenant, f.actor, rm1.item_id)
            .unwrap();
        assert!(f
            .service
            .list_inventory(f.tenant, &InventoryFilter::default())
            .is_empty());
    }

    #[test]
    fn recipes_with_active_orders_cannot_be_deleted() {
        let f = setup();
        let (_, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 1).unwrap();

        let err = f
            .service
            .delete_bom(f.tenant, f.actor, bom.bom_id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.details(), [order.order_id.to_string()]);

        f.set_status(&order, ProductionStatus::Cancelled).unwrap();
        f.service.delete_bom(f.tenant, f.actor, bom.bom_id).unwrap();

        // The order outlives its recipe; the listing just loses the product name.
        let listing = f
            .service
            .list_production_orders(f.tenant, &ProductionFilter::default());
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].product_name, None);
        let detail = f.service.get_production_order(f.tenant, order.order_id).unwrap();
        assert_eq!(detail.actual_cost, None);
    }

    #[test]
    fn recipe_with_unknown_material_is_not_saved() {
        let f = setup();
        let rm1 = f.material("RM-1", dec!(50), dec!(2));
        let missing = InventoryItemId::generate();

        let err = f
            .service
            .create_bom(
                f.tenant,
                f.actor,
                NewBom {
                    product_name: "Bread".to_string(),
                    lines: vec![
                        BomLine::new(rm1.item_id, dec!(1)),
                        BomLine::new(missing, dec!(1)),
                    ],
                    ..NewBom::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.service.list_boms(f.tenant, &BomFilter::default()).is_empty());
    }

    #[test]
    fn replacing_lines_reprices_the_recipe() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let rm2 = f.material("RM-2", dec!(10), dec!(5));

        let updated = f
            .service
            .update_bom(
                f.tenant,
                f.actor,
                bom.bom_id,
                BomUpdate {
                    changes: BomChanges {
                        selling_price: Some(Some(dec!(150))),
                        ..BomChanges::default()
                    },
                    lines: Some(vec![
                        BomLine::new(rm1.item_id, dec!(1)),
                        BomLine::new(rm2.item_id, dec!(2)),
                    ]),
                },
            )
            .unwrap();
        assert_eq!(updated.estimated_cost, dec!(110));
        assert_eq!(updated.margin(), Some(dec!(40)));

        // A later price change shows up in the detail, not in the snapshot.
        f.service
            .update_inventory_item(
                f.tenant,
                f.actor,
                rm2.item_id,
                ItemChanges {
                    cost_per_unit: Some(dec!(6)),
                    ..ItemChanges::default()
                },
            )
            .unwrap();
        let detail = f.service.get_bom(f.tenant, bom.bom_id).unwrap();
        assert_eq!(detail.bom.estimated_cost, dec!(110));
        assert_eq!(detail.computed_cost, dec!(112));
        assert_eq!(detail.lines[1].material_name, "RM-2");
    }

    #[test]
    fn inventory_detail_shows_recipes_and_recent_orders() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 2).unwrap();

        let detail = f.service.get_inventory_item(f.tenant, rm1.item_id).unwrap();
        assert_eq!(detail.used_in_boms.len(), 1);
        assert_eq!(detail.used_in_boms[0].product_name, "Bread");
        assert_eq!(detail.used_in_boms[0].qty_required, dec!(2));
        assert_eq!(detail.recent_orders.len(), 1);
        assert_eq!(detail.recent_orders[0].order_id, order.order_id);
    }

    #[test]
    fn low_stock_lists_items_at_or_below_their_threshold() {
        let f = setup();
        let low = f.material("Yeast", dec!(10), dec!(1));
        f.material("Flour", dec!(100), dec!(1));

        let items = f.service.low_stock_items(f.tenant);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_id, low.item_id);

        let all = f.service.list_inventory(f.tenant, &InventoryFilter::default());
        let names: Vec<_> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Yeast", "Flour"]);
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let other = TenantId::new();

        assert!(f
            .service
            .list_inventory(other, &InventoryFilter::default())
            .is_empty());
        let err = f.service.get_inventory_item(other, rm1.item_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = f
            .service
            .create_bom(
                other,
                f.actor,
                NewBom {
                    product_name: "Stolen bread".to_string(),
                    lines: vec![BomLine::new(rm1.item_id, dec!(1))],
                    ..NewBom::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let report = f.service.check_availability(other, bom.bom_id, 1).unwrap();
        assert!(!report.available);
    }

    #[test]
    fn read_models_rebuild_from_the_event_log() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let order = f.plan(bom.bom_id, 10).unwrap();
        f.service
            .complete_production_order(f.tenant, f.actor, order.order_id)
            .unwrap();

        let inventory = f.service.list_inventory(f.tenant, &InventoryFilter::default());
        let boms = f.service.list_boms(f.tenant, &BomFilter::default());
        let orders = f
            .service
            .list_production_orders(f.tenant, &ProductionFilter::default());
        let cash = f.service.cash_book(f.tenant);

        let replayed = f.service.rebuild_read_models(f.tenant).unwrap();
        assert_eq!(replayed, f.event_count());

        assert_eq!(f.service.list_inventory(f.tenant, &InventoryFilter::default()), inventory);
        assert_eq!(f.service.list_boms(f.tenant, &BomFilter::default()), boms);
        assert_eq!(
            f.service
                .list_production_orders(f.tenant, &ProductionFilter::default()),
            orders
        );
        assert_eq!(f.service.cash_book(f.tenant), cash);
        assert_eq!(f.stock(rm1.item_id), dec!(30));
    }

    #[test]
    fn material_id_does_not_resolve_as_a_recipe() {
        let f = setup();
        let (rm1, bom) = bread(&f);
        let not_a_recipe = BomId::new(rm1.item_id.0);

        let err = f.plan(not_a_recipe, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let order = f.plan(bom.bom_id, 1).unwrap();
        let err = f
            .service
            .update_production_order(
                f.tenant,
                f.actor,
                order.order_id,
                ProductionOrderUpdate {
                    bom_id: Some(not_a_recipe),
                    ..ProductionOrderUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let report = f
            .service
            .check_availability(f.tenant, not_a_recipe, 1)
            .unwrap();
        assert!(!report.available);
        assert_eq!(
            report.details,
            vec![format!("bill of materials {not_a_recipe} not found")]
        );

        let err = f.service.delete_bom(f.tenant, f.actor, not_a_recipe).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.stock(rm1.item_id), dec!(50));
    }

    #[test]
    fn oversized_costs_are_rejected_and_the_tenant_stays_writable() {
        let f = setup();
        let priceless = f.material("RM-1", dec!(1000), Decimal::MAX);
        let err = f
            .service
            .create_bom(
                f.tenant,
                f.actor,
                NewBom {
                    product_name: "Crown".to_string(),
                    lines: vec![BomLine::new(priceless.item_id, dec!(2))],
                    ..NewBom::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Prices fine per unit; ten units do not fit.
        let ingot = f.material("RM-2", dec!(1000), Decimal::from_i128_with_scale(10i128.pow(28), 0));
        let bom = f.bom("Ingot", &[(ingot.item_id, dec!(1))]);
        let err = f.plan(bom.bom_id, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = f
            .service
            .adjust_stock(f.tenant, f.actor, ingot.item_id, StockAction::Add, Decimal::MAX, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        f.service
            .adjust_stock(f.tenant, f.actor, priceless.item_id, StockAction::Add, dec!(5), None)
            .unwrap();
        assert_eq!(f.stock(priceless.item_id), dec!(1005));
        assert!(f.plan(bom.bom_id, 1).is_ok());
    }
}
