use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kasaku_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use kasaku_events::Event;

/// Inventory item identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for InventoryItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Descriptive and pricing fields of a raw material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub cost_per_unit: Decimal,
    /// Reorder threshold: at or below this level the item counts as low stock.
    pub min_stock_alert: Decimal,
    pub supplier: String,
    pub notes: String,
}

impl ItemDetails {
    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.cost_per_unit <= Decimal::ZERO {
            return Err(DomainError::validation("cost_per_unit must be positive"));
        }
        if self.min_stock_alert < Decimal::ZERO {
            return Err(DomainError::validation("min_stock_alert cannot be negative"));
        }
        Ok(())
    }
}

/// Direction of a manual stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockAction {
    Add,
    Subtract,
}

impl core::str::FromStr for StockAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "subtract" => Ok(Self::Subtract),
            _ => Err(DomainError::validation("action must be \"add\" or \"subtract\"")),
        }
    }
}

/// Aggregate root: InventoryItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: Option<TenantId>,
    details: ItemDetails,
    current_stock: Decimal,
    version: u64,
    created: bool,
    deleted: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: ItemDetails {
                name: String::new(),
                category: String::new(),
                unit: String::new(),
                cost_per_unit: Decimal::ZERO,
                min_stock_alert: Decimal::ZERO,
                supplier: String::new(),
                notes: String::new(),
            },
            current_stock: Decimal::ZERO,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn unit(&self) -> &str {
        &self.details.unit
    }

    pub fn cost_per_unit(&self) -> Decimal {
        self.details.cost_per_unit
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.details.min_stock_alert
    }

    /// Created and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub details: ItemDetails,
    pub opening_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Field edits; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub cost_per_unit: Option<Decimal>,
    /// Direct stock correction (stock count), not a movement.
    pub current_stock: Option<Decimal>,
    pub min_stock_alert: Option<Decimal>,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

/// Command: UpdateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub changes: ItemChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (manual add/subtract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub action: StockAction,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeStock (production completion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub production_order: AggregateId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteItem.
///
/// `referenced_by` lists the recipes that still use this item; the caller
/// looks them up, the aggregate refuses the delete when it is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub referenced_by: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    UpdateItem(UpdateItem),
    AdjustStock(AdjustStock),
    ConsumeStock(ConsumeStock),
    DeleteItem(DeleteItem),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub details: ItemDetails,
    pub opening_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemUpdated (carries the full new details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub details: ItemDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockCorrected (direct edit of the on-hand figure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCorrected {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub previous: Decimal,
    pub current: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted. `delta` is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub delta: Decimal,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockConsumed by a production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockConsumed {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub production_order: AggregateId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeleted {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    ItemUpdated(ItemUpdated),
    StockCorrected(StockCorrected),
    StockAdjusted(StockAdjusted),
    StockConsumed(StockConsumed),
    ItemDeleted(ItemDeleted),
}

impl InventoryEvent {
    pub fn item_id(&self) -> InventoryItemId {
        match self {
            InventoryEvent::ItemCreated(e) => e.item_id,
            InventoryEvent::ItemUpdated(e) => e.item_id,
            InventoryEvent::StockCorrected(e) => e.item_id,
            InventoryEvent::StockAdjusted(e) => e.item_id,
            InventoryEvent::StockConsumed(e) => e.item_id,
            InventoryEvent::ItemDeleted(e) => e.item_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::ItemUpdated(_) => "inventory.item.updated",
            InventoryEvent::StockCorrected(_) => "inventory.item.stock_corrected",
            InventoryEvent::StockAdjusted(_) => "inventory.item.stock_adjusted",
            InventoryEvent::StockConsumed(_) => "inventory.item.stock_consumed",
            InventoryEvent::ItemDeleted(_) => "inventory.item.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            InventoryEvent::ItemCreated(e) => e.tenant_id,
            InventoryEvent::ItemUpdated(e) => e.tenant_id,
            InventoryEvent::StockCorrected(e) => e.tenant_id,
            InventoryEvent::StockAdjusted(e) => e.tenant_id,
            InventoryEvent::StockConsumed(e) => e.tenant_id,
            InventoryEvent::ItemDeleted(e) => e.tenant_id,
        }
    }

    fn actor(&self) -> UserId {
        match self {
            InventoryEvent::ItemCreated(e) => e.actor,
            InventoryEvent::ItemUpdated(e) => e.actor,
            InventoryEvent::StockCorrected(e) => e.actor,
            InventoryEvent::StockAdjusted(e) => e.actor,
            InventoryEvent::StockConsumed(e) => e.actor,
            InventoryEvent::ItemDeleted(e) => e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::ItemUpdated(e) => e.occurred_at,
            InventoryEvent::StockCorrected(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::StockConsumed(e) => e.occurred_at,
            InventoryEvent::ItemDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.current_stock = e.opening_stock;
                self.created = true;
            }
            InventoryEvent::ItemUpdated(e) => {
                self.details = e.details.clone();
            }
            InventoryEvent::StockCorrected(e) => {
                self.current_stock = e.current;
            }
            InventoryEvent::StockAdjusted(e) => {
                self.current_stock += e.delta;
            }
            InventoryEvent::StockConsumed(e) => {
                self.current_stock -= e.quantity;
            }
            InventoryEvent::ItemDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::UpdateItem(cmd) => self.handle_update(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::ConsumeStock(cmd) => self.handle_consume(cmd),
            InventoryCommand::DeleteItem(cmd) => self.handle_delete(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_live(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("inventory item {item_id}")));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_enough(&self, quantity: Decimal) -> Result<(), DomainError> {
        if self.current_stock < quantity {
            return Err(DomainError::insufficient_stock(
                format!("not enough {} in stock", self.details.name),
                vec![format!(
                    "{}: requested {} {}, available {} {}",
                    self.details.name,
                    quantity.normalize(),
                    self.details.unit,
                    self.current_stock.normalize(),
                    self.details.unit
                )],
            ));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        cmd.details.validate()?;
        if cmd.opening_stock < Decimal::ZERO {
            return Err(DomainError::validation("current_stock cannot be negative"));
        }

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            actor: cmd.actor,
            details: cmd.details.clone(),
            opening_stock: cmd.opening_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.item_id)?;

        let changes = &cmd.changes;
        let mut details = self.details.clone();
        if let Some(name) = &changes.name {
            details.name = name.clone();
        }
        if let Some(category) = &changes.category {
            details.category = category.clone();
        }
        if let Some(unit) = &changes.unit {
            details.unit = unit.clone();
        }
        if let Some(cost) = changes.cost_per_unit {
            details.cost_per_unit = cost;
        }
        if let Some(alert) = changes.min_stock_alert {
            details.min_stock_alert = alert;
        }
        if let Some(supplier) = &changes.supplier {
            details.supplier = supplier.clone();
        }
        if let Some(notes) = &changes.notes {
            details.notes = notes.clone();
        }
        details.validate()?;

        if let Some(stock) = changes.current_stock {
            if stock < Decimal::ZERO {
                return Err(DomainError::validation("current_stock cannot be negative"));
            }
        }

        let mut events = Vec::new();
        if details != self.details {
            events.push(InventoryEvent::ItemUpdated(ItemUpdated {
                tenant_id: cmd.tenant_id,
                item_id: cmd.item_id,
                actor: cmd.actor,
                details,
                occurred_at: cmd.occurred_at,
            }));
        }
        if let Some(stock) = changes.current_stock.filter(|s| *s != self.current_stock) {
            events.push(InventoryEvent::StockCorrected(StockCorrected {
                tenant_id: cmd.tenant_id,
                item_id: cmd.item_id,
                actor: cmd.actor,
                previous: self.current_stock,
                current: stock,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.item_id)?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be a positive number"));
        }

        let delta = match cmd.action {
            StockAction::Add => {
                if self.current_stock.checked_add(cmd.quantity).is_none() {
                    return Err(DomainError::validation("resulting stock overflows"));
                }
                cmd.quantity
            }
            StockAction::Subtract => {
                self.ensure_enough(cmd.quantity)?;
                -cmd.quantity
            }
        };

        Ok(vec![InventoryEvent::StockAdjusted(StockAdjusted {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            actor: cmd.actor,
            delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_consume(&self, cmd: &ConsumeStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.item_id)?;

        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("consumed quantity must be positive"));
        }
        self.ensure_enough(cmd.quantity)?;

        Ok(vec![InventoryEvent::StockConsumed(StockConsumed {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            actor: cmd.actor,
            production_order: cmd.production_order,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.item_id)?;

        if !cmd.referenced_by.is_empty() {
            return Err(DomainError::conflict_with(
                format!("{} is still used by a bill of materials", self.details.name),
                cmd.referenced_by.iter(),
            ));
        }

        Ok(vec![InventoryEvent::ItemDeleted(ItemDeleted {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasaku_events::execute;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn details(name: &str, cost: Decimal) -> ItemDetails {
        ItemDetails {
            name: name.to_string(),
            category: "RAW_MATERIAL".to_string(),
            unit: "kg".to_string(),
            cost_per_unit: cost,
            min_stock_alert: dec!(10),
            supplier: String::new(),
            notes: String::new(),
        }
    }

    struct Fixture {
        tenant_id: TenantId,
        actor: UserId,
        item: InventoryItem,
    }

    fn created(stock: Decimal) -> Fixture {
        let tenant_id = TenantId::new();
        let actor = UserId::new();
        let item_id = InventoryItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        execute(
            &mut item,
            &InventoryCommand::CreateItem(CreateItem {
                tenant_id,
                item_id,
                actor,
                details: details("Flour", dec!(100)),
                opening_stock: stock,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        Fixture { tenant_id, actor, item }
    }

    fn adjust(f: &Fixture, action: StockAction, quantity: Decimal) -> InventoryCommand {
        InventoryCommand::AdjustStock(AdjustStock {
            tenant_id: f.tenant_id,
            item_id: f.item.id_typed(),
            actor: f.actor,
            action,
            quantity,
            reason: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_rejects_non_positive_cost() {
        let item_id = InventoryItemId::generate();
        let item = InventoryItem::empty(item_id);
        for cost in [dec!(0), dec!(-1)] {
            let err = item
                .handle(&InventoryCommand::CreateItem(CreateItem {
                    tenant_id: TenantId::new(),
                    item_id,
                    actor: UserId::new(),
                    details: details("Flour", cost),
                    opening_stock: dec!(0),
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn create_rejects_blank_name() {
        let item_id = InventoryItemId::generate();
        let err = InventoryItem::empty(item_id)
            .handle(&InventoryCommand::CreateItem(CreateItem {
                tenant_id: TenantId::new(),
                item_id,
                actor: UserId::new(),
                details: details("   ", dec!(5)),
                opening_stock: dec!(0),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("name cannot be empty"));
    }

    #[test]
    fn create_sets_opening_stock() {
        let f = created(dec!(50));
        assert!(f.item.exists());
        assert_eq!(f.item.current_stock(), dec!(50));
        assert_eq!(f.item.version(), 1);
    }

    #[test]
    fn adjust_add_and_subtract() {
        let mut f = created(dec!(50));
        let cmd = adjust(&f, StockAction::Add, dec!(2.5));
        execute(&mut f.item, &cmd).unwrap();
        assert_eq!(f.item.current_stock(), dec!(52.5));

        let cmd = adjust(&f, StockAction::Subtract, dec!(12.5));
        execute(&mut f.item, &cmd).unwrap();
        assert_eq!(f.item.current_stock(), dec!(40));
    }

    #[test]
    fn subtract_more_than_on_hand_is_rejected_without_change() {
        let mut f = created(dec!(5));
        let before = f.item.clone();
        let cmd = adjust(&f, StockAction::Subtract, dec!(6));
        let err = execute(&mut f.item, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(f.item, before);
    }

    #[test]
    fn adding_past_the_decimal_range_is_rejected_without_change() {
        let mut f = created(Decimal::MAX);
        let before = f.item.clone();
        let cmd = adjust(&f, StockAction::Add, dec!(1));
        let err = execute(&mut f.item, &cmd).unwrap_err();
        assert_eq!(err, DomainError::validation("resulting stock overflows"));
        assert_eq!(f.item, before);
    }

    #[test]
    fn adjust_requires_positive_quantity() {
        let f = created(dec!(5));
        let err = f.item.handle(&adjust(&f, StockAction::Add, dec!(0))).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_emits_correction_only_when_stock_changes() {
        let mut f = created(dec!(5));
        let cmd = InventoryCommand::UpdateItem(UpdateItem {
            tenant_id: f.tenant_id,
            item_id: f.item.id_typed(),
            actor: f.actor,
            changes: ItemChanges {
                cost_per_unit: Some(dec!(120)),
                current_stock: Some(dec!(5)),
                ..ItemChanges::default()
            },
            occurred_at: test_time(),
        });
        let events = execute(&mut f.item, &cmd).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], InventoryEvent::ItemUpdated(_)));
        assert_eq!(f.item.cost_per_unit(), dec!(120));

        let cmd = InventoryCommand::UpdateItem(UpdateItem {
            tenant_id: f.tenant_id,
            item_id: f.item.id_typed(),
            actor: f.actor,
            changes: ItemChanges {
                current_stock: Some(dec!(7)),
                ..ItemChanges::default()
            },
            occurred_at: test_time(),
        });
        let events = execute(&mut f.item, &cmd).unwrap();
        assert!(matches!(&events[..], [InventoryEvent::StockCorrected(e)] if e.previous == dec!(5)));
        assert_eq!(f.item.current_stock(), dec!(7));
    }

    #[test]
    fn update_rejects_zero_cost() {
        let f = created(dec!(5));
        let err = f
            .item
            .handle(&InventoryCommand::UpdateItem(UpdateItem {
                tenant_id: f.tenant_id,
                item_id: f.item.id_typed(),
                actor: f.actor,
                changes: ItemChanges {
                    cost_per_unit: Some(dec!(0)),
                    ..ItemChanges::default()
                },
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn consume_never_goes_negative() {
        let mut f = created(dec!(10));
        let consume = |f: &Fixture, qty| {
            InventoryCommand::ConsumeStock(ConsumeStock {
                tenant_id: f.tenant_id,
                item_id: f.item.id_typed(),
                actor: f.actor,
                production_order: AggregateId::new(),
                quantity: qty,
                occurred_at: test_time(),
            })
        };
        let cmd = consume(&f, dec!(10));
        execute(&mut f.item, &cmd).unwrap();
        assert_eq!(f.item.current_stock(), dec!(0));

        let cmd = consume(&f, dec!(0.01));
        let err = execute(&mut f.item, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(f.item.current_stock(), dec!(0));
    }

    #[test]
    fn delete_is_blocked_by_references() {
        let mut f = created(dec!(1));
        let cmd = InventoryCommand::DeleteItem(DeleteItem {
            tenant_id: f.tenant_id,
            item_id: f.item.id_typed(),
            actor: f.actor,
            referenced_by: vec!["Bread".to_string()],
            occurred_at: test_time(),
        });
        let err = execute(&mut f.item, &cmd).unwrap_err();
        assert_eq!(err.details(), ["Bread".to_string()]);
        assert!(f.item.exists());
    }

    #[test]
    fn deleted_item_rejects_further_commands() {
        let mut f = created(dec!(1));
        let cmd = InventoryCommand::DeleteItem(DeleteItem {
            tenant_id: f.tenant_id,
            item_id: f.item.id_typed(),
            actor: f.actor,
            referenced_by: vec![],
            occurred_at: test_time(),
        });
        execute(&mut f.item, &cmd).unwrap();
        assert!(!f.item.exists());

        let err = f.item.handle(&adjust(&f, StockAction::Add, dec!(1))).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn other_tenant_cannot_adjust() {
        let f = created(dec!(1));
        let cmd = InventoryCommand::AdjustStock(AdjustStock {
            tenant_id: TenantId::new(),
            item_id: f.item.id_typed(),
            actor: f.actor,
            action: StockAction::Add,
            quantity: dec!(1),
            reason: None,
            occurred_at: test_time(),
        });
        assert_eq!(
            f.item.handle(&cmd).unwrap_err(),
            DomainError::invariant("tenant mismatch")
        );
    }

    #[test]
    fn stock_action_parses_case_insensitively() {
        assert_eq!("ADD".parse::<StockAction>().unwrap(), StockAction::Add);
        assert!("remove".parse::<StockAction>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

            /// Property: no sequence of adjustments drives stock below zero,
            /// and rejected commands leave the aggregate untouched.
            #[test]
            fn stock_never_negative(ops in prop::collection::vec((any::<bool>(), 1u32..500), 1..40)) {
                let mut f = created(dec!(100));
                for (add, qty) in ops {
                    let action = if add { StockAction::Add } else { StockAction::Subtract };
                    let cmd = adjust(&f, action, Decimal::from(qty));
                    let before = f.item.clone();
                    if execute(&mut f.item, &cmd).is_err() {
                        prop_assert_eq!(&f.item, &before);
                    }
                    prop_assert!(f.item.current_stock() >= Decimal::ZERO);
                }
            }
        }
    }
}
