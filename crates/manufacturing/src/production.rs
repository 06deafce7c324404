use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kasaku_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use kasaku_events::Event;

use crate::availability::AvailabilityReport;
use crate::bom::BomId;

/// Production order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductionOrderId(pub AggregateId);

impl ProductionOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for ProductionOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductionOrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Production order status machine.
///
/// `Planned -> InProgress -> Completed`, with `Planned -> Completed` allowed
/// as a shortcut. `Cancelled` is reachable from either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl ProductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStatus::Planned => "PLANNED",
            ProductionStatus::InProgress => "IN_PROGRESS",
            ProductionStatus::Completed => "COMPLETED",
            ProductionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProductionStatus::Completed | ProductionStatus::Cancelled)
    }

    /// Planned or in progress: the order still holds on to its recipe.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl core::fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ProductionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLANNED" => Ok(Self::Planned),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown production status '{other}'"
            ))),
        }
    }
}

/// Aggregate root: ProductionOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionOrder {
    id: ProductionOrderId,
    tenant_id: Option<TenantId>,
    bom_id: Option<BomId>,
    order_date: Option<NaiveDate>,
    target_date: Option<NaiveDate>,
    quantity: u32,
    total_cost: Decimal,
    status: ProductionStatus,
    completed_date: Option<NaiveDate>,
    notes: String,
    version: u64,
    created: bool,
    deleted: bool,
}

impl ProductionOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductionOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            bom_id: None,
            order_date: None,
            target_date: None,
            quantity: 0,
            total_cost: Decimal::ZERO,
            status: ProductionStatus::Planned,
            completed_date: None,
            notes: String::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> ProductionOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn bom_id(&self) -> Option<BomId> {
        self.bom_id
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn target_date(&self) -> Option<NaiveDate> {
        self.target_date
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Cost snapshot: recipe unit cost × quantity at the last edit of either.
    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn status(&self) -> ProductionStatus {
        self.status
    }

    pub fn completed_date(&self) -> Option<NaiveDate> {
        self.completed_date
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for ProductionOrder {
    type Id = ProductionOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlanProduction.
///
/// `unit_cost` is the recipe's stored estimated cost and `availability` the
/// check for exactly this recipe and quantity, both looked up by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub bom_id: BomId,
    pub quantity: u32,
    pub unit_cost: Decimal,
    pub availability: AvailabilityReport,
    pub order_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Field edits; `None` keeps the current value.
///
/// `target_date: Some(None)` (JSON `null`) clears the date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionChanges {
    pub bom_id: Option<BomId>,
    pub quantity: Option<u32>,
    #[serde(default, deserialize_with = "kasaku_core::patch::double_option")]
    pub target_date: Option<Option<NaiveDate>>,
    pub notes: Option<String>,
}

impl ProductionChanges {
    pub fn touches_costing(&self) -> bool {
        self.bom_id.is_some() || self.quantity.is_some()
    }
}

/// Command: ReviseProduction.
///
/// `unit_cost` is the estimated cost of the recipe the order points to after
/// the edit; required whenever the recipe or the quantity changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub changes: ProductionChanges,
    pub unit_cost: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartProduction (PLANNED -> IN_PROGRESS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub availability: AvailabilityReport,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteProduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub availability: AvailabilityReport,
    pub completed_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelProduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelProduction {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteProductionOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProductionOrder {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionCommand {
    PlanProduction(PlanProduction),
    ReviseProduction(ReviseProduction),
    StartProduction(StartProduction),
    CompleteProduction(CompleteProduction),
    CancelProduction(CancelProduction),
    DeleteProductionOrder(DeleteProductionOrder),
}

/// Event: ProductionPlanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionPlanned {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub bom_id: BomId,
    pub quantity: u32,
    pub total_cost: Decimal,
    pub order_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductionRevised (full new editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRevised {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub bom_id: BomId,
    pub quantity: u32,
    pub total_cost: Decimal,
    pub target_date: Option<NaiveDate>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductionStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStarted {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductionCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCompleted {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub bom_id: BomId,
    pub quantity: u32,
    pub total_cost: Decimal,
    pub completed_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductionCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCancelled {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub previous: ProductionStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductionOrderDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrderDeleted {
    pub tenant_id: TenantId,
    pub order_id: ProductionOrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    ProductionPlanned(ProductionPlanned),
    ProductionRevised(ProductionRevised),
    ProductionStarted(ProductionStarted),
    ProductionCompleted(ProductionCompleted),
    ProductionCancelled(ProductionCancelled),
    ProductionOrderDeleted(ProductionOrderDeleted),
}

macro_rules! each_event {
    ($ev:expr, $e:ident => $body:expr) => {
        match $ev {
            ProductionEvent::ProductionPlanned($e) => $body,
            ProductionEvent::ProductionRevised($e) => $body,
            ProductionEvent::ProductionStarted($e) => $body,
            ProductionEvent::ProductionCompleted($e) => $body,
            ProductionEvent::ProductionCancelled($e) => $body,
            ProductionEvent::ProductionOrderDeleted($e) => $body,
        }
    };
}

impl ProductionEvent {
    pub fn order_id(&self) -> ProductionOrderId {
        each_event!(self, e => e.order_id)
    }
}

impl Event for ProductionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductionEvent::ProductionPlanned(_) => "manufacturing.production.planned",
            ProductionEvent::ProductionRevised(_) => "manufacturing.production.revised",
            ProductionEvent::ProductionStarted(_) => "manufacturing.production.started",
            ProductionEvent::ProductionCompleted(_) => "manufacturing.production.completed",
            ProductionEvent::ProductionCancelled(_) => "manufacturing.production.cancelled",
            ProductionEvent::ProductionOrderDeleted(_) => "manufacturing.production.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn tenant_id(&self) -> TenantId {
        each_event!(self, e => e.tenant_id)
    }

    fn actor(&self) -> UserId {
        each_event!(self, e => e.actor)
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        each_event!(self, e => e.occurred_at)
    }
}

impl Aggregate for ProductionOrder {
    type Command = ProductionCommand;
    type Event = ProductionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductionEvent::ProductionPlanned(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.bom_id = Some(e.bom_id);
                self.quantity = e.quantity;
                self.total_cost = e.total_cost;
                self.order_date = Some(e.order_date);
                self.target_date = e.target_date;
                self.notes = e.notes.clone();
                self.status = ProductionStatus::Planned;
                self.created = true;
            }
            ProductionEvent::ProductionRevised(e) => {
                self.bom_id = Some(e.bom_id);
                self.quantity = e.quantity;
                self.total_cost = e.total_cost;
                self.target_date = e.target_date;
                self.notes = e.notes.clone();
            }
            ProductionEvent::ProductionStarted(_) => {
                self.status = ProductionStatus::InProgress;
            }
            ProductionEvent::ProductionCompleted(e) => {
                self.status = ProductionStatus::Completed;
                self.completed_date = Some(e.completed_on);
            }
            ProductionEvent::ProductionCancelled(_) => {
                self.status = ProductionStatus::Cancelled;
            }
            ProductionEvent::ProductionOrderDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductionCommand::PlanProduction(cmd) => self.handle_plan(cmd),
            ProductionCommand::ReviseProduction(cmd) => self.handle_revise(cmd),
            ProductionCommand::StartProduction(cmd) => self.handle_start(cmd),
            ProductionCommand::CompleteProduction(cmd) => self.handle_complete(cmd),
            ProductionCommand::CancelProduction(cmd) => self.handle_cancel(cmd),
            ProductionCommand::DeleteProductionOrder(cmd) => self.handle_delete(cmd),
        }
    }
}

fn ensure_available(report: &AvailabilityReport, quantity: u32) -> Result<(), DomainError> {
    if report.available {
        return Ok(());
    }
    Err(DomainError::insufficient_stock(
        format!("not enough raw material to produce {quantity} units"),
        report.details.clone(),
    ))
}

fn ensure_quantity(quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

fn ensure_unit_cost(unit_cost: Decimal) -> Result<(), DomainError> {
    if unit_cost < Decimal::ZERO {
        return Err(DomainError::invariant("recipe unit cost cannot be negative"));
    }
    Ok(())
}

fn order_cost(unit_cost: Decimal, quantity: u32) -> Result<Decimal, DomainError> {
    unit_cost
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| DomainError::validation("total cost overflows"))
}

impl ProductionOrder {
    fn ensure_live(&self, tenant_id: TenantId, order_id: ProductionOrderId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("production order {order_id}")));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    /// The report must describe this order's current recipe and quantity.
    fn ensure_report_matches(&self, report: &AvailabilityReport) -> Result<(), DomainError> {
        if Some(report.bom_id) != self.bom_id || report.quantity != self.quantity {
            return Err(DomainError::invariant(
                "availability report does not match the order",
            ));
        }
        Ok(())
    }

    fn handle_plan(&self, cmd: &PlanProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("production order already exists"));
        }
        ensure_quantity(cmd.quantity)?;
        ensure_unit_cost(cmd.unit_cost)?;
        if cmd.availability.bom_id != cmd.bom_id || cmd.availability.quantity != cmd.quantity {
            return Err(DomainError::invariant(
                "availability report does not match the order",
            ));
        }
        ensure_available(&cmd.availability, cmd.quantity)?;

        Ok(vec![ProductionEvent::ProductionPlanned(ProductionPlanned {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            bom_id: cmd.bom_id,
            quantity: cmd.quantity,
            total_cost: order_cost(cmd.unit_cost, cmd.quantity)?,
            order_date: cmd.order_date,
            target_date: cmd.target_date,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "a {} production order cannot be edited",
                self.status
            )));
        }

        let changes = &cmd.changes;
        let current_bom = self
            .bom_id
            .ok_or_else(|| DomainError::invariant("production order has no recipe"))?;
        let bom_id = changes.bom_id.unwrap_or(current_bom);
        let quantity = changes.quantity.unwrap_or(self.quantity);
        let costing_changed = bom_id != current_bom || quantity != self.quantity;

        ensure_quantity(quantity)?;

        let total_cost = if changes.touches_costing() {
            let unit_cost = cmd.unit_cost.ok_or_else(|| {
                DomainError::invariant("unit cost is required when recipe or quantity change")
            })?;
            ensure_unit_cost(unit_cost)?;
            order_cost(unit_cost, quantity)?
        } else {
            self.total_cost
        };
        let target_date = changes.target_date.unwrap_or(self.target_date);
        let notes = changes.notes.clone().unwrap_or_else(|| self.notes.clone());

        if !costing_changed
            && total_cost == self.total_cost
            && target_date == self.target_date
            && notes == self.notes
        {
            return Ok(Vec::new());
        }

        Ok(vec![ProductionEvent::ProductionRevised(ProductionRevised {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            bom_id,
            quantity,
            total_cost,
            target_date,
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.order_id)?;
        if self.status != ProductionStatus::Planned {
            return Err(DomainError::invalid_transition(
                self.status,
                ProductionStatus::InProgress,
            ));
        }
        self.ensure_report_matches(&cmd.availability)?;
        ensure_available(&cmd.availability, self.quantity)?;

        Ok(vec![ProductionEvent::ProductionStarted(ProductionStarted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(
                self.status,
                ProductionStatus::Completed,
            ));
        }
        self.ensure_report_matches(&cmd.availability)?;
        ensure_available(&cmd.availability, self.quantity)?;

        let bom_id = self
            .bom_id
            .ok_or_else(|| DomainError::invariant("production order has no recipe"))?;

        Ok(vec![ProductionEvent::ProductionCompleted(ProductionCompleted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            bom_id,
            quantity: self.quantity,
            total_cost: self.total_cost,
            completed_on: cmd.completed_on,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelProduction) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(
                self.status,
                ProductionStatus::Cancelled,
            ));
        }

        Ok(vec![ProductionEvent::ProductionCancelled(ProductionCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            previous: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProductionOrder) -> Result<Vec<ProductionEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.order_id)?;
        if self.status == ProductionStatus::InProgress {
            return Err(DomainError::conflict_with(
                "production is in progress and cannot be deleted",
                [cmd.order_id],
            ));
        }

        Ok(vec![ProductionEvent::ProductionOrderDeleted(ProductionOrderDeleted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
