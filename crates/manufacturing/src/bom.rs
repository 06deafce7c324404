use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kasaku_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId, ValueObject,
};
use kasaku_events::Event;
use kasaku_inventory::InventoryItemId;

use crate::material::MaterialCatalog;

/// Bill of materials identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BomId(pub AggregateId);

impl BomId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for BomId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for BomId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// One recipe line: how much of a material one finished unit needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub material_id: InventoryItemId,
    pub qty_required: Decimal,
}

impl ValueObject for BomLine {}

impl BomLine {
    pub fn new(material_id: InventoryItemId, qty_required: Decimal) -> Self {
        Self {
            material_id,
            qty_required,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.qty_required <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "qty_required for material {} must be positive",
                self.material_id
            )));
        }
        Ok(())
    }
}

/// A line priced against the material's current cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub material_id: InventoryItemId,
    pub qty_required: Decimal,
    pub material_name: String,
    pub material_unit: String,
    pub material_cost: Decimal,
    pub line_cost: Decimal,
}

impl PricedLine {
    pub fn line(&self) -> BomLine {
        BomLine::new(self.material_id, self.qty_required)
    }
}

/// Priced lines (in recipe order) and their total unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
}

impl CostBreakdown {
    pub fn lines(&self) -> Vec<BomLine> {
        self.lines.iter().map(PricedLine::line).collect()
    }
}

fn line_cost(cost_per_unit: Decimal, qty_required: Decimal) -> Result<Decimal, DomainError> {
    cost_per_unit
        .checked_mul(qty_required)
        .ok_or_else(|| DomainError::validation("line cost overflows"))
}

fn add_cost(total: Decimal, cost: Decimal) -> Result<Decimal, DomainError> {
    total
        .checked_add(cost)
        .ok_or_else(|| DomainError::validation("estimated cost overflows"))
}

/// Price every line against the catalog.
///
/// Lines are validated first; the first material that does not resolve fails
/// the whole computation with `NotFound` naming it. Duplicate materials are
/// priced once per line, so they add up.
/// Costs that leave the decimal range are a validation error.
pub fn price_lines<C>(lines: &[BomLine], catalog: &C) -> Result<CostBreakdown, DomainError>
where
    C: MaterialCatalog + ?Sized,
{
    for line in lines {
        line.validate()?;
    }

    let mut priced = Vec::with_capacity(lines.len());
    let mut total = Decimal::ZERO;
    for line in lines {
        let material = catalog
            .material(&line.material_id)
            .ok_or_else(|| DomainError::not_found(format!("material {}", line.material_id)))?;
        let line_cost = line_cost(material.cost_per_unit, line.qty_required)?;
        total = add_cost(total, line_cost)?;
        priced.push(PricedLine {
            material_id: line.material_id,
            qty_required: line.qty_required,
            material_name: material.name,
            material_unit: material.unit,
            material_cost: material.cost_per_unit,
            line_cost,
        });
    }

    Ok(CostBreakdown {
        lines: priced,
        total,
    })
}

/// Aggregate root: BillOfMaterials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillOfMaterials {
    id: BomId,
    tenant_id: Option<TenantId>,
    product_name: String,
    product_code: Option<String>,
    lines: Vec<BomLine>,
    estimated_cost: Decimal,
    selling_price: Option<Decimal>,
    notes: String,
    version: u64,
    created: bool,
    deleted: bool,
}

impl BillOfMaterials {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BomId) -> Self {
        Self {
            id,
            tenant_id: None,
            product_name: String::new(),
            product_code: None,
            lines: Vec::new(),
            estimated_cost: Decimal::ZERO,
            selling_price: None,
            notes: String::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> BomId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn product_code(&self) -> Option<&str> {
        self.product_code.as_deref()
    }

    pub fn lines(&self) -> &[BomLine] {
        &self.lines
    }

    /// Unit cost snapshot taken when the lines were last written.
    pub fn estimated_cost(&self) -> Decimal {
        self.estimated_cost
    }

    pub fn selling_price(&self) -> Option<Decimal> {
        self.selling_price
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn margin(&self) -> Option<Decimal> {
        self.selling_price.map(|p| p - self.estimated_cost)
    }

    pub fn uses_material(&self, material_id: InventoryItemId) -> bool {
        self.lines.iter().any(|l| l.material_id == material_id)
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for BillOfMaterials {
    type Id = BomId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBom.
///
/// `costing` comes from [`price_lines`]; the estimated cost is derived from
/// it here, never taken from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBom {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub product_name: String,
    pub product_code: Option<String>,
    pub selling_price: Option<Decimal>,
    pub notes: String,
    pub costing: CostBreakdown,
    pub occurred_at: DateTime<Utc>,
}

/// Scalar field edits; `None` keeps the current value.
///
/// `selling_price: Some(None)` (JSON `null`) clears the price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomChanges {
    pub product_name: Option<String>,
    pub product_code: Option<String>,
    #[serde(default, deserialize_with = "kasaku_core::patch::double_option")]
    pub selling_price: Option<Option<Decimal>>,
    pub notes: Option<String>,
}

/// Command: UpdateBom. `costing` replaces the whole line list when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBom {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub changes: BomChanges,
    pub costing: Option<CostBreakdown>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteBom. `active_orders` are the PLANNED / IN_PROGRESS orders
/// still pointing at this recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBom {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub active_orders: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomCommand {
    CreateBom(CreateBom),
    UpdateBom(UpdateBom),
    DeleteBom(DeleteBom),
}

/// Event: BomCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomCreated {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub product_name: String,
    pub product_code: Option<String>,
    pub selling_price: Option<Decimal>,
    pub notes: String,
    pub lines: Vec<BomLine>,
    pub estimated_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomDetailsUpdated (full new scalar fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomDetailsUpdated {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub product_name: String,
    pub product_code: Option<String>,
    pub selling_price: Option<Decimal>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomLinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLinesReplaced {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub lines: Vec<BomLine>,
    pub estimated_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BomDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomDeleted {
    pub tenant_id: TenantId,
    pub bom_id: BomId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BomEvent {
    BomCreated(BomCreated),
    BomDetailsUpdated(BomDetailsUpdated),
    BomLinesReplaced(BomLinesReplaced),
    BomDeleted(BomDeleted),
}

impl BomEvent {
    pub fn bom_id(&self) -> BomId {
        match self {
            BomEvent::BomCreated(e) => e.bom_id,
            BomEvent::BomDetailsUpdated(e) => e.bom_id,
            BomEvent::BomLinesReplaced(e) => e.bom_id,
            BomEvent::BomDeleted(e) => e.bom_id,
        }
    }
}

impl Event for BomEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BomEvent::BomCreated(_) => "manufacturing.bom.created",
            BomEvent::BomDetailsUpdated(_) => "manufacturing.bom.details_updated",
            BomEvent::BomLinesReplaced(_) => "manufacturing.bom.lines_replaced",
            BomEvent::BomDeleted(_) => "manufacturing.bom.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            BomEvent::BomCreated(e) => e.tenant_id,
            BomEvent::BomDetailsUpdated(e) => e.tenant_id,
            BomEvent::BomLinesReplaced(e) => e.tenant_id,
            BomEvent::BomDeleted(e) => e.tenant_id,
        }
    }

    fn actor(&self) -> UserId {
        match self {
            BomEvent::BomCreated(e) => e.actor,
            BomEvent::BomDetailsUpdated(e) => e.actor,
            BomEvent::BomLinesReplaced(e) => e.actor,
            BomEvent::BomDeleted(e) => e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BomEvent::BomCreated(e) => e.occurred_at,
            BomEvent::BomDetailsUpdated(e) => e.occurred_at,
            BomEvent::BomLinesReplaced(e) => e.occurred_at,
            BomEvent::BomDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BillOfMaterials {
    type Command = BomCommand;
    type Event = BomEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BomEvent::BomCreated(e) => {
                self.id = e.bom_id;
                self.tenant_id = Some(e.tenant_id);
                self.product_name = e.product_name.clone();
                self.product_code = e.product_code.clone();
                self.selling_price = e.selling_price;
                self.notes = e.notes.clone();
                self.lines = e.lines.clone();
                self.estimated_cost = e.estimated_cost;
                self.created = true;
            }
            BomEvent::BomDetailsUpdated(e) => {
                self.product_name = e.product_name.clone();
                self.product_code = e.product_code.clone();
                self.selling_price = e.selling_price;
                self.notes = e.notes.clone();
            }
            BomEvent::BomLinesReplaced(e) => {
                self.lines = e.lines.clone();
                self.estimated_cost = e.estimated_cost;
            }
            BomEvent::BomDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BomCommand::CreateBom(cmd) => self.handle_create(cmd),
            BomCommand::UpdateBom(cmd) => self.handle_update(cmd),
            BomCommand::DeleteBom(cmd) => self.handle_delete(cmd),
        }
    }
}

fn normalize_code(code: Option<&String>) -> Option<String> {
    code.map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn validate_price(price: Option<Decimal>) -> Result<(), DomainError> {
    match price {
        Some(p) if p < Decimal::ZERO => {
            Err(DomainError::validation("selling_price cannot be negative"))
        }
        _ => Ok(()),
    }
}

/// Re-derive the unit cost from the priced lines; the breakdown's own
/// `total` is not trusted.
fn costed_lines(costing: &CostBreakdown) -> Result<(Vec<BomLine>, Decimal), DomainError> {
    if costing.lines.is_empty() {
        return Err(DomainError::validation(
            "a bill of materials needs at least one line",
        ));
    }
    let mut total = Decimal::ZERO;
    for priced in &costing.lines {
        priced.line().validate()?;
        if priced.material_cost < Decimal::ZERO {
            return Err(DomainError::validation("material cost cannot be negative"));
        }
        total = add_cost(total, line_cost(priced.material_cost, priced.qty_required)?)?;
    }
    Ok((costing.lines(), total))
}

impl BillOfMaterials {
    fn ensure_live(&self, tenant_id: TenantId, bom_id: BomId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("bill of materials {bom_id}")));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != bom_id {
            return Err(DomainError::invariant("bom_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBom) -> Result<Vec<BomEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bill of materials already exists"));
        }
        if cmd.product_name.trim().is_empty() {
            return Err(DomainError::validation("product_name cannot be empty"));
        }
        validate_price(cmd.selling_price)?;
        let (lines, estimated_cost) = costed_lines(&cmd.costing)?;

        Ok(vec![BomEvent::BomCreated(BomCreated {
            tenant_id: cmd.tenant_id,
            bom_id: cmd.bom_id,
            actor: cmd.actor,
            product_name: cmd.product_name.trim().to_string(),
            product_code: normalize_code(cmd.product_code.as_ref()),
            selling_price: cmd.selling_price,
            notes: cmd.notes.clone(),
            lines,
            estimated_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateBom) -> Result<Vec<BomEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.bom_id)?;

        let changes = &cmd.changes;
        let product_name = match &changes.product_name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::validation("product_name cannot be empty"));
            }
            Some(name) => name.trim().to_string(),
            None => self.product_name.clone(),
        };
        let product_code = match &changes.product_code {
            Some(_) => normalize_code(changes.product_code.as_ref()),
            None => self.product_code.clone(),
        };
        validate_price(changes.selling_price.flatten())?;
        let selling_price = changes.selling_price.unwrap_or(self.selling_price);
        let notes = changes.notes.clone().unwrap_or_else(|| self.notes.clone());

        let replaced = cmd.costing.as_ref().map(costed_lines).transpose()?;

        let mut events = Vec::new();
        if product_name != self.product_name
            || product_code != self.product_code
            || selling_price != self.selling_price
            || notes != self.notes
        {
            events.push(BomEvent::BomDetailsUpdated(BomDetailsUpdated {
                tenant_id: cmd.tenant_id,
                bom_id: cmd.bom_id,
                actor: cmd.actor,
                product_name,
                product_code,
                selling_price,
                notes,
                occurred_at: cmd.occurred_at,
            }));
        }
        if let Some((lines, estimated_cost)) = replaced {
            events.push(BomEvent::BomLinesReplaced(BomLinesReplaced {
                tenant_id: cmd.tenant_id,
                bom_id: cmd.bom_id,
                actor: cmd.actor,
                lines,
                estimated_cost,
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_delete(&self, cmd: &DeleteBom) -> Result<Vec<BomEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.bom_id)?;

        if !cmd.active_orders.is_empty() {
            return Err(DomainError::conflict_with(
                format!(
                    "{} is still used by active production orders",
                    self.product_name
                ),
                cmd.active_orders.iter(),
            ));
        }

        Ok(vec![BomEvent::BomDeleted(BomDeleted {
            tenant_id: cmd.tenant_id,
            bom_id: cmd.bom_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
