//! Stock availability check: can a recipe be produced `quantity` times with
//! the stock on hand right now?
//!
//! Point-in-time and side-effect free. Nothing is reserved; callers that act
//! on the answer must re-run it inside their write critical section.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kasaku_inventory::InventoryItemId;

use crate::bom::{BillOfMaterials, BomId};
use crate::material::MaterialCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Sufficient,
    Short,
    MissingMaterial,
    /// `qty_required × quantity` does not fit in a decimal.
    OutOfRange,
}

/// Outcome for one recipe line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAvailability {
    pub material_id: InventoryItemId,
    /// Empty when the material no longer resolves.
    pub material_name: String,
    pub unit: String,
    pub required: Decimal,
    pub on_hand: Decimal,
    pub status: LineStatus,
}

impl LineAvailability {
    /// Human-readable line for the shortage report.
    pub fn detail(&self) -> String {
        match self.status {
            LineStatus::Sufficient => format!("{}: OK", self.material_name),
            LineStatus::Short => format!(
                "{}: needs {} {}, available {} {}",
                self.material_name,
                self.required.normalize(),
                self.unit,
                self.on_hand.normalize(),
                self.unit
            ),
            LineStatus::MissingMaterial => format!("material {} not found", self.material_id),
            LineStatus::OutOfRange => format!(
                "{}: required quantity overflows",
                if self.material_name.is_empty() {
                    self.material_id.to_string()
                } else {
                    self.material_name.clone()
                }
            ),
        }
    }
}

/// Answer of [`check_availability`].
///
/// `details` has exactly one entry per recipe line, in recipe order, whether
/// the line passes or not. An unresolvable recipe yields a single
/// explanatory entry and no `lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub bom_id: BomId,
    pub quantity: u32,
    pub available: bool,
    pub details: Vec<String>,
    pub lines: Vec<LineAvailability>,
}

impl AvailabilityReport {
    /// The detail entries of failing lines only.
    pub fn shortages(&self) -> Vec<String> {
        if self.lines.is_empty() {
            return self.details.clone();
        }
        self.lines
            .iter()
            .filter(|l| l.status != LineStatus::Sufficient)
            .map(LineAvailability::detail)
            .collect()
    }
}

/// Compare `qty_required × quantity` of every line with live stock.
///
/// Lines naming the same material draw from one running balance, so the
/// second line only sees what the first one left behind. `on_hand` of a line
/// is that remaining balance.
///
/// Fails closed: a missing (or deleted) recipe, a missing material and a
/// requirement too large to represent all make the report unavailable
/// instead of erroring.
pub fn check_availability<C>(
    bom_id: BomId,
    bom: Option<&BillOfMaterials>,
    quantity: u32,
    catalog: &C,
) -> AvailabilityReport
where
    C: MaterialCatalog + ?Sized,
{
    let Some(bom) = bom.filter(|b| b.exists()) else {
        return AvailabilityReport {
            bom_id,
            quantity,
            available: false,
            details: vec![format!("bill of materials {bom_id} not found")],
            lines: Vec::new(),
        };
    };

    let multiplier = Decimal::from(quantity);
    let mut drawn: HashMap<InventoryItemId, Decimal> = HashMap::new();
    let mut lines = Vec::with_capacity(bom.lines().len());

    for line in bom.lines() {
        let material = catalog.material(&line.material_id);
        let (material_name, unit, stock) = match &material {
            Some(m) => (m.name.clone(), m.unit.clone(), m.current_stock),
            None => (String::new(), String::new(), Decimal::ZERO),
        };

        let Some(required) = line.qty_required.checked_mul(multiplier) else {
            lines.push(LineAvailability {
                material_id: line.material_id,
                material_name,
                unit,
                required: Decimal::MAX,
                on_hand: stock,
                status: LineStatus::OutOfRange,
            });
            continue;
        };

        if material.is_none() {
            lines.push(LineAvailability {
                material_id: line.material_id,
                material_name,
                unit,
                required,
                on_hand: Decimal::ZERO,
                status: LineStatus::MissingMaterial,
            });
            continue;
        }

        let already = drawn.entry(line.material_id).or_insert(Decimal::ZERO);
        let on_hand = (stock - *already).max(Decimal::ZERO);
        *already = already.checked_add(required).unwrap_or(Decimal::MAX);

        lines.push(LineAvailability {
            material_id: line.material_id,
            material_name,
            unit,
            required,
            on_hand,
            status: if on_hand < required {
                LineStatus::Short
            } else {
                LineStatus::Sufficient
            },
        });
    }

    AvailabilityReport {
        bom_id,
        quantity,
        available: lines.iter().all(|l| l.status == LineStatus::Sufficient),
        details: lines.iter().map(LineAvailability::detail).collect(),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::{BomCommand, BomLine, CreateBom, price_lines};
    use crate::material::MaterialSnapshot;
    use chrono::Utc;
    use kasaku_core::{TenantId, UserId};
    use kasaku_events::execute;
    use rust_decimal_macros::dec;

    fn rm(name: &str, cost: Decimal, stock: Decimal) -> MaterialSnapshot {
        MaterialSnapshot {
            id: InventoryItemId::generate(),
            name: name.to_string(),
            unit: "kg".to_string(),
            cost_per_unit: cost,
            current_stock: stock,
        }
    }

    fn bom_of(lines: &[BomLine], catalog: &HashMap<InventoryItemId, MaterialSnapshot>) -> BillOfMaterials {
        let bom_id = BomId::generate();
        let mut bom = BillOfMaterials::empty(bom_id);
        execute(
            &mut bom,
            &BomCommand::CreateBom(CreateBom {
                tenant_id: TenantId::new(),
                bom_id,
                actor: UserId::new(),
                product_name: "Widget".to_string(),
                product_code: None,
                selling_price: None,
                notes: String::new(),
                costing: price_lines(lines, catalog).unwrap(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        bom
    }

    fn catalog(materials: &[&MaterialSnapshot]) -> HashMap<InventoryItemId, MaterialSnapshot> {
        materials.iter().map(|m| (m.id, (*m).clone())).collect()
    }

    #[test]
    fn ten_units_of_rm1_fit_in_stock() {
        let rm1 = rm("RM-1", dec!(100), dec!(50));
        let cat = catalog(&[&rm1]);
        let bom = bom_of(&[BomLine::new(rm1.id, dec!(2))], &cat);

        let report = check_availability(bom.id_typed(), Some(&bom), 10, &cat);
        assert!(report.available);
        assert_eq!(report.details, vec!["RM-1: OK".to_string()]);
        assert_eq!(report.lines[0].required, dec!(20));
    }

    #[test]
    fn thirty_units_are_short_and_name_the_material() {
        let rm1 = rm("RM-1", dec!(100), dec!(50));
        let cat = catalog(&[&rm1]);
        let bom = bom_of(&[BomLine::new(rm1.id, dec!(2))], &cat);

        let report = check_availability(bom.id_typed(), Some(&bom), 30, &cat);
        assert!(!report.available);
        assert_eq!(
            report.details,
            vec!["RM-1: needs 60 kg, available 50 kg".to_string()]
        );
        assert_eq!(report.lines[0].status, LineStatus::Short);
    }

    #[test]
    fn one_detail_per_line_in_order() {
        let a = rm("Flour", dec!(1), dec!(100));
        let b = rm("Yeast", dec!(1), dec!(1));
        let c = rm("Salt", dec!(1), dec!(100));
        let cat = catalog(&[&a, &b, &c]);
        let bom = bom_of(
            &[
                BomLine::new(a.id, dec!(1)),
                BomLine::new(b.id, dec!(0.5)),
                BomLine::new(c.id, dec!(0.1)),
            ],
            &cat,
        );

        let report = check_availability(bom.id_typed(), Some(&bom), 4, &cat);
        assert!(!report.available);
        assert_eq!(report.details.len(), 3);
        assert_eq!(report.details[0], "Flour: OK");
        assert_eq!(report.details[1], "Yeast: needs 2 kg, available 1 kg");
        assert_eq!(report.details[2], "Salt: OK");
        assert_eq!(report.shortages(), vec![report.details[1].clone()]);
    }

    #[test]
    fn missing_material_fails_closed() {
        let a = rm("Flour", dec!(1), dec!(100));
        let cat = catalog(&[&a]);
        let bom = bom_of(&[BomLine::new(a.id, dec!(1))], &cat);

        let report = check_availability(bom.id_typed(), Some(&bom), 1, &HashMap::new());
        assert!(!report.available);
        assert_eq!(report.details, vec![format!("material {} not found", a.id)]);
    }

    #[test]
    fn missing_bom_fails_closed() {
        let bom_id = BomId::generate();
        let report = check_availability(bom_id, None, 1, &HashMap::new());
        assert!(!report.available);
        assert!(report.lines.is_empty());
        assert_eq!(report.details, vec![format!("bill of materials {bom_id} not found")]);
    }

    #[test]
    fn repeated_checks_agree() {
        let rm1 = rm("RM-1", dec!(100), dec!(50));
        let cat = catalog(&[&rm1]);
        let bom = bom_of(&[BomLine::new(rm1.id, dec!(2))], &cat);

        let first = check_availability(bom.id_typed(), Some(&bom), 25, &cat);
        let second = check_availability(bom.id_typed(), Some(&bom), 25, &cat);
        assert_eq!(first, second);
        assert!(first.available);
    }

    #[test]
    fn repeated_material_lines_share_one_balance() {
        let rm1 = rm("RM-1", dec!(1), dec!(40));
        let cat = catalog(&[&rm1]);
        let bom = bom_of(
            &[BomLine::new(rm1.id, dec!(2)), BomLine::new(rm1.id, dec!(3))],
            &cat,
        );

        let report = check_availability(bom.id_typed(), Some(&bom), 10, &cat);
        assert!(!report.available);
        assert_eq!(
            report.details,
            vec![
                "RM-1: OK".to_string(),
                "RM-1: needs 30 kg, available 20 kg".to_string(),
            ]
        );

        let fits = check_availability(bom.id_typed(), Some(&bom), 8, &cat);
        assert!(fits.available);
    }

    #[test]
    fn requirement_beyond_decimal_range_is_unavailable() {
        let rm1 = rm("RM-1", dec!(1), Decimal::MAX);
        let cat = catalog(&[&rm1]);
        let bom = bom_of(&[BomLine::new(rm1.id, Decimal::MAX / dec!(2))], &cat);

        let report = check_availability(bom.id_typed(), Some(&bom), 3, &cat);
        assert!(!report.available);
        assert_eq!(report.lines[0].status, LineStatus::OutOfRange);
        assert_eq!(report.details, vec!["RM-1: required quantity overflows".to_string()]);
    }
}
