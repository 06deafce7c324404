//! Read-only view of raw materials as the manufacturing rules need them.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kasaku_inventory::{InventoryItem, InventoryItemId};

/// Price and stock of one material at the moment it was looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSnapshot {
    pub id: InventoryItemId,
    pub name: String,
    pub unit: String,
    pub cost_per_unit: Decimal,
    pub current_stock: Decimal,
}

impl From<&InventoryItem> for MaterialSnapshot {
    fn from(item: &InventoryItem) -> Self {
        Self {
            id: item.id_typed(),
            name: item.name().to_string(),
            unit: item.unit().to_string(),
            cost_per_unit: item.cost_per_unit(),
            current_stock: item.current_stock(),
        }
    }
}

/// Resolves material ids of one owner. `None` means the material does not
/// exist (or no longer exists) for that owner.
pub trait MaterialCatalog {
    fn material(&self, id: &InventoryItemId) -> Option<MaterialSnapshot>;
}

impl MaterialCatalog for HashMap<InventoryItemId, MaterialSnapshot> {
    fn material(&self, id: &InventoryItemId) -> Option<MaterialSnapshot> {
        self.get(id).cloned()
    }
}

impl MaterialCatalog for BTreeMap<InventoryItemId, MaterialSnapshot> {
    fn material(&self, id: &InventoryItemId) -> Option<MaterialSnapshot> {
        self.get(id).cloned()
    }
}

impl MaterialCatalog for [MaterialSnapshot] {
    fn material(&self, id: &InventoryItemId) -> Option<MaterialSnapshot> {
        self.iter().find(|m| &m.id == id).cloned()
    }
}
