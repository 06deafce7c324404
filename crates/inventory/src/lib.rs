//! Inventory ledger of raw materials (event-sourced).
//!
//! Business rules only: no IO, no HTTP, no storage. Stock can be edited,
//! adjusted (add/subtract) or consumed by production, and never goes negative.

pub mod item;

pub use item::{
    AdjustStock, ConsumeStock, CreateItem, DeleteItem, InventoryCommand, InventoryEvent,
    InventoryItem, InventoryItemId, ItemChanges, ItemCreated, ItemDeleted, ItemDetails,
    ItemUpdated, StockAction, StockAdjusted, StockConsumed, StockCorrected, UpdateItem,
};
