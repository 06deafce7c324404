//! Manufacturing domain module: bills of materials, production orders and
//! the stock availability check that gates them.
//!
//! Pure, deterministic domain logic. Material prices and stock levels come
//! in through [`MaterialCatalog`]; nothing here performs IO.

pub mod availability;
pub mod bom;
pub mod material;
pub mod production;

pub use availability::{AvailabilityReport, LineAvailability, LineStatus, check_availability};
pub use bom::{
    BillOfMaterials, BomChanges, BomCommand, BomCreated, BomDeleted, BomDetailsUpdated, BomEvent,
    BomId, BomLine, BomLinesReplaced, CostBreakdown, CreateBom, DeleteBom, PricedLine, UpdateBom,
    price_lines,
};
pub use material::{MaterialCatalog, MaterialSnapshot};
pub use production::{
    CancelProduction, CompleteProduction, DeleteProductionOrder, PlanProduction,
    ProductionCancelled, ProductionChanges, ProductionCommand, ProductionCompleted,
    ProductionEvent, ProductionOrder, ProductionOrderDeleted, ProductionOrderId,
    ProductionPlanned, ProductionRevised, ProductionStarted, ProductionStatus, ReviseProduction,
    StartProduction,
};
