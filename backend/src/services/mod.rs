//! Business logic services for the Shopfloor backend

pub mod catalog;
pub mod coordinator;
pub mod notification;
pub mod sales;
pub mod side_effects;
pub mod statistics;

pub use catalog::ProductCatalog;
pub use coordinator::InventoryCoordinator;
pub use notification::NotificationSink;
pub use sales::SalesLedger;
pub use side_effects::{SideEffect, SideEffectDispatcher};
pub use statistics::StatisticsService;
