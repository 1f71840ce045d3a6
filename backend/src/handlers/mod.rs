//! HTTP handlers
//!
//! Thin adapters from requests to services; no business rules live here.

mod audit;
mod health;
mod inventory;
mod notification;
mod sales;
mod statistics;

pub use audit::*;
pub use health::*;
pub use inventory::*;
pub use notification::*;
pub use sales::*;
pub use statistics::*;
