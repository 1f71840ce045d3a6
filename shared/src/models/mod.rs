//! Domain models for the Shopfloor operations backend

mod identity;
mod notification;
mod product;
mod sale;
mod statistics;

pub use identity::*;
pub use notification::*;
pub use product::*;
pub use sale::*;
pub use statistics::*;
