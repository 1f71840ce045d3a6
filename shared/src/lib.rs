//! Shared types and models for the Shopfloor operations backend
//!
//! This crate contains the domain records, request inputs and response
//! envelope shared between the backend and its clients.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
