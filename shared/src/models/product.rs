//! Product catalog models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{validate_not_blank, validate_price};

/// A stocked product. The name is the case-sensitive identity key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: Decimal,
    /// Never negative
    pub stock: i64,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Input for adding stock, creating the product when the name is new
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StockInInput {
    #[validate(
        length(min = 1, max = 200, message = "Product name is required"),
        custom = "validate_not_blank"
    )]
    pub name: String,
    #[validate(
        length(min = 1, max = 100, message = "Category is required"),
        custom = "validate_not_blank"
    )]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 1, max = 1000000000, message = "Stock must be between 1 and 1000000000"))]
    pub stock: i64,
}

/// Input for overwriting every mutable product field
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EditProductInput {
    #[validate(
        length(min = 1, max = 200, message = "New product name is required"),
        custom = "validate_not_blank"
    )]
    pub new_name: String,
    #[validate(
        length(min = 1, max = 100, message = "Category is required"),
        custom = "validate_not_blank"
    )]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, max = 1000000000, message = "Stock must be between 0 and 1000000000"))]
    pub stock: i64,
}

/// Product state on both sides of an edit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductEdit {
    pub previous: Product,
    pub current: Product,
}

impl ProductEdit {
    /// Change in units on hand caused by the edit
    pub fn stock_change(&self) -> i64 {
        self.current.stock - self.previous.stock
    }
}
