//! Sales ledger models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::Product;
use crate::validation::validate_not_blank;

/// Sale lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Pending,
    Approved,
    Refunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Approved => "approved",
            SaleStatus::Refunded => "refunded",
        }
    }

    /// Only `pending -> approved` and `approved -> refunded` are allowed
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        matches!(
            (self, next),
            (SaleStatus::Pending, SaleStatus::Approved)
                | (SaleStatus::Approved, SaleStatus::Refunded)
        )
    }

    /// Whether sales in this status count towards the sales totals
    pub fn is_counted(&self) -> bool {
        matches!(self, SaleStatus::Approved)
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sale status: {0}")]
pub struct UnknownSaleStatus(pub String);

impl FromStr for SaleStatus {
    type Err = UnknownSaleStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SaleStatus::Pending),
            "approved" => Ok(SaleStatus::Approved),
            "refunded" => Ok(SaleStatus::Refunded),
            other => Err(UnknownSaleStatus(other.to_string())),
        }
    }
}

/// An immutable sale record. The price and category are snapshots taken
/// from the product at the moment of sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: Uuid,
    pub product_name: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: i64,
    pub total_amount: Decimal,
    pub status: SaleStatus,
    pub purchaser_id: Uuid,
    pub sale_date: DateTime<Utc>,
}

impl Sale {
    /// Build a sale from a product snapshot. The total is always computed
    /// from the snapshot price.
    pub fn from_snapshot(
        product: &Product,
        quantity: i64,
        status: SaleStatus,
        purchaser_id: Uuid,
    ) -> Result<Self, TotalOverflow> {
        Ok(Self {
            id: Uuid::new_v4(),
            product_name: product.name.clone(),
            category: product.category.clone(),
            unit_price: product.price,
            quantity,
            total_amount: line_total(product.price, quantity)?,
            status,
            purchaser_id,
            sale_date: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("sale total is out of range")]
pub struct TotalOverflow;

/// `price * quantity`, failing instead of overflowing
pub fn line_total(price: Decimal, quantity: i64) -> Result<Decimal, TotalOverflow> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or(TotalOverflow)
}

/// Input for buying a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseInput {
    #[validate(
        length(min = 1, max = 200, message = "Product name is required"),
        custom = "validate_not_blank"
    )]
    pub name: String,
    #[validate(range(min = 1, max = 1000000, message = "Quantity must be between 1 and 1000000"))]
    pub quantity: i64,
    /// Client-chosen key making retries of the same purchase safe
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "Idempotency key must be 1-128 characters"))]
    pub idempotency_key: Option<String>,
}

/// Input for a sale status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSaleStatusInput {
    pub status: SaleStatus,
}

/// Purchase confirmation returned to the buyer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseReceipt {
    pub sale_id: Uuid,
    pub product_name: String,
    pub quantity_bought: i64,
    pub total_amount: Decimal,
    pub remaining_stock: i64,
    /// True when this receipt answers a retried request
    #[serde(default)]
    pub replayed: bool,
}

impl PurchaseReceipt {
    pub fn new(sale: &Sale, remaining_stock: i64) -> Self {
        Self {
            sale_id: sale.id,
            product_name: sale.product_name.clone(),
            quantity_bought: sale.quantity,
            total_amount: sale.total_amount,
            remaining_stock,
            replayed: false,
        }
    }

    pub fn into_replay(self) -> Self {
        Self {
            replayed: true,
            ..self
        }
    }
}
