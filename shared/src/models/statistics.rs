//! Dashboard statistics aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A counter update that would leave its numeric range
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("statistics counter {0} is out of range")]
pub struct CounterOverflow(pub &'static str);

fn add_count(current: i64, delta: i64, counter: &'static str) -> Result<i64, CounterOverflow> {
    current.checked_add(delta).ok_or(CounterOverflow(counter))
}

fn add_amount(
    current: Decimal,
    delta: Decimal,
    counter: &'static str,
) -> Result<Decimal, CounterOverflow> {
    current.checked_add(delta).ok_or(CounterOverflow(counter))
}

/// The singleton dashboard counters document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    /// Sum of approved sale totals
    pub total_sales: Decimal,
    /// Count of approved sales
    pub total_transactions: i64,
    /// Sum of all product stock
    pub items_in_stock: i64,
    pub pending_leaves: i64,
    pub number_of_accounts: i64,
    pub number_of_employees: i64,
    pub outdated_stocks: i64,
    pub total_payments: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Statistics {
    /// First document, treating the prior state as all zeros
    pub fn seeded(delta: &StatisticsDelta, now: DateTime<Utc>) -> Result<Self, CounterOverflow> {
        let mut stats = Self {
            total_sales: Decimal::ZERO,
            total_transactions: 0,
            items_in_stock: 0,
            pending_leaves: 0,
            number_of_accounts: 0,
            number_of_employees: 0,
            outdated_stocks: 0,
            total_payments: Decimal::ZERO,
            last_updated: now,
        };
        stats.apply(delta, now)?;
        Ok(stats)
    }

    /// Add every delta field and stamp `last_updated`. On overflow nothing
    /// changes.
    pub fn apply(&mut self, delta: &StatisticsDelta, now: DateTime<Utc>) -> Result<(), CounterOverflow> {
        let next = Self {
            total_sales: add_amount(self.total_sales, delta.total_sales, "total_sales")?,
            total_transactions: add_count(
                self.total_transactions,
                delta.total_transactions,
                "total_transactions",
            )?,
            items_in_stock: add_count(self.items_in_stock, delta.items_in_stock, "items_in_stock")?,
            pending_leaves: add_count(self.pending_leaves, delta.pending_leaves, "pending_leaves")?,
            number_of_accounts: add_count(
                self.number_of_accounts,
                delta.number_of_accounts,
                "number_of_accounts",
            )?,
            number_of_employees: add_count(
                self.number_of_employees,
                delta.number_of_employees,
                "number_of_employees",
            )?,
            outdated_stocks: add_count(self.outdated_stocks, delta.outdated_stocks, "outdated_stocks")?,
            total_payments: add_amount(self.total_payments, delta.total_payments, "total_payments")?,
            last_updated: now,
        };
        *self = next;
        Ok(())
    }

    /// Replace the counters that can be derived from products and sales
    pub fn reconcile(&mut self, derived: &DerivedTotals, now: DateTime<Utc>) {
        self.total_sales = derived.total_sales;
        self.total_transactions = derived.total_transactions;
        self.items_in_stock = derived.items_in_stock;
        self.last_updated = now;
    }

    /// Difference between these counters and the derived truth
    pub fn drift_from(&self, derived: &DerivedTotals) -> Option<StatisticsDelta> {
        let drift = StatisticsDelta {
            total_sales: derived.total_sales.saturating_sub(self.total_sales),
            total_transactions: derived
                .total_transactions
                .saturating_sub(self.total_transactions),
            items_in_stock: derived.items_in_stock.saturating_sub(self.items_in_stock),
            ..StatisticsDelta::default()
        };
        (!drift.is_empty()).then_some(drift)
    }
}

/// Increments applied to the aggregate. Negative values decrement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatisticsDelta {
    pub total_sales: Decimal,
    pub total_transactions: i64,
    pub items_in_stock: i64,
    pub pending_leaves: i64,
    pub number_of_accounts: i64,
    pub number_of_employees: i64,
    pub outdated_stocks: i64,
    pub total_payments: Decimal,
}

impl StatisticsDelta {
    /// Stock moved in (positive) or out (negative) of the catalog
    pub fn stock(units: i64) -> Self {
        Self {
            items_in_stock: units,
            ..Self::default()
        }
    }

    /// An approved sale of `quantity` units worth `amount`
    pub fn sale(amount: Decimal, quantity: i64) -> Self {
        Self {
            total_sales: amount,
            total_transactions: 1,
            items_in_stock: -quantity,
            ..Self::default()
        }
    }

    /// A sale entering (`+1`) or leaving (`-1`) the approved totals without
    /// touching stock
    pub fn counted_sale(amount: Decimal, direction: i64) -> Self {
        Self {
            total_sales: if direction < 0 { -amount } else { amount },
            total_transactions: direction,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Counters recomputed from the product and sale collections
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedTotals {
    pub total_sales: Decimal,
    pub total_transactions: i64,
    pub items_in_stock: i64,
}
