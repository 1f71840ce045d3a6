//! In-process store for tests and single-node development runs
//!
//! Each operation completes inside one lock acquisition, giving the same
//! atomicity contract as the conditional statements of the PostgreSQL store.
//! Locks are always taken in the order products, sales, statistics.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    CounterOverflow, DerivedTotals, Notification, Product, PurchaseReceipt, Sale, SaleStatus, Statistics,
    StatisticsDelta,
};
use uuid::Uuid;

use super::{
    CatalogStore, KeyClaim, KeyPolicy, NewStock, NotificationStore, ProductUpdate, SalesStore,
    StatisticsStore, StockDecrement,
};
use crate::error::{AppError, AppResult};

/// Thread-safe in-memory implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    products: Arc<RwLock<HashMap<String, Product>>>,
    sales: Arc<RwLock<Vec<Sale>>>,
    purchase_keys: Arc<RwLock<HashMap<String, KeyEntry>>>,
    statistics: Arc<RwLock<Option<Statistics>>>,
    notifications: Arc<RwLock<Vec<Notification>>>,
}

/// A claimed purchase key and, once finished, its receipt
#[derive(Clone)]
struct KeyEntry {
    receipt: Option<PurchaseReceipt>,
    claimed_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl KeyEntry {
    fn claimed(now: DateTime<Utc>) -> Self {
        Self {
            receipt: None,
            claimed_at: now,
            completed_at: None,
        }
    }

    fn last_touched(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.claimed_at)
    }
}

/// Whether at least `age` has passed between `at` and `now`
fn older_than(at: DateTime<Utc>, now: DateTime<Utc>, age: Duration) -> bool {
    (now - at).to_std().map_or(false, |elapsed| elapsed >= age)
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Persistence("in-memory store lock poisoned".to_string())
}

fn stock_out_of_range() -> AppError {
    AppError::Validation {
        field: "stock".to_string(),
        message: "Stock is out of range".to_string(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn totals(products: &HashMap<String, Product>, sales: &[Sale]) -> AppResult<DerivedTotals> {
        let mut totals = DerivedTotals::default();
        for sale in sales.iter().filter(|s| s.status.is_counted()) {
            totals.total_sales = totals
                .total_sales
                .checked_add(sale.total_amount)
                .ok_or(CounterOverflow("total_sales"))?;
            totals.total_transactions += 1;
        }
        for product in products.values() {
            totals.items_in_stock = totals
                .items_in_stock
                .checked_add(product.stock)
                .ok_or(CounterOverflow("items_in_stock"))?;
        }
        Ok(totals)
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        let _products = self.products.read().map_err(poisoned)?;
        Ok(())
    }

    async fn find_product(&self, name: &str) -> AppResult<Option<Product>> {
        let products = self.products.read().map_err(poisoned)?;
        Ok(products.get(name).cloned())
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let products = self.products.read().map_err(poisoned)?;
        let mut all: Vec<Product> = products.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn search_products(&self, query: &str) -> AppResult<Vec<Product>> {
        let needle = query.to_lowercase();
        let products = self.products.read().map_err(poisoned)?;
        let mut found: Vec<Product> = products
            .values()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.category.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn upsert_stock(&self, stock: NewStock) -> AppResult<(Product, bool)> {
        let mut products = self.products.write().map_err(poisoned)?;
        if let Some(existing) = products.get_mut(&stock.name) {
            existing.stock = existing
                .stock
                .checked_add(stock.quantity)
                .ok_or_else(stock_out_of_range)?;
            return Ok((existing.clone(), false));
        }

        let product = Product {
            id: Uuid::new_v4(),
            name: stock.name.clone(),
            category: stock.category,
            price: stock.price,
            stock: stock.quantity,
            owner_id: stock.owner_id,
            created_at: Utc::now(),
        };
        products.insert(stock.name, product.clone());
        Ok((product, true))
    }

    async fn restore_stock(&self, name: &str, quantity: i64) -> AppResult<Option<Product>> {
        let mut products = self.products.write().map_err(poisoned)?;
        let Some(product) = products.get_mut(name) else {
            return Ok(None);
        };
        product.stock = product
            .stock
            .checked_add(quantity)
            .ok_or_else(stock_out_of_range)?;
        Ok(Some(product.clone()))
    }

    async fn replace_product(
        &self,
        name: &str,
        update: ProductUpdate,
    ) -> AppResult<Option<(Product, Product)>> {
        let mut products = self.products.write().map_err(poisoned)?;
        if !products.contains_key(name) {
            return Ok(None);
        }
        if update.name != name && products.contains_key(&update.name) {
            return Err(AppError::Conflict(format!(
                "A product named {} already exists",
                update.name
            )));
        }

        let Some(previous) = products.remove(name) else {
            return Ok(None);
        };
        let current = Product {
            name: update.name.clone(),
            category: update.category,
            price: update.price,
            stock: update.stock,
            ..previous.clone()
        };
        products.insert(update.name, current.clone());
        Ok(Some((previous, current)))
    }

    async fn decrement_stock(&self, name: &str, quantity: i64) -> AppResult<StockDecrement> {
        let mut products = self.products.write().map_err(poisoned)?;
        let Some(product) = products.get_mut(name) else {
            return Ok(StockDecrement::Missing);
        };
        if product.stock < quantity {
            return Ok(StockDecrement::Insufficient {
                remaining: product.stock,
            });
        }
        product.stock -= quantity;
        Ok(StockDecrement::Applied(product.clone()))
    }

    async fn delete_product(&self, name: &str) -> AppResult<Option<Product>> {
        let mut products = self.products.write().map_err(poisoned)?;
        Ok(products.remove(name))
    }
}

#[async_trait]
impl SalesStore for MemoryStore {
    async fn insert_sale(&self, sale: &Sale) -> AppResult<Sale> {
        let mut sales = self.sales.write().map_err(poisoned)?;
        sales.push(sale.clone());
        Ok(sale.clone())
    }

    async fn find_sale(&self, id: Uuid) -> AppResult<Option<Sale>> {
        let sales = self.sales.read().map_err(poisoned)?;
        Ok(sales.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sales(&self, newest_first: bool) -> AppResult<Vec<Sale>> {
        let sales = self.sales.read().map_err(poisoned)?;
        let mut all = sales.clone();
        if newest_first {
            all.reverse();
        }
        Ok(all)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    ) -> AppResult<Option<Sale>> {
        let mut sales = self.sales.write().map_err(poisoned)?;
        Ok(sales
            .iter_mut()
            .find(|s| s.id == id && s.status == from)
            .map(|sale| {
                sale.status = to;
                sale.clone()
            }))
    }

    async fn claim_purchase_key(&self, key: &str, policy: KeyPolicy) -> AppResult<KeyClaim> {
        let now = Utc::now();
        let mut keys = self.purchase_keys.write().map_err(poisoned)?;
        if let Some(entry) = keys.get(key) {
            match (&entry.receipt, entry.completed_at) {
                (Some(receipt), Some(completed_at))
                    if !older_than(completed_at, now, policy.retention) =>
                {
                    return Ok(KeyClaim::Completed(receipt.clone()));
                }
                (None, _) if !older_than(entry.claimed_at, now, policy.lease) => {
                    return Ok(KeyClaim::InFlight);
                }
                _ => {}
            }
        }
        keys.insert(key.to_string(), KeyEntry::claimed(now));
        Ok(KeyClaim::Claimed)
    }

    async fn complete_purchase_key(&self, key: &str, receipt: &PurchaseReceipt) -> AppResult<()> {
        let now = Utc::now();
        let mut keys = self.purchase_keys.write().map_err(poisoned)?;
        let entry = keys
            .entry(key.to_string())
            .or_insert_with(|| KeyEntry::claimed(now));
        if entry.receipt.is_none() {
            entry.receipt = Some(receipt.clone());
            entry.completed_at = Some(now);
        }
        Ok(())
    }

    async fn release_purchase_key(&self, key: &str) -> AppResult<()> {
        let mut keys = self.purchase_keys.write().map_err(poisoned)?;
        if matches!(keys.get(key), Some(entry) if entry.receipt.is_none()) {
            keys.remove(key);
        }
        Ok(())
    }

    async fn purge_purchase_keys(&self, retention: Duration) -> AppResult<u64> {
        let now = Utc::now();
        let mut keys = self.purchase_keys.write().map_err(poisoned)?;
        let before = keys.len();
        keys.retain(|_, entry| !older_than(entry.last_touched(), now, retention));
        Ok((before - keys.len()) as u64)
    }
}

#[async_trait]
impl StatisticsStore for MemoryStore {
    async fn load_statistics(&self) -> AppResult<Option<Statistics>> {
        let statistics = self.statistics.read().map_err(poisoned)?;
        Ok(statistics.clone())
    }

    async fn increment_statistics(&self, delta: &StatisticsDelta) -> AppResult<Statistics> {
        let now = Utc::now();
        let mut statistics = self.statistics.write().map_err(poisoned)?;
        let updated = match statistics.as_mut() {
            Some(current) => {
                current.apply(delta, now)?;
                current.clone()
            }
            None => {
                let seeded = Statistics::seeded(delta, now)?;
                *statistics = Some(seeded.clone());
                seeded
            }
        };
        Ok(updated)
    }

    async fn derive_totals(&self) -> AppResult<DerivedTotals> {
        let products = self.products.read().map_err(poisoned)?;
        let sales = self.sales.read().map_err(poisoned)?;
        Self::totals(&products, &sales)
    }

    async fn reconcile_statistics(&self) -> AppResult<Statistics> {
        let products = self.products.read().map_err(poisoned)?;
        let sales = self.sales.read().map_err(poisoned)?;
        let mut statistics = self.statistics.write().map_err(poisoned)?;

        let derived = Self::totals(&products, &sales)?;
        let now = Utc::now();
        let mut current = match statistics.take() {
            Some(current) => current,
            None => Statistics::seeded(&StatisticsDelta::default(), now)?,
        };
        current.reconcile(&derived, now);
        *statistics = Some(current.clone());
        Ok(current)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<Notification> {
        let mut notifications = self.notifications.write().map_err(poisoned)?;
        notifications.push(notification.clone());
        Ok(notification.clone())
    }

    async fn list_notifications(&self, actor_id: Option<Uuid>) -> AppResult<Vec<Notification>> {
        let notifications = self.notifications.read().map_err(poisoned)?;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| actor_id.map_or(true, |id| n.actor_id == id))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        actor_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<Notification>> {
        let mut notifications = self.notifications.write().map_err(poisoned)?;
        Ok(notifications
            .iter_mut()
            .find(|n| n.id == id && n.actor_id == actor_id)
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn clear_notifications(&self) -> AppResult<u64> {
        let mut notifications = self.notifications.write().map_err(poisoned)?;
        let cleared = notifications.len() as u64;
        notifications.clear();
        Ok(cleared)
    }
}
