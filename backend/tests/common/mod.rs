//! Shared fixtures for the backend integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{
    Actor, DerivedTotals, Notification, PurchaseInput, PurchaseReceipt, Sale, SaleStatus,
    Statistics, StatisticsDelta, StockInInput,
};
use shopfloor_backend::{
    error::{AppError, AppResult},
    store::{KeyClaim, KeyPolicy, MemoryStore, NotificationStore, SalesStore, StatisticsStore, Stores},
    AppState, Config,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret";

pub fn actor() -> Actor {
    Actor::new(Uuid::new_v4(), "Ada", "Stone", "admin")
}

pub fn stock_in_input(name: &str, category: &str, price: Decimal, stock: i64) -> StockInInput {
    StockInInput {
        name: name.to_string(),
        category: category.to_string(),
        price,
        stock,
    }
}

pub fn purchase_input(name: &str, quantity: i64) -> PurchaseInput {
    PurchaseInput {
        name: name.to_string(),
        quantity,
        idempotency_key: None,
    }
}

/// App state over a single in-memory store that tests can inspect directly
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_shared(store.clone());
        Self::with_stores(store, stores)
    }

    /// Same store, but with some collections swapped for failing ones
    pub fn with_stores(store: Arc<MemoryStore>, stores: Stores) -> Self {
        Self::with_config(store, stores, Config::in_memory(JWT_SECRET))
    }

    pub fn with_config(store: Arc<MemoryStore>, stores: Stores, config: Config) -> Self {
        let state = AppState::new(config, stores);
        Self { store, state }
    }

    /// Wait for queued statistics and notifications to land
    pub async fn settle(&self) {
        self.state.coordinator.effects().flush().await;
    }

    pub async fn statistics(&self) -> Statistics {
        self.store
            .load_statistics()
            .await
            .expect("statistics readable")
            .expect("statistics initialised")
    }

    pub async fn stock_of(&self, name: &str) -> Option<i64> {
        use shopfloor_backend::store::CatalogStore;
        self.store
            .find_product(name)
            .await
            .expect("catalog readable")
            .map(|p| p.stock)
    }
}

fn switched_off(what: &str) -> AppError {
    AppError::Persistence(format!("{} store unavailable", what))
}

/// Statistics collection that fails while `failing` is set
pub struct FlakyStatistics {
    pub inner: Arc<MemoryStore>,
    pub failing: AtomicBool,
}

impl FlakyStatistics {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(true),
        }
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(switched_off("statistics"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StatisticsStore for FlakyStatistics {
    async fn load_statistics(&self) -> AppResult<Option<Statistics>> {
        self.inner.load_statistics().await
    }

    async fn increment_statistics(&self, delta: &StatisticsDelta) -> AppResult<Statistics> {
        self.check()?;
        self.inner.increment_statistics(delta).await
    }

    async fn derive_totals(&self) -> AppResult<DerivedTotals> {
        self.inner.derive_totals().await
    }

    async fn reconcile_statistics(&self) -> AppResult<Statistics> {
        self.check()?;
        self.inner.reconcile_statistics().await
    }
}

/// Notification collection that rejects every write
pub struct BrokenNotifications;

#[async_trait]
impl NotificationStore for BrokenNotifications {
    async fn insert_notification(&self, _notification: &Notification) -> AppResult<Notification> {
        Err(switched_off("notification"))
    }

    async fn list_notifications(&self, _actor_id: Option<Uuid>) -> AppResult<Vec<Notification>> {
        Ok(Vec::new())
    }

    async fn mark_notification_read(
        &self,
        _actor_id: Uuid,
        _id: Uuid,
    ) -> AppResult<Option<Notification>> {
        Err(switched_off("notification"))
    }

    async fn clear_notifications(&self) -> AppResult<u64> {
        Err(switched_off("notification"))
    }
}

/// Sales collection whose inserts fail; everything else is delegated
pub struct RejectingSales {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl SalesStore for RejectingSales {
    async fn insert_sale(&self, _sale: &Sale) -> AppResult<Sale> {
        Err(switched_off("sales"))
    }

    async fn find_sale(&self, id: Uuid) -> AppResult<Option<Sale>> {
        self.inner.find_sale(id).await
    }

    async fn list_sales(&self, newest_first: bool) -> AppResult<Vec<Sale>> {
        self.inner.list_sales(newest_first).await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    ) -> AppResult<Option<Sale>> {
        self.inner.transition_status(id, from, to).await
    }

    async fn claim_purchase_key(&self, key: &str, policy: KeyPolicy) -> AppResult<KeyClaim> {
        self.inner.claim_purchase_key(key, policy).await
    }

    async fn complete_purchase_key(&self, key: &str, receipt: &PurchaseReceipt) -> AppResult<()> {
        self.inner.complete_purchase_key(key, receipt).await
    }

    async fn release_purchase_key(&self, key: &str) -> AppResult<()> {
        self.inner.release_purchase_key(key).await
    }

    async fn purge_purchase_keys(&self, retention: Duration) -> AppResult<u64> {
        self.inner.purge_purchase_keys(retention).await
    }
}

/// Sales collection whose inserts take `delay` before landing
pub struct SlowSales {
    pub inner: Arc<MemoryStore>,
    pub delay: Duration,
}

#[async_trait]
impl SalesStore for SlowSales {
    async fn insert_sale(&self, sale: &Sale) -> AppResult<Sale> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_sale(sale).await
    }

    async fn find_sale(&self, id: Uuid) -> AppResult<Option<Sale>> {
        self.inner.find_sale(id).await
    }

    async fn list_sales(&self, newest_first: bool) -> AppResult<Vec<Sale>> {
        self.inner.list_sales(newest_first).await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    ) -> AppResult<Option<Sale>> {
        self.inner.transition_status(id, from, to).await
    }

    async fn claim_purchase_key(&self, key: &str, policy: KeyPolicy) -> AppResult<KeyClaim> {
        self.inner.claim_purchase_key(key, policy).await
    }

    async fn complete_purchase_key(&self, key: &str, receipt: &PurchaseReceipt) -> AppResult<()> {
        self.inner.complete_purchase_key(key, receipt).await
    }

    async fn release_purchase_key(&self, key: &str) -> AppResult<()> {
        self.inner.release_purchase_key(key).await
    }

    async fn purge_purchase_keys(&self, retention: Duration) -> AppResult<u64> {
        self.inner.purge_purchase_keys(retention).await
    }
}

/// Statistics collection whose increments panic
pub struct PanickingStatistics {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl StatisticsStore for PanickingStatistics {
    async fn load_statistics(&self) -> AppResult<Option<Statistics>> {
        self.inner.load_statistics().await
    }

    async fn increment_statistics(&self, _delta: &StatisticsDelta) -> AppResult<Statistics> {
        panic!("statistics increment blew up")
    }

    async fn derive_totals(&self) -> AppResult<DerivedTotals> {
        self.inner.derive_totals().await
    }

    async fn reconcile_statistics(&self) -> AppResult<Statistics> {
        self.inner.reconcile_statistics().await
    }
}
