//! Storage layer
//!
//! Each trait method is a single atomic operation against its collection.
//! Invariants that span a read and a write (no oversell, no lost counter
//! updates, legal sale status changes) are enforced inside one method call,
//! never by the caller reading and then writing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{
    DerivedTotals, Notification, Product, PurchaseReceipt, Sale, SaleStatus, Statistics,
    StatisticsDelta,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Stock to add under a product name
#[derive(Debug, Clone)]
pub struct NewStock {
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub quantity: i64,
    pub owner_id: Option<Uuid>,
}

/// Replacement values for an existing product
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub name: String,
    pub category: String,
    pub price: Decimal,
    pub stock: i64,
}

/// Outcome of the conditional stock decrement
#[derive(Debug, Clone, PartialEq)]
pub enum StockDecrement {
    /// Stock was reduced; carries the product after the change
    Applied(Product),
    /// Not enough units; nothing changed
    Insufficient { remaining: i64 },
    Missing,
}

/// Outcome of claiming a purchase idempotency key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyClaim {
    /// The caller now owns the key and must complete or release it
    Claimed,
    /// A purchase already finished under this key
    Completed(PurchaseReceipt),
    /// Another request holds the key and has not finished
    InFlight,
}

/// How long purchase keys stay meaningful
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPolicy {
    /// An unfinished claim older than this may be taken over by a retry
    pub lease: Duration,
    /// A finished key answers replays for this long, then is forgotten
    pub retention: Duration,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(30),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Round trip to the backing store
    async fn ping(&self) -> AppResult<()>;

    async fn find_product(&self, name: &str) -> AppResult<Option<Product>>;

    async fn list_products(&self) -> AppResult<Vec<Product>>;

    /// Case-insensitive substring match on name or category
    async fn search_products(&self, query: &str) -> AppResult<Vec<Product>>;

    /// Add stock to an existing product or create it. Price and category of an
    /// existing product are left untouched. Returns the product and whether it
    /// was created.
    async fn upsert_stock(&self, stock: NewStock) -> AppResult<(Product, bool)>;

    /// Add units back to an existing product. Returns `None` when the product
    /// no longer exists.
    async fn restore_stock(&self, name: &str, quantity: i64) -> AppResult<Option<Product>>;

    /// Overwrite an existing product. Returns `(previous, current)`, or `None`
    /// when `name` does not exist. Fails with `Conflict` if the new name
    /// belongs to another product.
    async fn replace_product(
        &self,
        name: &str,
        update: ProductUpdate,
    ) -> AppResult<Option<(Product, Product)>>;

    /// Reduce stock by `quantity` only if at least `quantity` units remain
    async fn decrement_stock(&self, name: &str, quantity: i64) -> AppResult<StockDecrement>;

    async fn delete_product(&self, name: &str) -> AppResult<Option<Product>>;
}

#[async_trait]
pub trait SalesStore: Send + Sync {
    async fn insert_sale(&self, sale: &Sale) -> AppResult<Sale>;

    async fn find_sale(&self, id: Uuid) -> AppResult<Option<Sale>>;

    async fn list_sales(&self, newest_first: bool) -> AppResult<Vec<Sale>>;

    /// Move a sale from `from` to `to`. Returns `None` when the sale is no
    /// longer in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    ) -> AppResult<Option<Sale>>;

    /// Claim `key`, taking over claims whose lease ran out and receipts
    /// past retention
    async fn claim_purchase_key(&self, key: &str, policy: KeyPolicy) -> AppResult<KeyClaim>;

    /// Store the receipt unless one is already stored
    async fn complete_purchase_key(&self, key: &str, receipt: &PurchaseReceipt) -> AppResult<()>;

    /// Drop an unfinished claim
    async fn release_purchase_key(&self, key: &str) -> AppResult<()>;

    /// Delete keys untouched for longer than `retention`. Returns how many
    /// were removed.
    async fn purge_purchase_keys(&self, retention: Duration) -> AppResult<u64>;
}

#[async_trait]
pub trait StatisticsStore: Send + Sync {
    async fn load_statistics(&self) -> AppResult<Option<Statistics>>;

    /// Atomically add `delta`, creating the singleton if absent
    async fn increment_statistics(&self, delta: &StatisticsDelta) -> AppResult<Statistics>;

    /// Totals recomputed from the product and approved-sale collections
    async fn derive_totals(&self) -> AppResult<DerivedTotals>;

    /// Recompute the derived counters and overwrite them in one step
    async fn reconcile_statistics(&self) -> AppResult<Statistics>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<Notification>;

    /// Newest first; every actor when `actor_id` is `None`
    async fn list_notifications(&self, actor_id: Option<Uuid>) -> AppResult<Vec<Notification>>;

    /// Returns `None` unless the notification exists and belongs to `actor_id`
    async fn mark_notification_read(
        &self,
        actor_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<Notification>>;

    async fn clear_notifications(&self) -> AppResult<u64>;
}

/// The collections the services work against
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub sales: Arc<dyn SalesStore>,
    pub statistics: Arc<dyn StatisticsStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// Every collection on one PostgreSQL pool
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_shared(Arc::new(PgStore::new(pool)))
    }

    /// Every collection in process memory
    pub fn memory() -> Self {
        Self::from_shared(Arc::new(MemoryStore::new()))
    }

    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: CatalogStore + SalesStore + StatisticsStore + NotificationStore + 'static,
    {
        Self {
            catalog: store.clone(),
            sales: store.clone(),
            statistics: store.clone(),
            notifications: store,
        }
    }
}
