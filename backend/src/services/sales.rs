//! Sales ledger service

use std::sync::Arc;
use std::time::Duration;

use shared::{Product, PurchaseReceipt, Sale, SaleStatus};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{KeyClaim, KeyPolicy, SalesStore};

/// Owns sale records and purchase keys. Sales are immutable apart from
/// status changes.
#[derive(Clone)]
pub struct SalesLedger {
    store: Arc<dyn SalesStore>,
    keys: KeyPolicy,
}

/// A committed status change
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: SaleStatus,
    pub sale: Sale,
}

impl SalesLedger {
    /// Create a new SalesLedger instance
    pub fn new(store: Arc<dyn SalesStore>) -> Self {
        Self {
            store,
            keys: KeyPolicy::default(),
        }
    }

    pub fn with_key_policy(mut self, keys: KeyPolicy) -> Self {
        self.keys = keys;
        self
    }

    /// Record a sale priced from `snapshot`
    pub async fn record_sale(
        &self,
        snapshot: &Product,
        quantity: i64,
        status: SaleStatus,
        purchaser_id: Uuid,
    ) -> AppResult<Sale> {
        if quantity < 1 {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be at least 1".to_string(),
            });
        }

        let sale = Sale::from_snapshot(snapshot, quantity, status, purchaser_id)?;
        self.store.insert_sale(&sale).await
    }

    /// Apply a status transition as a compare-and-set on the current status
    pub async fn update_status(&self, sale_id: Uuid, next: SaleStatus) -> AppResult<StatusChange> {
        let current = self
            .store
            .find_sale(sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sale {}", sale_id)))?;

        if !current.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        match self
            .store
            .transition_status(sale_id, current.status, next)
            .await?
        {
            Some(sale) => Ok(StatusChange {
                from: current.status,
                sale,
            }),
            // Someone else moved the sale first
            None => Err(AppError::Conflict(format!(
                "Sale {} changed status concurrently, reload and retry",
                sale_id
            ))),
        }
    }

    pub async fn list_all(&self, newest_first: bool) -> AppResult<Vec<Sale>> {
        self.store.list_sales(newest_first).await
    }

    pub async fn claim_purchase_key(&self, key: &str) -> AppResult<KeyClaim> {
        self.store.claim_purchase_key(key, self.keys).await
    }

    pub async fn complete_purchase_key(&self, key: &str, receipt: &PurchaseReceipt) -> AppResult<()> {
        self.store.complete_purchase_key(key, receipt).await
    }

    pub async fn release_purchase_key(&self, key: &str) -> AppResult<()> {
        self.store.release_purchase_key(key).await
    }

    /// Forget keys past their retention
    pub async fn purge_expired_keys(&self) -> AppResult<u64> {
        self.store.purge_purchase_keys(self.keys.retention).await
    }
}

/// Periodically drop expired purchase keys
pub fn spawn_key_purger(ledger: SalesLedger, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match ledger.purge_expired_keys().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Expired purchase keys purged"),
                Err(e) => tracing::warn!("Purchase key purge failed: {}", e),
            }
        }
    })
}
