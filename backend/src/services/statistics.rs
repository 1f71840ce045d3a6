//! Dashboard statistics aggregate service
//!
//! The only mutation paths are an atomic delta and a full recompute. Deltas
//! may drift from the truth when a best-effort update is lost; `recompute`
//! is the authoritative repair.

use std::sync::Arc;
use std::time::Duration;

use shared::{Statistics, StatisticsDelta};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};
use crate::store::StatisticsStore;

#[derive(Clone)]
pub struct StatisticsService {
    store: Arc<dyn StatisticsStore>,
}

impl StatisticsService {
    /// Create a new StatisticsService instance
    pub fn new(store: Arc<dyn StatisticsStore>) -> Self {
        Self { store }
    }

    /// Atomically add `delta` to the singleton, creating it if absent
    pub async fn apply_delta(&self, delta: &StatisticsDelta) -> AppResult<Statistics> {
        self.store.increment_statistics(delta).await
    }

    /// Overwrite the derived counters from the product and sale collections
    pub async fn recompute(&self) -> AppResult<Statistics> {
        let before = self.store.load_statistics().await?;
        let derived = self.store.derive_totals().await?;
        if let Some(drift) = before.as_ref().and_then(|s| s.drift_from(&derived)) {
            tracing::info!(
                items_in_stock = drift.items_in_stock,
                total_transactions = drift.total_transactions,
                total_sales = %drift.total_sales,
                "Statistics drift detected, reconciling"
            );
        }

        self.store.reconcile_statistics().await
    }

    /// Current counters as stored, without recomputation
    pub async fn snapshot(&self) -> AppResult<Statistics> {
        self.store
            .load_statistics()
            .await?
            .ok_or_else(|| AppError::NotFound("Statistics".to_string()))
    }
}

/// Run `recompute` every `interval` until the task is aborted
pub fn spawn_reconciler(service: StatisticsService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.recompute().await {
                Ok(stats) => tracing::debug!(
                    items_in_stock = stats.items_in_stock,
                    total_transactions = stats.total_transactions,
                    "Statistics reconciled"
                ),
                Err(e) => tracing::warn!("Scheduled statistics recompute failed: {}", e),
            }
        }
    })
}
