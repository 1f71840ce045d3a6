//! Inventory transaction coordinator
//!
//! Orchestrates the multi-record inventory operations. Each operation commits
//! its primary write (product stock, sale record) first, through a single
//! atomic store call, and only then enqueues the statistics delta and the
//! notification as best-effort side effects. There is no transaction across
//! records: a lost side effect leaves statistics drift that
//! `StatisticsService::recompute` repairs.

use shared::{
    Actor, EditProductInput, Product, PurchaseInput, PurchaseReceipt, Sale, SaleStatus,
    StatisticsDelta, StockInInput,
};
use uuid::Uuid;
use validator::Validate;

use super::{ProductCatalog, SalesLedger, SideEffectDispatcher};
use crate::error::{AppError, AppResult};
use crate::store::KeyClaim;

/// Sole writer of product stock, sales and statistics
#[derive(Clone)]
pub struct InventoryCoordinator {
    catalog: ProductCatalog,
    ledger: SalesLedger,
    effects: SideEffectDispatcher,
}

impl InventoryCoordinator {
    pub fn new(catalog: ProductCatalog, ledger: SalesLedger, effects: SideEffectDispatcher) -> Self {
        Self {
            catalog,
            ledger,
            effects,
        }
    }

    pub fn effects(&self) -> &SideEffectDispatcher {
        &self.effects
    }

    /// Add stock, creating the product for a new name
    pub async fn stock_in(&self, input: StockInInput, actor: &Actor) -> AppResult<(Product, bool)> {
        input.validate()?;

        let (product, created) = self
            .catalog
            .upsert_stock(
                &input.name,
                &input.category,
                input.price,
                input.stock,
                actor.id,
            )
            .await?;

        tracing::info!(
            product = %product.name,
            added = input.stock,
            stock = product.stock,
            created,
            "Stock in committed"
        );

        self.effects
            .statistics(StatisticsDelta::stock(input.stock))
            .await;
        let message = if created {
            format!("Product {} created with {} units", product.name, product.stock)
        } else {
            format!(
                "Stock for {} increased by {} (now {})",
                product.name, input.stock, product.stock
            )
        };
        self.effects.notify(actor, message).await;

        Ok((product, created))
    }

    /// Overwrite a product's name, category, price and stock
    pub async fn edit_product(
        &self,
        name: &str,
        input: EditProductInput,
        actor: &Actor,
    ) -> AppResult<Product> {
        input.validate()?;

        let edit = self
            .catalog
            .edit_product(
                name,
                &input.new_name,
                &input.category,
                input.price,
                input.stock,
            )
            .await?;

        tracing::info!(
            product = %name,
            new_name = %edit.current.name,
            stock_change = edit.stock_change(),
            "Product edit committed"
        );

        self.effects
            .statistics(StatisticsDelta::stock(edit.stock_change()))
            .await;
        let message = if edit.previous.name == edit.current.name {
            format!("Product {} updated", edit.current.name)
        } else {
            format!(
                "Product {} updated and renamed to {}",
                edit.previous.name, edit.current.name
            )
        };
        self.effects.notify(actor, message).await;

        Ok(edit.current)
    }

    /// Buy `quantity` units. With an idempotency key, a retried request gets
    /// the first receipt back instead of buying again.
    ///
    /// The purchase runs on its own task, so a caller that goes away mid-way
    /// does not leave stock decremented without a sale or a key unfinished.
    pub async fn purchase(&self, input: PurchaseInput, actor: &Actor) -> AppResult<PurchaseReceipt> {
        input.validate()?;

        let coordinator = self.clone();
        let actor = actor.clone();
        tokio::spawn(async move { coordinator.run_purchase(input, &actor).await })
            .await
            .map_err(|e| AppError::Internal(format!("Purchase task failed: {}", e)))?
    }

    async fn run_purchase(&self, input: PurchaseInput, actor: &Actor) -> AppResult<PurchaseReceipt> {
        let Some(client_key) = input.idempotency_key.as_deref() else {
            return self.execute_purchase(&input, actor).await;
        };

        // Keys are scoped per purchaser
        let key = format!("{}:{}", actor.id, client_key);
        match self.ledger.claim_purchase_key(&key).await? {
            KeyClaim::Claimed => {}
            KeyClaim::Completed(receipt) => {
                tracing::info!(key = %key, sale_id = %receipt.sale_id, "Purchase replayed");
                return Ok(receipt.into_replay());
            }
            KeyClaim::InFlight => {
                return Err(AppError::Conflict(
                    "A purchase with this idempotency key is still being processed".to_string(),
                ));
            }
        }

        let result = self.execute_purchase(&input, actor).await;
        match &result {
            Ok(receipt) => {
                if let Err(e) = self.ledger.complete_purchase_key(&key, receipt).await {
                    tracing::warn!(key = %key, "Failed to store purchase receipt: {}", e);
                }
            }
            Err(_) => {
                if let Err(e) = self.ledger.release_purchase_key(&key).await {
                    tracing::warn!(key = %key, "Failed to release purchase key: {}", e);
                }
            }
        }
        result
    }

    async fn execute_purchase(
        &self,
        input: &PurchaseInput,
        actor: &Actor,
    ) -> AppResult<PurchaseReceipt> {
        // Check and decrement happen in one conditional store operation
        let product = self
            .catalog
            .decrement_stock(&input.name, input.quantity)
            .await?;

        let sale = match self
            .ledger
            .record_sale(&product, input.quantity, SaleStatus::Approved, actor.id)
            .await
        {
            Ok(sale) => sale,
            Err(e) => {
                self.undo_decrement(&product.name, input.quantity).await;
                return Err(e);
            }
        };

        tracing::info!(
            product = %sale.product_name,
            quantity = sale.quantity,
            total = %sale.total_amount,
            remaining = product.stock,
            sale_id = %sale.id,
            "Purchase committed"
        );

        self.effects
            .statistics(StatisticsDelta::sale(sale.total_amount, sale.quantity))
            .await;
        self.effects
            .notify(
                actor,
                format!(
                    "Purchase successful: {} x {} for {}",
                    sale.quantity, sale.product_name, sale.total_amount
                ),
            )
            .await;

        Ok(PurchaseReceipt::new(&sale, product.stock))
    }

    /// Return units taken for a sale that could not be recorded
    async fn undo_decrement(&self, name: &str, quantity: i64) {
        match self.catalog.restore_stock(name, quantity).await {
            Ok(Some(product)) => tracing::warn!(
                product = %name,
                quantity,
                stock = product.stock,
                "Sale not recorded, stock restored"
            ),
            Ok(None) => {
                tracing::warn!(product = %name, quantity, "Sale not recorded and product deleted meanwhile");
                self.effects
                    .statistics(StatisticsDelta::stock(-quantity))
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    product = %name,
                    quantity,
                    "Sale not recorded and stock could not be restored: {}",
                    e
                );
                self.effects
                    .statistics(StatisticsDelta::stock(-quantity))
                    .await;
            }
        }
    }

    /// Remove a product and its units from the statistics
    pub async fn delete_product(&self, name: &str, actor: &Actor) -> AppResult<Product> {
        let deleted = self.catalog.delete_product(name).await?;

        tracing::info!(product = %deleted.name, stock = deleted.stock, "Product deletion committed");

        self.effects
            .statistics(StatisticsDelta::stock(-deleted.stock))
            .await;
        self.effects
            .notify(actor, format!("Product {} deleted", deleted.name))
            .await;

        Ok(deleted)
    }

    /// Move a sale through its lifecycle, keeping the sales totals in step
    pub async fn update_sale_status(
        &self,
        sale_id: Uuid,
        next: SaleStatus,
        actor: &Actor,
    ) -> AppResult<Sale> {
        let change = self.ledger.update_status(sale_id, next).await?;
        let sale = change.sale;

        tracing::info!(sale_id = %sale.id, from = %change.from, to = %sale.status, "Sale status committed");

        let direction = match (change.from.is_counted(), sale.status.is_counted()) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        };
        if direction != 0 {
            self.effects
                .statistics(StatisticsDelta::counted_sale(sale.total_amount, direction))
                .await;
        }
        self.effects
            .notify(
                actor,
                format!("Sale of {} marked {}", sale.product_name, sale.status),
            )
            .await;

        Ok(sale)
    }
}
