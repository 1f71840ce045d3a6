//! Product catalog service

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::{Product, ProductEdit};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{CatalogStore, NewStock, ProductUpdate, StockDecrement};

/// Owns product records. Stock changes made here are reached through the
/// inventory coordinator so statistics follow every change.
#[derive(Clone)]
pub struct ProductCatalog {
    store: Arc<dyn CatalogStore>,
}

impl ProductCatalog {
    /// Create a new ProductCatalog instance
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Whether the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }

    /// Exact, case-sensitive lookup
    pub async fn find_by_name(&self, name: &str) -> AppResult<Option<Product>> {
        self.store.find_product(name).await
    }

    /// Every product, by name
    pub async fn list_all(&self) -> AppResult<Vec<Product>> {
        let products = self.store.list_products().await?;
        if products.is_empty() {
            return Err(AppError::NotFound("Products".to_string()));
        }
        Ok(products)
    }

    /// Case-insensitive substring search over name and category
    pub async fn search(&self, query: &str) -> AppResult<Vec<Product>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                field: "query".to_string(),
                message: "Search query is required".to_string(),
            });
        }

        let products = self.store.search_products(query).await?;
        if products.is_empty() {
            return Err(AppError::NotFound(format!(
                "Products matching \"{}\"",
                query
            )));
        }
        Ok(products)
    }

    /// Add `quantity` units under `name`, creating the product on first
    /// stock-in. Price and category only apply to a new product.
    pub async fn upsert_stock(
        &self,
        name: &str,
        category: &str,
        price: Decimal,
        quantity: i64,
        owner_id: Uuid,
    ) -> AppResult<(Product, bool)> {
        debug_assert!(quantity > 0, "stock-in quantity must be positive");
        self.store
            .upsert_stock(NewStock {
                name: name.to_string(),
                category: category.to_string(),
                price,
                quantity,
                owner_id: Some(owner_id),
            })
            .await
    }

    /// Overwrite every mutable field of an existing product
    pub async fn edit_product(
        &self,
        name: &str,
        new_name: &str,
        category: &str,
        price: Decimal,
        stock: i64,
    ) -> AppResult<ProductEdit> {
        let update = ProductUpdate {
            name: new_name.to_string(),
            category: category.to_string(),
            price,
            stock,
        };

        self.store
            .replace_product(name, update)
            .await?
            .map(|(previous, current)| ProductEdit { previous, current })
            .ok_or_else(|| AppError::NotFound(format!("Product {}", name)))
    }

    /// Atomically take `quantity` units, failing without change when fewer
    /// remain
    pub async fn decrement_stock(&self, name: &str, quantity: i64) -> AppResult<Product> {
        match self.store.decrement_stock(name, quantity).await? {
            StockDecrement::Applied(product) => Ok(product),
            StockDecrement::Insufficient { remaining } => Err(AppError::InsufficientStock {
                product: name.to_string(),
                remaining,
            }),
            StockDecrement::Missing => Err(AppError::NotFound(format!("Product {}", name))),
        }
    }

    /// Put units back after a failed sale. `None` if the product is gone.
    pub async fn restore_stock(&self, name: &str, quantity: i64) -> AppResult<Option<Product>> {
        self.store.restore_stock(name, quantity).await
    }

    /// Remove a product, returning its final snapshot
    pub async fn delete_product(&self, name: &str) -> AppResult<Product> {
        self.store
            .delete_product(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", name)))
    }
}
