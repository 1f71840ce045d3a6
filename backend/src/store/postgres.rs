//! PostgreSQL store
//!
//! Every invariant-bearing write is a single conditional statement, so no
//! transaction or row lock is held across round trips.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    DerivedTotals, Notification, Product, PurchaseReceipt, Sale, SaleStatus, Statistics,
    StatisticsDelta,
};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{
    CatalogStore, KeyClaim, KeyPolicy, NewStock, NotificationStore, ProductUpdate, SalesStore,
    StatisticsStore, StockDecrement,
};
use crate::error::{AppError, AppResult};

/// PostgreSQL implementation of every store trait
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, category, price, stock, owner_id, created_at";
const SALE_COLUMNS: &str =
    "id, product_name, category, unit_price, quantity, total_amount, status, purchaser_id, sale_date";
const STATISTICS_COLUMNS: &str = "total_sales, total_transactions, items_in_stock, pending_leaves, \
     number_of_accounts, number_of_employees, outdated_stocks, total_payments, last_updated";
const NOTIFICATION_COLUMNS: &str = "id, actor_id, actor_name, role, message, is_read, created_at";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    category: String,
    price: Decimal,
    stock: i64,
    owner_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            category: row.category,
            price: row.price,
            stock: row.stock,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    product: ProductRow,
    created: bool,
}

#[derive(Debug, FromRow)]
struct EditRow {
    #[sqlx(flatten)]
    current: ProductRow,
    previous_name: String,
    previous_category: String,
    previous_price: Decimal,
    previous_stock: i64,
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    product_name: String,
    category: String,
    unit_price: Decimal,
    quantity: i64,
    total_amount: Decimal,
    status: String,
    purchaser_id: Uuid,
    sale_date: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = AppError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SaleStatus>()
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        Ok(Self {
            id: row.id,
            product_name: row.product_name,
            category: row.category,
            unit_price: row.unit_price,
            quantity: row.quantity,
            total_amount: row.total_amount,
            status,
            purchaser_id: row.purchaser_id,
            sale_date: row.sale_date,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatisticsRow {
    total_sales: Decimal,
    total_transactions: i64,
    items_in_stock: i64,
    pending_leaves: i64,
    number_of_accounts: i64,
    number_of_employees: i64,
    outdated_stocks: i64,
    total_payments: Decimal,
    last_updated: DateTime<Utc>,
}

impl From<StatisticsRow> for Statistics {
    fn from(row: StatisticsRow) -> Self {
        Self {
            total_sales: row.total_sales,
            total_transactions: row.total_transactions,
            items_in_stock: row.items_in_stock,
            pending_leaves: row.pending_leaves,
            number_of_accounts: row.number_of_accounts,
            number_of_employees: row.number_of_employees,
            outdated_stocks: row.outdated_stocks,
            total_payments: row.total_payments,
            last_updated: row.last_updated,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    actor_id: Uuid,
    actor_name: String,
    role: String,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            actor_id: row.actor_id,
            actor_name: row.actor_name,
            role: row.role,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

/// Escape LIKE wildcards so the query matches as a plain substring
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn unique_violation_as_conflict(err: sqlx::Error, message: String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message),
        _ => AppError::DatabaseError(err),
    }
}

/// SQLSTATE numeric_value_out_of_range
const NUMERIC_OUT_OF_RANGE: &str = "22003";

fn is_out_of_range(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE))
}

fn stock_out_of_range(err: sqlx::Error) -> AppError {
    if is_out_of_range(&err) {
        AppError::Validation {
            field: "stock".to_string(),
            message: "Stock is out of range".to_string(),
        }
    } else {
        AppError::DatabaseError(err)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn find_product(&self, name: &str) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name"
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn search_products(&self, query: &str) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE name ILIKE $1 OR category ILIKE $1 \
             ORDER BY name"
        ))
        .bind(like_pattern(query))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn upsert_stock(&self, stock: NewStock) -> AppResult<(Product, bool)> {
        // xmax is zero only for a freshly inserted row version
        let row = sqlx::query_as::<_, UpsertRow>(&format!(
            r#"
            INSERT INTO products (id, name, category, price, stock, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET stock = products.stock + EXCLUDED.stock
            RETURNING {PRODUCT_COLUMNS}, (xmax = 0) AS created
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&stock.name)
        .bind(&stock.category)
        .bind(stock.price)
        .bind(stock.quantity)
        .bind(stock.owner_id)
        .fetch_one(&self.db)
        .await
        .map_err(stock_out_of_range)?;

        Ok((row.product.into(), row.created))
    }

    async fn restore_stock(&self, name: &str, quantity: i64) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET stock = stock + $2 WHERE name = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(name)
        .bind(quantity)
        .fetch_optional(&self.db)
        .await
        .map_err(stock_out_of_range)?;

        Ok(row.map(Product::from))
    }

    async fn replace_product(
        &self,
        name: &str,
        update: ProductUpdate,
    ) -> AppResult<Option<(Product, Product)>> {
        let row = sqlx::query_as::<_, EditRow>(
            r#"
            WITH previous AS (
                SELECT id, name, category, price, stock
                FROM products
                WHERE name = $1
                FOR UPDATE
            )
            UPDATE products p
            SET name = $2, category = $3, price = $4, stock = $5
            FROM previous
            WHERE p.id = previous.id
            RETURNING p.id, p.name, p.category, p.price, p.stock, p.owner_id, p.created_at,
                      previous.name AS previous_name,
                      previous.category AS previous_category,
                      previous.price AS previous_price,
                      previous.stock AS previous_stock
            "#,
        )
        .bind(name)
        .bind(&update.name)
        .bind(&update.category)
        .bind(update.price)
        .bind(update.stock)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| {
            unique_violation_as_conflict(
                e,
                format!("A product named {} already exists", update.name),
            )
        })?;

        Ok(row.map(|row| {
            let current = Product::from(row.current);
            let previous = Product {
                name: row.previous_name,
                category: row.previous_category,
                price: row.previous_price,
                stock: row.previous_stock,
                ..current.clone()
            };
            (previous, current)
        }))
    }

    async fn decrement_stock(&self, name: &str, quantity: i64) -> AppResult<StockDecrement> {
        let updated = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET stock = stock - $2
            WHERE name = $1 AND stock >= $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(quantity)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = updated {
            return Ok(StockDecrement::Applied(row.into()));
        }

        let remaining =
            sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.db)
                .await?;

        Ok(match remaining {
            Some(remaining) => StockDecrement::Insufficient { remaining },
            None => StockDecrement::Missing,
        })
    }

    async fn delete_product(&self, name: &str) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "DELETE FROM products WHERE name = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Product::from))
    }
}

#[async_trait]
impl SalesStore for PgStore {
    async fn insert_sale(&self, sale: &Sale) -> AppResult<Sale> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            r#"
            INSERT INTO sales (
                id, product_name, category, unit_price, quantity,
                total_amount, status, purchaser_id, sale_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {SALE_COLUMNS}
            "#
        ))
        .bind(sale.id)
        .bind(&sale.product_name)
        .bind(&sale.category)
        .bind(sale.unit_price)
        .bind(sale.quantity)
        .bind(sale.total_amount)
        .bind(sale.status.as_str())
        .bind(sale.purchaser_id)
        .bind(sale.sale_date)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    async fn find_sale(&self, id: Uuid) -> AppResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Sale::try_from).transpose()
    }

    async fn list_sales(&self, newest_first: bool) -> AppResult<Vec<Sale>> {
        let order = if newest_first { "DESC" } else { "ASC" };
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales ORDER BY sale_date {order}, id"
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Sale::try_from).collect()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    ) -> AppResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "UPDATE sales SET status = $3 WHERE id = $1 AND status = $2 RETURNING {SALE_COLUMNS}"
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.map(Sale::try_from).transpose()
    }

    async fn claim_purchase_key(&self, key: &str, policy: KeyPolicy) -> AppResult<KeyClaim> {
        // Expired claims and receipts are taken over in the same statement
        let claimed = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO purchase_keys (key, claimed_at) VALUES ($1, NOW())
            ON CONFLICT (key) DO UPDATE
            SET claimed_at = NOW(), receipt = NULL, completed_at = NULL
            WHERE (purchase_keys.receipt IS NULL
                   AND purchase_keys.claimed_at <= NOW() - make_interval(secs => $2))
               OR (purchase_keys.receipt IS NOT NULL
                   AND purchase_keys.completed_at <= NOW() - make_interval(secs => $3))
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(policy.lease.as_secs_f64())
        .bind(policy.retention.as_secs_f64())
        .fetch_optional(&self.db)
        .await?;

        if claimed.is_some() {
            return Ok(KeyClaim::Claimed);
        }

        let existing = sqlx::query_scalar::<_, Option<Json<PurchaseReceipt>>>(
            "SELECT receipt FROM purchase_keys WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        // A key released between the two statements reads as in flight; the
        // client simply retries.
        Ok(match existing {
            Some(Some(Json(receipt))) => KeyClaim::Completed(receipt),
            _ => KeyClaim::InFlight,
        })
    }

    async fn complete_purchase_key(&self, key: &str, receipt: &PurchaseReceipt) -> AppResult<()> {
        sqlx::query(
            "UPDATE purchase_keys SET receipt = $2, completed_at = NOW() \
             WHERE key = $1 AND receipt IS NULL",
        )
        .bind(key)
        .bind(Json(receipt))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn release_purchase_key(&self, key: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM purchase_keys WHERE key = $1 AND receipt IS NULL")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn purge_purchase_keys(&self, retention: Duration) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM purchase_keys \
             WHERE COALESCE(completed_at, claimed_at) <= NOW() - make_interval(secs => $1)",
        )
        .bind(retention.as_secs_f64())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StatisticsStore for PgStore {
    async fn load_statistics(&self) -> AppResult<Option<Statistics>> {
        let row = sqlx::query_as::<_, StatisticsRow>(&format!(
            "SELECT {STATISTICS_COLUMNS} FROM statistics WHERE id = 1"
        ))
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Statistics::from))
    }

    async fn increment_statistics(&self, delta: &StatisticsDelta) -> AppResult<Statistics> {
        let row = sqlx::query_as::<_, StatisticsRow>(&format!(
            r#"
            INSERT INTO statistics (
                id, total_sales, total_transactions, items_in_stock, pending_leaves,
                number_of_accounts, number_of_employees, outdated_stocks, total_payments,
                last_updated
            )
            VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (id) DO UPDATE SET
                total_sales = statistics.total_sales + EXCLUDED.total_sales,
                total_transactions = statistics.total_transactions + EXCLUDED.total_transactions,
                items_in_stock = statistics.items_in_stock + EXCLUDED.items_in_stock,
                pending_leaves = statistics.pending_leaves + EXCLUDED.pending_leaves,
                number_of_accounts = statistics.number_of_accounts + EXCLUDED.number_of_accounts,
                number_of_employees = statistics.number_of_employees + EXCLUDED.number_of_employees,
                outdated_stocks = statistics.outdated_stocks + EXCLUDED.outdated_stocks,
                total_payments = statistics.total_payments + EXCLUDED.total_payments,
                last_updated = EXCLUDED.last_updated
            RETURNING {STATISTICS_COLUMNS}
            "#
        ))
        .bind(delta.total_sales)
        .bind(delta.total_transactions)
        .bind(delta.items_in_stock)
        .bind(delta.pending_leaves)
        .bind(delta.number_of_accounts)
        .bind(delta.number_of_employees)
        .bind(delta.outdated_stocks)
        .bind(delta.total_payments)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_out_of_range(&e) {
                AppError::Internal("statistics counter is out of range".to_string())
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        Ok(row.into())
    }

    async fn derive_totals(&self) -> AppResult<DerivedTotals> {
        let (total_sales, total_transactions, items_in_stock) =
            sqlx::query_as::<_, (Decimal, i64, i64)>(
                r#"
                SELECT
                    COALESCE((SELECT SUM(total_amount) FROM sales WHERE status = 'approved'), 0),
                    (SELECT COUNT(*) FROM sales WHERE status = 'approved'),
                    COALESCE((SELECT SUM(stock) FROM products), 0)::BIGINT
                "#,
            )
            .fetch_one(&self.db)
            .await?;

        Ok(DerivedTotals {
            total_sales,
            total_transactions,
            items_in_stock,
        })
    }

    async fn reconcile_statistics(&self) -> AppResult<Statistics> {
        // One statement, so the sums come from a single snapshot
        let row = sqlx::query_as::<_, StatisticsRow>(&format!(
            r#"
            INSERT INTO statistics (id, total_sales, total_transactions, items_in_stock, last_updated)
            SELECT
                1,
                COALESCE((SELECT SUM(total_amount) FROM sales WHERE status = 'approved'), 0),
                (SELECT COUNT(*) FROM sales WHERE status = 'approved'),
                COALESCE((SELECT SUM(stock) FROM products), 0)::BIGINT,
                NOW()
            ON CONFLICT (id) DO UPDATE SET
                total_sales = EXCLUDED.total_sales,
                total_transactions = EXCLUDED.total_transactions,
                items_in_stock = EXCLUDED.items_in_stock,
                last_updated = EXCLUDED.last_updated
            RETURNING {STATISTICS_COLUMNS}
            "#
        ))
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            INSERT INTO notifications (id, actor_id, actor_name, role, message, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification.id)
        .bind(notification.actor_id)
        .bind(&notification.actor_name)
        .bind(&notification.role)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn list_notifications(&self, actor_id: Option<Uuid>) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE $1::UUID IS NULL OR actor_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(actor_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_notification_read(
        &self,
        actor_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE
            WHERE id = $1 AND actor_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(actor_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Notification::from))
    }

    async fn clear_notifications(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notifications")
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
