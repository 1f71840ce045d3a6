//! PostgreSQL store tests
//!
//! The same operations as the in-memory suites, run against the SQL store.
//! Each test gets a fresh database with the migrations applied. They need a
//! reachable server:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/shopfloor cargo test -p shopfloor-backend -- --ignored
//! ```

mod common;

use std::time::Duration;

use rust_decimal::Decimal;
use shared::{EditProductInput, PurchaseReceipt, SaleStatus, StatisticsDelta};
use shopfloor_backend::{
    error::AppError,
    store::{CatalogStore, KeyClaim, KeyPolicy, PgStore, SalesStore, StatisticsStore, Stores},
    AppState, Config,
};
use sqlx::PgPool;
use uuid::Uuid;

use common::{actor, purchase_input, stock_in_input, JWT_SECRET};

fn price(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn state(pool: PgPool) -> AppState {
    AppState::new(Config::in_memory(JWT_SECRET), Stores::postgres(pool))
}

async fn stock_of(state: &AppState, name: &str) -> Option<i64> {
    state
        .catalog
        .find_by_name(name)
        .await
        .unwrap()
        .map(|p| p.stock)
}

// ============================================================================
// Scenarios
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn stock_in_then_purchase(pool: PgPool) {
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    let (product, created) = coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 10), &user)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(product.stock, 10);

    let receipt = coordinator
        .purchase(purchase_input("Widget", 3), &user)
        .await
        .unwrap();
    coordinator.effects().flush().await;

    assert_eq!(receipt.remaining_stock, 7);
    assert_eq!(receipt.total_amount, price(2997));
    let sales = state.ledger.list_all(true).await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].status, SaleStatus::Approved);
    assert_eq!(sales[0].unit_price, price(999));

    let stats = state.statistics.snapshot().await.unwrap();
    assert_eq!(stats.items_in_stock, 7);
    assert_eq!(stats.total_sales, price(2997));
    assert_eq!(stats.total_transactions, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upsert_keeps_price_and_reports_creation(pool: PgPool) {
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 10), &user)
        .await
        .unwrap();
    let (product, created) = coordinator
        .stock_in(stock_in_input("Widget", "Other", price(100), 5), &user)
        .await
        .unwrap();

    assert!(!created);
    assert_eq!(product.stock, 15);
    assert_eq!(product.price, price(999));
    assert_eq!(product.category, "Tools");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn purchase_beyond_stock_reports_remaining(pool: PgPool) {
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 2), &user)
        .await
        .unwrap();
    let err = coordinator
        .purchase(purchase_input("Widget", 5), &user)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientStock { remaining: 2, .. }));
    assert_eq!(stock_of(&state, "Widget").await, Some(2));
    assert!(matches!(
        coordinator.purchase(purchase_input("Gadget", 1), &user).await,
        Err(AppError::NotFound(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn edit_and_delete_move_items_in_stock(pool: PgPool) {
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 10), &user)
        .await
        .unwrap();
    coordinator
        .stock_in(stock_in_input("Gadget", "Tools", price(500), 1), &user)
        .await
        .unwrap();

    let edited = coordinator
        .edit_product(
            "Widget",
            EditProductInput {
                new_name: "Widget Pro".to_string(),
                category: "Tools".to_string(),
                price: price(1299),
                stock: 4,
            },
            &user,
        )
        .await
        .unwrap();
    assert_eq!(edited.name, "Widget Pro");

    let clash = coordinator
        .edit_product(
            "Gadget",
            EditProductInput {
                new_name: "Widget Pro".to_string(),
                category: "Tools".to_string(),
                price: price(500),
                stock: 1,
            },
            &user,
        )
        .await
        .unwrap_err();
    assert!(matches!(clash, AppError::Conflict(_)));

    coordinator.delete_product("Gadget", &user).await.unwrap();
    coordinator.effects().flush().await;

    assert_eq!(stock_of(&state, "Widget").await, None);
    assert_eq!(stock_of(&state, "Widget Pro").await, Some(4));
    assert_eq!(state.statistics.snapshot().await.unwrap().items_in_stock, 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn refund_reverses_totals(pool: PgPool) {
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 10), &user)
        .await
        .unwrap();
    let receipt = coordinator
        .purchase(purchase_input("Widget", 2), &user)
        .await
        .unwrap();
    coordinator
        .update_sale_status(receipt.sale_id, SaleStatus::Refunded, &user)
        .await
        .unwrap();
    let err = coordinator
        .update_sale_status(receipt.sale_id, SaleStatus::Approved, &user)
        .await
        .unwrap_err();
    coordinator.effects().flush().await;

    assert!(matches!(err, AppError::InvalidTransition { .. }));
    let stats = state.statistics.snapshot().await.unwrap();
    assert_eq!(stats.total_sales, Decimal::ZERO);
    assert_eq!(stats.total_transactions, 0);
    assert_eq!(stats.items_in_stock, 8);
}

// ============================================================================
// Concurrency
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn racing_buyers_never_oversell(pool: PgPool) {
    let state = state(pool);
    let owner = actor();
    state
        .coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(250), 12), &owner)
        .await
        .unwrap();

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let coordinator = state.coordinator.clone();
            let buyer = actor();
            tokio::spawn(async move {
                coordinator
                    .purchase(purchase_input("Widget", 1), &buyer)
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected purchase failure: {other}"),
        }
    }
    state.coordinator.effects().flush().await;

    assert_eq!(successes, 12);
    assert_eq!(stock_of(&state, "Widget").await, Some(0));
    assert_eq!(state.ledger.list_all(false).await.unwrap().len(), 12);
    let stats = state.statistics.snapshot().await.unwrap();
    assert_eq!(stats.items_in_stock, 0);
    assert_eq!(stats.total_transactions, 12);
}

// ============================================================================
// Statistics
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn recompute_is_idempotent_and_repairs_drift(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 10), &user)
        .await
        .unwrap();
    coordinator
        .purchase(purchase_input("Widget", 3), &user)
        .await
        .unwrap();
    coordinator.effects().flush().await;

    store
        .increment_statistics(&StatisticsDelta {
            items_in_stock: 42,
            pending_leaves: 3,
            ..StatisticsDelta::default()
        })
        .await
        .unwrap();

    let first = state.statistics.recompute().await.unwrap();
    let second = state.statistics.recompute().await.unwrap();

    assert_eq!(first.items_in_stock, 7);
    assert_eq!(first.total_sales, price(2997));
    assert_eq!(first.total_transactions, 1);
    assert_eq!(first.pending_leaves, 3);
    assert_eq!(second.items_in_stock, first.items_in_stock);
    assert_eq!(second.total_sales, first.total_sales);
    assert_eq!(store.derive_totals().await.unwrap().items_in_stock, 7);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn stock_overflow_is_a_validation_error(pool: PgPool) {
    let store = PgStore::new(pool);
    store
        .upsert_stock(shopfloor_backend::store::NewStock {
            name: "Widget".to_string(),
            category: "Tools".to_string(),
            price: price(100),
            quantity: i64::MAX,
            owner_id: None,
        })
        .await
        .unwrap();

    let err = store.restore_stock("Widget", 1).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { ref field, .. } if field == "stock"));
}

// ============================================================================
// Purchase keys
// ============================================================================

fn receipt() -> PurchaseReceipt {
    PurchaseReceipt {
        sale_id: Uuid::new_v4(),
        product_name: "Widget".to_string(),
        quantity_bought: 1,
        total_amount: price(100),
        remaining_stock: 0,
        replayed: false,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn purchase_key_lease_and_retention(pool: PgPool) {
    let store = PgStore::new(pool);
    let policy = KeyPolicy {
        lease: Duration::from_millis(200),
        retention: Duration::from_millis(400),
    };

    assert_eq!(store.claim_purchase_key("k", policy).await.unwrap(), KeyClaim::Claimed);
    assert_eq!(store.claim_purchase_key("k", policy).await.unwrap(), KeyClaim::InFlight);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.claim_purchase_key("k", policy).await.unwrap(), KeyClaim::Claimed);

    let receipt = receipt();
    store.complete_purchase_key("k", &receipt).await.unwrap();
    assert_eq!(
        store.claim_purchase_key("k", policy).await.unwrap(),
        KeyClaim::Completed(receipt)
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.purge_purchase_keys(policy.retention).await.unwrap(), 1);
    assert_eq!(store.claim_purchase_key("k", policy).await.unwrap(), KeyClaim::Claimed);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn idempotent_purchase_replays_once(pool: PgPool) {
    let state = state(pool);
    let user = actor();
    let coordinator = &state.coordinator;

    coordinator
        .stock_in(stock_in_input("Widget", "Tools", price(999), 10), &user)
        .await
        .unwrap();

    let mut input = purchase_input("Widget", 2);
    input.idempotency_key = Some("order-7".to_string());
    let first = coordinator.purchase(input.clone(), &user).await.unwrap();
    let second = coordinator.purchase(input, &user).await.unwrap();

    assert!(second.replayed);
    assert_eq!(second.sale_id, first.sale_id);
    assert_eq!(stock_of(&state, "Widget").await, Some(8));
    assert_eq!(state.ledger.list_all(true).await.unwrap().len(), 1);
}
