//! Stock invariants under concurrent and arbitrary operation sequences
//!
//! - Racing purchases never oversell
//! - Stock never goes negative
//! - Incremental statistics agree with a full recompute when no side effect
//!   is lost

mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::EditProductInput;
use shopfloor_backend::{
    error::AppError,
    store::{CatalogStore, SalesStore, StatisticsStore},
};

use common::{actor, purchase_input, stock_in_input, Harness};

// ============================================================================
// Racing purchases
// ============================================================================

async fn race(buyers: usize, stock: i64) -> (usize, usize, Harness) {
    let harness = Harness::new();
    let owner = actor();
    harness
        .state
        .coordinator
        .stock_in(stock_in_input("Widget", "Tools", Decimal::new(250, 2), stock), &owner)
        .await
        .unwrap();

    let handles: Vec<_> = (0..buyers)
        .map(|_| {
            let coordinator = harness.state.coordinator.clone();
            let buyer = actor();
            tokio::spawn(async move {
                coordinator
                    .purchase(purchase_input("Widget", 1), &buyer)
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut refusals = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::InsufficientStock { remaining, .. }) => {
                assert_eq!(remaining, 0);
                refusals += 1;
            }
            Err(other) => panic!("unexpected purchase failure: {other}"),
        }
    }
    harness.settle().await;
    (successes, refusals, harness)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_purchases_sell_exactly_the_available_stock() {
    let (successes, refusals, harness) = race(50, 12).await;

    assert_eq!(successes, 12);
    assert_eq!(refusals, 38);
    assert_eq!(harness.stock_of("Widget").await, Some(0));
    assert_eq!(harness.store.list_sales(false).await.unwrap().len(), 12);

    let stats = harness.statistics().await;
    assert_eq!(stats.items_in_stock, 0);
    assert_eq!(stats.total_transactions, 12);
    assert_eq!(stats.total_sales, Decimal::new(3000, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_unit_raced_by_many_buyers() {
    let (successes, refusals, harness) = race(16, 1).await;

    assert_eq!(successes, 1);
    assert_eq!(refusals, 15);
    assert_eq!(harness.stock_of("Widget").await, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stock_ins_are_all_counted() {
    let harness = Harness::new();

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let coordinator = harness.state.coordinator.clone();
            let user = actor();
            tokio::spawn(async move {
                coordinator
                    .stock_in(stock_in_input("Bolt", "Hardware", Decimal::ONE, 4), &user)
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let (_, was_created) = handle.await.unwrap().unwrap();
        if was_created {
            created += 1;
        }
    }
    harness.settle().await;

    assert_eq!(created, 1);
    assert_eq!(harness.stock_of("Bolt").await, Some(100));
    assert_eq!(harness.statistics().await.items_in_stock, 100);
}

// ============================================================================
// Arbitrary operation sequences
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    StockIn { product: usize, quantity: i64 },
    Purchase { product: usize, quantity: i64 },
    Edit { product: usize, stock: i64 },
    Delete { product: usize },
}

const NAMES: [&str; 3] = ["Widget", "Gizmo", "Sprocket"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NAMES.len(), 1i64..20).prop_map(|(product, quantity)| Op::StockIn { product, quantity }),
        4 => (0..NAMES.len(), 1i64..15).prop_map(|(product, quantity)| Op::Purchase { product, quantity }),
        1 => (0..NAMES.len(), 0i64..30).prop_map(|(product, stock)| Op::Edit { product, stock }),
        1 => (0..NAMES.len()).prop_map(|product| Op::Delete { product }),
    ]
}

async fn apply(harness: &Harness, op: &Op) {
    let coordinator = &harness.state.coordinator;
    let user = actor();
    let outcome = match op {
        Op::StockIn { product, quantity } => coordinator
            .stock_in(
                stock_in_input(NAMES[*product], "Parts", Decimal::new(199, 2), *quantity),
                &user,
            )
            .await
            .map(|_| ()),
        Op::Purchase { product, quantity } => coordinator
            .purchase(purchase_input(NAMES[*product], *quantity), &user)
            .await
            .map(|_| ()),
        Op::Edit { product, stock } => coordinator
            .edit_product(
                NAMES[*product],
                EditProductInput {
                    new_name: NAMES[*product].to_string(),
                    category: "Parts".to_string(),
                    price: Decimal::new(199, 2),
                    stock: *stock,
                },
                &user,
            )
            .await
            .map(|_| ()),
        Op::Delete { product } => coordinator
            .delete_product(NAMES[*product], &user)
            .await
            .map(|_| ()),
    };

    match outcome {
        Ok(()) | Err(AppError::NotFound(_)) | Err(AppError::InsufficientStock { .. }) => {}
        Err(other) => panic!("unexpected failure for {op:?}: {other}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Stock stays non-negative and incremental counters match the recompute
    #[test]
    fn prop_stock_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..40)) {
        tokio_test::block_on(async {
            let harness = Harness::new();
            for op in &ops {
                apply(&harness, op).await;
            }
            harness.settle().await;

            let products = harness.store.list_products().await.unwrap();
            prop_assert!(products.iter().all(|p| p.stock >= 0));

            let incremental = harness.store.load_statistics().await.unwrap();
            let recomputed = harness
                .state
                .statistics
                .recompute()
                .await
                .unwrap();

            let on_hand: i64 = products.iter().map(|p| p.stock).sum();
            prop_assert_eq!(recomputed.items_in_stock, on_hand);

            if let Some(incremental) = incremental {
                prop_assert_eq!(incremental.items_in_stock, recomputed.items_in_stock);
                prop_assert_eq!(incremental.total_sales, recomputed.total_sales);
                prop_assert_eq!(incremental.total_transactions, recomputed.total_transactions);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
