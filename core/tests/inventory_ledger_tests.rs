// tests/inventory_ledger_tests.rs
mod common;
use common::*;
use serial_test::serial;
use storefront::{LedgerError, ReserveOutcome, StockRequest};
use uuid::Uuid;

fn req(id: Uuid, quantity: i32) -> StockRequest {
  StockRequest::new(id, quantity).unwrap()
}

#[tokio::test]
#[serial]
async fn test_reserve_decrements_quantity_and_grows_sold() {
  let shop = Shop::new();
  let cat = shop.category("Tools").await;
  let hammer = shop.product("Hammer", "steel", price(1500), 10, &cat).await;
  let saw = shop.product("Saw", "steel", price(2500), 4, &cat).await;

  let outcome = shop
    .ledger
    .reserve_and_decrement(&[req(hammer.id, 2), req(saw.id, 1), req(hammer.id, 1)])
    .await
    .unwrap();
  assert!(outcome.is_reserved());

  let hammer = shop.reload(&hammer).await;
  let saw = shop.reload(&saw).await;
  assert_eq!((hammer.quantity, hammer.sold), (7, 3));
  assert_eq!((saw.quantity, saw.sold), (3, 1));
}

#[tokio::test]
#[serial]
async fn test_one_short_line_rejects_the_whole_batch() {
  let shop = Shop::new();
  let cat = shop.category("Tools").await;
  let plenty = shop.product("Nails", "box", price(300), 100, &cat).await;
  let scarce = shop.product("Drill", "cordless", price(9900), 1, &cat).await;

  let outcome = shop
    .ledger
    .reserve_and_decrement(&[req(plenty.id, 5), req(scarce.id, 2)])
    .await
    .unwrap();
  assert_eq!(
    outcome,
    ReserveOutcome::InsufficientStock {
      product_id: scarce.id,
      requested: 2,
      available: 1,
    }
  );

  // Nothing was written for the line that fit either.
  let plenty = shop.reload(&plenty).await;
  assert_eq!((plenty.quantity, plenty.sold), (100, 0));
}

#[tokio::test]
#[serial]
async fn test_unknown_product_is_reported_not_raised() {
  let shop = Shop::new();
  let ghost = Uuid::new_v4();
  let outcome = shop.ledger.reserve_and_decrement(&[req(ghost, 1)]).await.unwrap();
  assert_eq!(outcome, ReserveOutcome::ProductNotFound { product_id: ghost });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_reservations_never_oversell() {
  let shop = Shop::new();
  let cat = shop.category("Limited").await;
  let item = shop.product("Sneaker", "drop", price(12000), 5, &cat).await;

  let mut handles = Vec::new();
  for _ in 0..20 {
    let ledger = shop.ledger.clone();
    let id = item.id;
    handles.push(tokio::spawn(async move {
      ledger.reserve_and_decrement(&[StockRequest::new(id, 1).unwrap()]).await.unwrap()
    }));
  }
  let mut reserved = 0;
  for handle in handles {
    if handle.await.unwrap().is_reserved() {
      reserved += 1;
    }
  }

  assert_eq!(reserved, 5);
  let item = shop.reload(&item).await;
  assert_eq!((item.quantity, item.sold), (0, 5));
}

#[tokio::test]
#[serial]
async fn test_admin_stock_edits_refuse_negative_results() {
  let shop = Shop::new();
  let cat = shop.category("Tools").await;
  let item = shop.product("Wrench", "chrome", price(1800), 3, &cat).await;

  let level = shop.ledger.restock(item.id, 7).await.unwrap();
  assert_eq!(level.quantity, 10);
  let level = shop.ledger.set_stock(item.id, 2).await.unwrap();
  assert_eq!((level.quantity, level.sold), (2, 0));

  assert!(matches!(
    shop.ledger.restock(item.id, -3).await,
    Err(LedgerError::NegativeStock { current: 2, delta: -3, .. })
  ));
  assert!(matches!(
    shop.ledger.set_stock(item.id, -1).await,
    Err(LedgerError::NegativeStock { .. })
  ));
  assert!(matches!(
    shop.ledger.set_stock(Uuid::new_v4(), 1).await,
    Err(LedgerError::ProductNotFound(_))
  ));
  assert_eq!(shop.reload(&item).await.quantity, 2);
}
