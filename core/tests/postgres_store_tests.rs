// tests/postgres_store_tests.rs
//! Store behaviour against a live PostgreSQL. Every test returns early unless
//! `DATABASE_URL` points at a database the migrations can run on.
mod common;
use common::*;
use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serial_test::serial;
use storefront::models::{Buyer, Category, NewBuyer, Product, Role};
use storefront::{
  CatalogError, CatalogService, CatalogSettings, CheckoutError, CheckoutSettings, InventoryLedger,
  MockPaymentGateway, NewProductInput, OrderService, OrderWorkflow, PageRequest, PgStore, ProductFilter, Store,
};
use uuid::Uuid;

struct PgShop {
  store: PgStore,
  catalog: CatalogService<PgStore>,
  ledger: InventoryLedger<PgStore>,
  orders: OrderService<PgStore>,
  gateway: Arc<MockPaymentGateway>,
  workflow: OrderWorkflow<PgStore>,
  /// Keeps names unique across runs on the same database.
  tag: String,
}

impl PgShop {
  async fn connect() -> Option<Self> {
    setup_tracing();
    let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty())?;
    let store = PgStore::connect(&url, 20).await.expect("connect to DATABASE_URL");
    store.migrate().await.expect("run migrations");
    let gateway = Arc::new(MockPaymentGateway::default());
    let workflow = OrderWorkflow::new(store.clone(), gateway.clone(), CheckoutSettings::default()).unwrap();
    let mut tag = Uuid::new_v4().simple().to_string();
    tag.truncate(8);
    Some(Self {
      catalog: CatalogService::new(store.clone(), CatalogSettings::default()),
      ledger: InventoryLedger::new(store.clone()),
      orders: OrderService::new(store.clone()),
      gateway,
      workflow,
      store,
      tag,
    })
  }

  async fn category(&self, name: &str) -> Category {
    self
      .catalog
      .create_category(&format!("{} {}", name, self.tag))
      .await
      .unwrap()
  }

  async fn product(&self, name: &str, description: &str, price: Decimal, quantity: i32, category: &Category) -> Product {
    self
      .catalog
      .create_product(NewProductInput {
        name: name.to_string(),
        description: description.to_string(),
        price,
        quantity,
        category_id: category.id,
        shipping: true,
        photo_path: None,
      })
      .await
      .unwrap()
  }

  async fn buyer(&self, local: &str) -> Buyer {
    self
      .store
      .insert_buyer(&NewBuyer {
        name: "Pg Buyer".to_string(),
        email: format!("{}-{}@example.com", local, self.tag),
        address: None,
        role: Role::Customer,
      })
      .await
      .unwrap()
  }

  async fn reload(&self, product: &Product) -> Product {
    self.store.find_product(product.id).await.unwrap().unwrap()
  }
}

macro_rules! pg_shop {
  () => {
    match PgShop::connect().await {
      Some(shop) => shop,
      None => {
        eprintln!("DATABASE_URL not set; skipping");
        return;
      }
    }
  };
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_checkouts_never_oversell() {
  let shop = pg_shop!();
  let cat = shop.category("Drops").await;
  let stock = 5;
  let attempts = 12;
  let item = shop.product("Pg Limited Print", "signed", price(4000), stock, &cat).await;
  let buyer = shop.buyer("oversell").await;

  let mut handles = Vec::new();
  for i in 0..attempts {
    let workflow = shop.workflow.clone();
    let request = checkout_request(&buyer, &[(&item, 1)], Some(&format!("pg-attempt-{}", i)));
    handles.push(tokio::spawn(async move { workflow.checkout(request).await }));
  }

  let mut placed = 0;
  let mut short = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => placed += 1,
      Err(CheckoutError::InsufficientStock { available: 0, .. }) => short += 1,
      Err(other) => panic!("unexpected checkout error: {:?}", other),
    }
  }

  assert_eq!(placed, stock);
  assert_eq!(short, attempts - stock);
  let item = shop.reload(&item).await;
  assert_eq!((item.quantity, item.sold), (0, stock));
  assert_eq!(shop.gateway.voided().len() as i32, attempts - stock);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_overlapping_carts_do_not_deadlock() {
  let shop = pg_shop!();
  let cat = shop.category("Pairs").await;
  let left = shop.product("Pg Left Glove", "wool", price(900), 40, &cat).await;
  let right = shop.product("Pg Right Glove", "wool", price(900), 40, &cat).await;
  let buyer = shop.buyer("overlap").await;

  let mut handles = Vec::new();
  for i in 0..20 {
    let workflow = shop.workflow.clone();
    // Opposite line orders; row locks are still taken in id order.
    let lines: [(&Product, i32); 2] = if i % 2 == 0 {
      [(&left, 1), (&right, 1)]
    } else {
      [(&right, 1), (&left, 1)]
    };
    let request = checkout_request(&buyer, &lines, Some(&format!("pg-pair-{}", i)));
    handles.push(tokio::spawn(async move { workflow.checkout(request).await }));
  }
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  assert_eq!(shop.reload(&left).await.quantity, 20);
  assert_eq!(shop.reload(&right).await.quantity, 20);
}

#[tokio::test]
#[serial]
async fn test_pg_keyword_wildcards_are_literal_and_ranked() {
  let shop = pg_shop!();
  let cat = shop.category("Sale").await;
  let prefix = shop.product("50% Off Mug", "stoneware", price(500), 1, &cat).await;
  let contains = shop.product("Big 50% Bowl", "ceramic", price(700), 1, &cat).await;
  let described = shop.product("Plate", "save 50% today", price(300), 1, &cat).await;
  shop.product("500 Thread Sheets", "cotton", price(9000), 1, &cat).await;
  shop.product("5000 Piece Puzzle", "cardboard", price(2500), 1, &cat).await;

  let filter = ProductFilter {
    categories: vec![cat.id],
    keyword: Some("50%".to_string()),
    ..ProductFilter::default()
  };
  let page = shop
    .catalog
    .search(filter.clone(), PageRequest::new(1, 10))
    .await
    .unwrap();
  let ids: Vec<_> = page.products.iter().map(|p| p.id).collect();
  assert_eq!(ids, vec![prefix.id, contains.id, described.id]);
  assert_eq!(page.total, 3);

  // The count and the page come from the same snapshot.
  let first = shop.catalog.search(filter, PageRequest::new(1, 2)).await.unwrap();
  assert_eq!(first.total, 3);
  assert_eq!(first.products.len(), 2);
  assert_eq!(first.products[0].category_name, cat.name);

  let underscore = ProductFilter {
    categories: vec![cat.id],
    keyword: Some("5_0".to_string()),
    ..ProductFilter::default()
  };
  let none = shop.catalog.search(underscore, PageRequest::default()).await.unwrap();
  assert_eq!(none.total, 0);
}

#[tokio::test]
#[serial]
async fn test_pg_retry_replays_the_order_with_its_lines() {
  let shop = pg_shop!();
  let cat = shop.category("Books").await;
  let novel = shop.product("Pg Novel", "paperback", price(1999), 10, &cat).await;
  let atlas = shop.product("Pg Atlas", "hardback", price(4500), 10, &cat).await;
  let buyer = shop.buyer("replay").await;

  let request = checkout_request(&buyer, &[(&novel, 2), (&atlas, 1)], Some("pg-replay-1"));
  let first = shop.workflow.checkout_traced(request.clone()).await;
  let first_order = first.result.unwrap();
  assert!(!first.replayed);

  let again = shop.workflow.checkout_traced(request).await;
  let replayed = again.result.unwrap();
  assert!(again.replayed);
  assert_eq!(replayed.id, first_order.id);
  assert_eq!(replayed.lines.len(), 2);
  assert_eq!(replayed.total, price(1999) * Decimal::from(2) + price(4500));

  let stored = shop.orders.find_order(first_order.id).await.unwrap();
  let names: HashSet<_> = stored.lines.iter().map(|l| l.product_name.clone()).collect();
  assert_eq!(names, HashSet::from(["Pg Novel".to_string(), "Pg Atlas".to_string()]));
  assert_eq!(shop.orders.orders_for_buyer(buyer.id).await.unwrap().len(), 1);
  assert_eq!(shop.reload(&novel).await.quantity, 8);
  assert_eq!(shop.gateway.authorization_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_same_key_places_one_order() {
  let shop = pg_shop!();
  let cat = shop.category("Mugs").await;
  let mug = shop.product("Pg Race Mug", "stoneware", price(1000), 10, &cat).await;
  let buyer = shop.buyer("samekey").await;

  let mut handles = Vec::new();
  for _ in 0..6 {
    let workflow = shop.workflow.clone();
    let request = checkout_request(&buyer, &[(&mug, 2)], Some("pg-double-click"));
    handles.push(tokio::spawn(async move { workflow.checkout(request).await }));
  }
  let mut ids = HashSet::new();
  for handle in handles {
    ids.insert(handle.await.unwrap().unwrap().id);
  }

  assert_eq!(ids.len(), 1);
  assert_eq!(shop.reload(&mug).await.quantity, 8);
  assert_eq!(shop.orders.orders_for_buyer(buyer.id).await.unwrap().len(), 1);
  // Attempts that authorized but lost the key lock were voided.
  assert_eq!(shop.gateway.authorization_count() - shop.gateway.voided().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_pg_catalog_edits_respect_constraints() {
  let shop = pg_shop!();
  let cat = shop.category("Lamps").await;
  let taken = shop.category("Taken").await;
  let lamp = shop.product("Pg Lamp", "brass", price(2500), 3, &cat).await;
  let spare = shop.product("Pg Spare Bulb", "warm", price(300), 3, &cat).await;
  let buyer = shop.buyer("edits").await;
  shop
    .workflow
    .checkout(checkout_request(&buyer, &[(&lamp, 1)], Some("pg-lamp")))
    .await
    .unwrap();

  assert!(matches!(
    shop.catalog.delete_product(lamp.id).await,
    Err(CatalogError::ProductOrdered { .. })
  ));
  shop.catalog.delete_product(spare.id).await.unwrap();
  assert!(shop.store.find_product(spare.id).await.unwrap().is_none());

  assert!(matches!(
    shop.catalog.rename_category(cat.id, &taken.name).await,
    Err(CatalogError::Conflict(_))
  ));

  let edited = shop
    .catalog
    .update_product(
      lamp.id,
      storefront::ProductUpdate {
        price: Some(price(2900)),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert_eq!(edited.price, price(2900));
  assert_eq!((edited.quantity, edited.sold), (2, 1));
  let level = shop.ledger.restock(lamp.id, 1).await.unwrap();
  assert_eq!(level.quantity, 3);
}
