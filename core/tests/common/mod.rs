// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every fixture

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use storefront::models::{Buyer, Category, NewBuyer, Product, Role};
use storefront::{
  Authorization, CartLine, CatalogService, CatalogSettings, CheckoutRequest, CheckoutSettings, GatewayError,
  InventoryLedger, MemoryStore, MockPaymentGateway, NewProductInput, OrderService, OrderWorkflow, PaymentGateway,
  Store, VoidReceipt,
};
use tracing::Level;
use uuid::Uuid;

// --- Tracing ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fixture ---

/// A whole storefront over a fresh in-memory store.
pub struct Shop {
  pub store: MemoryStore,
  pub catalog: CatalogService<MemoryStore>,
  pub ledger: InventoryLedger<MemoryStore>,
  pub orders: OrderService<MemoryStore>,
  pub gateway: Arc<MockPaymentGateway>,
  pub workflow: OrderWorkflow<MemoryStore>,
}

impl Shop {
  pub fn new() -> Self {
    Self::with_settings(CheckoutSettings::default())
  }

  pub fn with_settings(settings: CheckoutSettings) -> Self {
    setup_tracing();
    let store = MemoryStore::new();
    let gateway = Arc::new(MockPaymentGateway::default());
    let workflow = OrderWorkflow::new(store.clone(), gateway.clone(), settings).unwrap();
    Self {
      catalog: CatalogService::new(store.clone(), CatalogSettings::default()),
      ledger: InventoryLedger::new(store.clone()),
      orders: OrderService::new(store.clone()),
      gateway,
      workflow,
      store,
    }
  }

  /// A second workflow over the same store, talking to another gateway.
  pub fn workflow_with(&self, gateway: Arc<dyn PaymentGateway>, settings: CheckoutSettings) -> OrderWorkflow<MemoryStore> {
    OrderWorkflow::new(self.store.clone(), gateway, settings).unwrap()
  }

  pub async fn category(&self, name: &str) -> Category {
    self.catalog.create_category(name).await.unwrap()
  }

  pub async fn product(&self, name: &str, description: &str, price: Decimal, quantity: i32, category: &Category) -> Product {
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

  pub async fn buyer(&self, email: &str) -> Buyer {
    self
      .store
      .insert_buyer(&NewBuyer {
        name: "Test Buyer".to_string(),
        email: email.to_string(),
        address: Some("1 Main St".to_string()),
        role: Role::Customer,
      })
      .await
      .unwrap()
  }

  pub async fn reload(&self, product: &Product) -> Product {
    self.store.find_product(product.id).await.unwrap().unwrap()
  }
}

pub fn price(cents: i64) -> Decimal {
  Decimal::new(cents, 2)
}

pub fn checkout_request(buyer: &Buyer, lines: &[(&Product, i32)], key: Option<&str>) -> CheckoutRequest {
  CheckoutRequest {
    buyer_id: buyer.id,
    cart_lines: lines
      .iter()
      .map(|(p, quantity)| CartLine {
        product_id: p.id,
        quantity: *quantity,
      })
      .collect(),
    payment_nonce: "fake-valid-nonce".to_string(),
    idempotency_key: key.map(str::to_string),
  }
}

// --- Gateways with scripted misbehaviour ---

/// Approves like the mock, but drains a product's stock while "talking to the
/// processor", so the decrement that follows must fail.
pub struct StockStealingGateway {
  pub inner: MockPaymentGateway,
  pub ledger: InventoryLedger<MemoryStore>,
  pub victim: Uuid,
}

#[async_trait]
impl PaymentGateway for StockStealingGateway {
  async fn authorize(&self, nonce: &str, amount: Decimal) -> Result<Authorization, GatewayError> {
    let answer = self.inner.authorize(nonce, amount).await?;
    self.ledger.set_stock(self.victim, 0).await.unwrap();
    Ok(answer)
  }

  async fn void(&self, transaction_id: &str) -> Result<VoidReceipt, GatewayError> {
    self.inner.void(transaction_id).await
  }
}

/// Never answers within any reasonable timeout.
pub struct HangingGateway {
  pub delay: Duration,
}

#[async_trait]
impl PaymentGateway for HangingGateway {
  async fn authorize(&self, _nonce: &str, _amount: Decimal) -> Result<Authorization, GatewayError> {
    tokio::time::sleep(self.delay).await;
    Err(GatewayError::Unavailable("too late".to_string()))
  }

  async fn void(&self, _transaction_id: &str) -> Result<VoidReceipt, GatewayError> {
    Err(GatewayError::Unavailable("nothing to void".to_string()))
  }
}
