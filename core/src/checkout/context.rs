// core/src/checkout/context.rs

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::inventory::StockRequest;
use crate::models::{NewOrderLine, Order};
use crate::payment::PaymentGateway;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
  /// Upper bound on a single gateway call (authorize or void).
  pub gateway_timeout: Duration,
  /// How long an idempotency key keeps answering with its original order.
  pub idempotency_window: Duration,
  /// Replay window for checkouts that arrive without a key. Short, so a
  /// double submit is caught but a later repeat purchase goes through.
  pub fingerprint_window: Duration,
  pub currency: String,
}

impl Default for CheckoutSettings {
  fn default() -> Self {
    Self {
      gateway_timeout: Duration::from_secs(5),
      idempotency_window: Duration::from_secs(24 * 60 * 60),
      fingerprint_window: Duration::from_secs(10 * 60),
      currency: "USD".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub product_id: Uuid,
  pub quantity: i32,
}

/// A buyer's request to turn a cart into an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
  pub buyer_id: Uuid,
  pub cart_lines: Vec<CartLine>,
  pub payment_nonce: String,
  #[serde(default)]
  pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutState {
  CartValidating,
  PaymentPending,
  PaymentDeclined,
  PaymentApproved,
  InventoryCommitting,
  InventoryFailed,
  OrderPersisted,
}

#[derive(Debug, Clone)]
pub struct ApprovedPayment {
  pub transaction_id: String,
  pub record: serde_json::Value,
}

/// Per-request state shared by the checkout steps.
pub struct CheckoutCtxData<S: Store> {
  pub store: S,
  pub gateway: Arc<dyn PaymentGateway>,
  pub settings: CheckoutSettings,
  pub request: CheckoutRequest,

  // Filled in as the steps run.
  pub stock_requests: Vec<StockRequest>,
  pub idempotency_key: String,
  /// False when the key was derived from the cart fingerprint.
  pub client_key: bool,
  pub cart_fingerprint: Uuid,
  pub lines: Vec<NewOrderLine>,
  pub total: Decimal,
  pub payment: Option<ApprovedPayment>,
  pub order: Option<Order>,
  /// The order came from an earlier attempt with the same key.
  pub replayed: bool,
  pub states: Vec<CheckoutState>,
}

impl<S: Store> CheckoutCtxData<S> {
  pub fn new(store: S, gateway: Arc<dyn PaymentGateway>, settings: CheckoutSettings, request: CheckoutRequest) -> Self {
    Self {
      store,
      gateway,
      settings,
      request,
      stock_requests: Vec::new(),
      idempotency_key: String::new(),
      client_key: false,
      cart_fingerprint: Uuid::nil(),
      lines: Vec::new(),
      total: Decimal::ZERO,
      payment: None,
      order: None,
      replayed: false,
      states: Vec::new(),
    }
  }

  /// How far back an earlier order with the same key is replayed.
  pub fn replay_window(&self) -> Duration {
    if self.client_key {
      self.settings.idempotency_window
    } else {
      self.settings.fingerprint_window
    }
  }

  pub fn enter(&mut self, state: CheckoutState) {
    debug!(buyer_id = %self.request.buyer_id, ?state, "Checkout state change.");
    self.states.push(state);
  }
}
