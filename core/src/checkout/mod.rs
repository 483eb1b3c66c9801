// core/src/checkout/mod.rs

//! Order Workflow: cart → priced order → authorized payment → committed order.
//!
//! Each checkout runs the same pipeline over a fresh [`CheckoutCtxData`]:
//!
//! 1. `validate_cart`    : shape checks, line merging, buyer lookup.
//! 2. `replay_duplicate` : an earlier order for the same key and cart is returned as-is.
//! 3. `price_cart`       : current catalog prices, computed server-side only.
//! 4. `authorize_payment`: gateway hold, bounded by a timeout.
//! 5. `commit_order`     : stock decrement and order insert in one transaction;
//!                         the authorization is voided if this fails.

pub mod context;
pub mod steps;

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{CheckoutError, PipelineError, StoreError};
use crate::models::Order;
use crate::payment::PaymentGateway;
use crate::pipeline::{ContextData, Pipeline};
use crate::store::Store;

pub use context::{ApprovedPayment, CartLine, CheckoutCtxData, CheckoutRequest, CheckoutSettings, CheckoutState};
pub use steps::{cart_fingerprint, MAX_ORDER_TOTAL};

pub const CHECKOUT_STEPS: &[&str] = &[
  "validate_cart",
  "replay_duplicate",
  "price_cart",
  "authorize_payment",
  "commit_order",
];

/// The full record of one checkout attempt.
#[derive(Debug)]
pub struct CheckoutOutcome {
  pub result: Result<Order, CheckoutError>,
  /// State transitions in the order they happened.
  pub states: Vec<CheckoutState>,
  /// `true` when the order was created by an earlier attempt.
  pub replayed: bool,
}

pub struct OrderWorkflow<S: Store> {
  store: S,
  gateway: Arc<dyn PaymentGateway>,
  settings: CheckoutSettings,
  pipeline: Arc<Pipeline<CheckoutCtxData<S>, CheckoutError>>,
}

impl<S: Store> Clone for OrderWorkflow<S> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      gateway: Arc::clone(&self.gateway),
      settings: self.settings.clone(),
      pipeline: Arc::clone(&self.pipeline),
    }
  }
}

impl<S: Store> OrderWorkflow<S> {
  pub fn new(store: S, gateway: Arc<dyn PaymentGateway>, settings: CheckoutSettings) -> Result<Self, PipelineError> {
    Ok(Self {
      store,
      gateway,
      settings,
      pipeline: Arc::new(build_pipeline()?),
    })
  }

  pub fn settings(&self) -> &CheckoutSettings {
    &self.settings
  }

  /// Places an order or explains why not. Retrying with the same idempotency
  /// key (or the same cart, when no key is given) within the window returns the
  /// original order without charging again.
  pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order, CheckoutError> {
    self.checkout_traced(request).await.result
  }

  #[instrument(
    name = "checkout",
    skip(self, request),
    fields(buyer_id = %request.buyer_id, lines = request.cart_lines.len())
  )]
  pub async fn checkout_traced(&self, request: CheckoutRequest) -> CheckoutOutcome {
    let ctx = ContextData::new(CheckoutCtxData::new(
      self.store.clone(),
      Arc::clone(&self.gateway),
      self.settings.clone(),
      request,
    ));

    let run = self.pipeline.run(ctx.clone()).await;

    let mut guard = ctx.write();
    let states = std::mem::take(&mut guard.states);
    let replayed = guard.replayed;
    let result = run.and_then(|_| {
      guard.order.take().ok_or_else(|| {
        CheckoutError::Store(StoreError::Corrupt("checkout finished without an order".to_string()))
      })
    });
    match &result {
      Ok(order) => info!(order_id = %order.id, replayed, "Checkout finished."),
      Err(e) => info!(error = %e, business = e.is_business_outcome(), "Checkout ended without a new order."),
    }
    CheckoutOutcome {
      result,
      states,
      replayed,
    }
  }
}

fn build_pipeline<S: Store>() -> Result<Pipeline<CheckoutCtxData<S>, CheckoutError>, PipelineError> {
  let mut p = Pipeline::new(CHECKOUT_STEPS);
  p.on("validate_cart", steps::validate_cart::<S>)?;
  p.on("replay_duplicate", steps::replay_duplicate::<S>)?;
  p.on("price_cart", steps::price_cart::<S>)?;
  p.on("authorize_payment", steps::authorize_payment::<S>)?;
  p.on("commit_order", steps::commit_order::<S>)?;
  Ok(p)
}
