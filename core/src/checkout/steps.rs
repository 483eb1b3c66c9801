// core/src/checkout/steps.rs

//! Handlers for the checkout pipeline, one per step.
//!
//! Context guards are never held across an `.await`: each handler copies what
//! it needs out of the context, does the async work, then writes results back.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::{ApprovedPayment, CheckoutCtxData, CheckoutState};
use crate::error::{CheckoutError, GatewayError, StoreError};
use crate::inventory::{merge_requests, reserve_and_decrement_in, ReserveOutcome, StockRequest};
use crate::models::{IncidentKind, NewOrder, NewOrderLine, NewPaymentIncident, Order};
use crate::payment::{Authorization, PaymentGateway};
use crate::pipeline::{ContextData, PipelineControl};
use crate::store::{Store, StoreTx};

type Ctx<S> = ContextData<CheckoutCtxData<S>>;
type StepResult = Result<PipelineControl, CheckoutError>;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Largest total an order row can store.
pub const MAX_ORDER_TOTAL: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Namespace for cart fingerprints.
const CART_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93b7_4d0a_8c55_1e2f_7a90_b3d1);

/// UUIDv5 over the merged, id-sorted `(product_id, quantity)` lines.
pub fn cart_fingerprint(requests: &[StockRequest]) -> Uuid {
  let mut merged: BTreeMap<Uuid, i64> = BTreeMap::new();
  for r in requests {
    *merged.entry(r.product_id()).or_insert(0) += i64::from(r.quantity());
  }
  let mut name = String::with_capacity(merged.len() * 40);
  for (product_id, quantity) in merged {
    name.push_str(&format!("{}:{};", product_id, quantity));
  }
  Uuid::new_v5(&CART_NAMESPACE, name.as_bytes())
}

fn window_start(window: Duration) -> DateTime<Utc> {
  let now = Utc::now();
  chrono::Duration::from_std(window)
    .ok()
    .and_then(|w| now.checked_sub_signed(w))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub async fn validate_cart<S: Store>(ctx: Ctx<S>) -> StepResult {
  let (store, buyer_id) = {
    let mut guard = ctx.write();
    guard.enter(CheckoutState::CartValidating);
    let request = &guard.request;

    if request.cart_lines.is_empty() {
      return Err(CheckoutError::InvalidCart("Cart is empty".to_string()));
    }
    let mut requests = Vec::with_capacity(request.cart_lines.len());
    for line in &request.cart_lines {
      let stock_request = StockRequest::new(line.product_id, line.quantity).ok_or_else(|| {
        CheckoutError::InvalidCart(format!(
          "Quantity for product {} must be positive, got {}",
          line.product_id, line.quantity
        ))
      })?;
      requests.push(stock_request);
    }
    if request.payment_nonce.trim().is_empty() {
      return Err(CheckoutError::InvalidCart("Payment nonce is required".to_string()));
    }
    let key = request.idempotency_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
    if key.is_some_and(|k| k.len() > MAX_IDEMPOTENCY_KEY_LEN) {
      return Err(CheckoutError::InvalidCart(format!(
        "Idempotency key must be at most {} bytes",
        MAX_IDEMPOTENCY_KEY_LEN
      )));
    }
    let key = key.map(str::to_string);
    let buyer_id = request.buyer_id;

    guard.stock_requests = merge_requests(&requests).map_err(|overflow| {
      CheckoutError::InvalidCart(format!(
        "Total quantity for product {} is too large",
        overflow.product_id
      ))
    })?;
    guard.cart_fingerprint = cart_fingerprint(&guard.stock_requests);
    guard.client_key = key.is_some();
    guard.idempotency_key = key.unwrap_or_else(|| guard.cart_fingerprint.to_string());
    (guard.store.clone(), buyer_id)
  };

  if store.find_buyer(buyer_id).await?.is_none() {
    return Err(CheckoutError::BuyerNotFound(buyer_id));
  }
  Ok(PipelineControl::Continue)
}

pub async fn replay_duplicate<S: Store>(ctx: Ctx<S>) -> StepResult {
  let (store, buyer_id, key, fingerprint, window) = {
    let guard = ctx.read();
    (
      guard.store.clone(),
      guard.request.buyer_id,
      guard.idempotency_key.clone(),
      guard.cart_fingerprint,
      guard.replay_window(),
    )
  };

  let Some(existing) = store.find_order_by_key(buyer_id, &key, window_start(window)).await? else {
    return Ok(PipelineControl::Continue);
  };
  if existing.cart_fingerprint != fingerprint {
    warn!(%buyer_id, order_id = %existing.id, "Idempotency key reused for a different cart.");
    return Err(CheckoutError::IdempotencyKeyReused { key });
  }

  info!(%buyer_id, order_id = %existing.id, "Replaying earlier checkout; nothing charged.");
  let mut guard = ctx.write();
  guard.order = Some(existing);
  guard.replayed = true;
  Ok(PipelineControl::Stop)
}

pub async fn price_cart<S: Store>(ctx: Ctx<S>) -> StepResult {
  let (store, requests) = {
    let guard = ctx.read();
    (guard.store.clone(), guard.stock_requests.clone())
  };

  let ids: Vec<Uuid> = requests.iter().map(|r| r.product_id()).collect();
  let products: HashMap<Uuid, _> = store
    .find_products(&ids)
    .await?
    .into_iter()
    .map(|p| (p.id, p))
    .collect();

  let mut lines = Vec::with_capacity(requests.len());
  let mut total = Decimal::ZERO;
  for request in &requests {
    let product = products
      .get(&request.product_id())
      .ok_or_else(|| CheckoutError::InvalidCart(format!("Unknown product {}", request.product_id())))?;
    let line = NewOrderLine {
      product_id: product.id,
      product_name: product.name.clone(),
      quantity: request.quantity(),
      unit_price: product.price,
    };
    total = line
      .unit_price
      .checked_mul(Decimal::from(line.quantity))
      .and_then(|subtotal| total.checked_add(subtotal))
      .filter(|sum| *sum <= MAX_ORDER_TOTAL)
      .ok_or_else(|| CheckoutError::InvalidCart(format!("Order total exceeds {}", MAX_ORDER_TOTAL)))?;
    lines.push(line);
  }

  let mut guard = ctx.write();
  guard.lines = lines;
  guard.total = total;
  Ok(PipelineControl::Continue)
}

pub async fn authorize_payment<S: Store>(ctx: Ctx<S>) -> StepResult {
  let (gateway, nonce, total, limit) = {
    let mut guard = ctx.write();
    guard.enter(CheckoutState::PaymentPending);
    (
      Arc::clone(&guard.gateway),
      guard.request.payment_nonce.clone(),
      guard.total,
      guard.settings.gateway_timeout,
    )
  };

  let answer = match tokio::time::timeout(limit, gateway.authorize(&nonce, total)).await {
    Ok(answer) => answer,
    Err(_) => Err(GatewayError::Timeout(limit)),
  };

  match answer {
    Ok(Authorization::Approved { transaction_id, record }) => {
      info!(%transaction_id, %total, "Payment authorized.");
      let mut guard = ctx.write();
      guard.enter(CheckoutState::PaymentApproved);
      guard.payment = Some(ApprovedPayment { transaction_id, record });
      Ok(PipelineControl::Continue)
    }
    Ok(Authorization::Declined { reason }) => {
      info!(%reason, "Payment declined.");
      ctx.write().enter(CheckoutState::PaymentDeclined);
      Err(CheckoutError::PaymentDeclined { reason })
    }
    Err(GatewayError::Timeout(after)) => {
      // Whether the processor charged the card is unknown; leave it to a human.
      error!(?after, %total, "Payment gateway timed out.");
      record_incident(
        &ctx,
        IncidentKind::GatewayTimeout,
        None,
        format!("authorize did not answer within {:?}", after),
      )
      .await;
      Err(CheckoutError::GatewayTimeout(after))
    }
    Err(other) => Err(CheckoutError::Gateway(other)),
  }
}

enum CommitOutcome {
  Persisted(Order),
  Duplicate(Order),
  Rejected(ReserveOutcome),
}

async fn persist_order<S: Store>(
  store: &S,
  new_order: &NewOrder,
  requests: &[StockRequest],
  since: DateTime<Utc>,
) -> Result<CommitOutcome, StoreError> {
  let mut tx = store.begin().await?;
  tx.lock_idempotency_key(new_order.buyer_id, &new_order.idempotency_key).await?;
  if let Some(existing) = tx
    .find_order_by_key(new_order.buyer_id, &new_order.idempotency_key, since)
    .await?
  {
    return Ok(CommitOutcome::Duplicate(existing));
  }

  let outcome = reserve_and_decrement_in(&mut tx, requests).await?;
  if !outcome.is_reserved() {
    return Ok(CommitOutcome::Rejected(outcome));
  }
  let order = tx.insert_order(new_order).await?;
  tx.commit().await?;
  Ok(CommitOutcome::Persisted(order))
}

pub async fn commit_order<S: Store>(ctx: Ctx<S>) -> StepResult {
  let (store, new_order, requests, since) = {
    let mut guard = ctx.write();
    guard.enter(CheckoutState::InventoryCommitting);
    let Some(payment) = guard.payment.clone() else {
      return Err(CheckoutError::Store(StoreError::Corrupt(
        "commit attempted without an approved payment".to_string(),
      )));
    };
    let new_order = NewOrder {
      id: Uuid::new_v4(),
      buyer_id: guard.request.buyer_id,
      lines: guard.lines.clone(),
      total: guard.total,
      currency: guard.settings.currency.clone(),
      payment: payment.record,
      payment_transaction_id: payment.transaction_id,
      idempotency_key: guard.idempotency_key.clone(),
      cart_fingerprint: guard.cart_fingerprint,
    };
    (
      guard.store.clone(),
      new_order,
      guard.stock_requests.clone(),
      window_start(guard.replay_window()),
    )
  };
  let transaction_id = new_order.payment_transaction_id.clone();

  match persist_order(&store, &new_order, &requests, since).await {
    Ok(CommitOutcome::Persisted(order)) => {
      info!(order_id = %order.id, total = %order.total, "Order persisted.");
      let mut guard = ctx.write();
      guard.enter(CheckoutState::OrderPersisted);
      guard.order = Some(order);
      Ok(PipelineControl::Continue)
    }
    Ok(CommitOutcome::Duplicate(existing)) => {
      // A concurrent attempt with the same key won; release our hold.
      compensate(&ctx, &transaction_id, "duplicate checkout").await;
      if existing.cart_fingerprint != new_order.cart_fingerprint {
        return Err(CheckoutError::IdempotencyKeyReused {
          key: new_order.idempotency_key,
        });
      }
      info!(order_id = %existing.id, "Concurrent duplicate checkout; returning the original order.");
      let mut guard = ctx.write();
      guard.order = Some(existing);
      guard.replayed = true;
      Ok(PipelineControl::Stop)
    }
    Ok(CommitOutcome::Rejected(outcome)) => {
      ctx.write().enter(CheckoutState::InventoryFailed);
      compensate(&ctx, &transaction_id, "inventory rejected").await;
      match outcome {
        ReserveOutcome::InsufficientStock {
          product_id,
          requested,
          available,
        } => Err(CheckoutError::InsufficientStock {
          product_id,
          requested,
          available,
        }),
        ReserveOutcome::ProductNotFound { product_id } => {
          Err(CheckoutError::InvalidCart(format!("Unknown product {}", product_id)))
        }
        ReserveOutcome::QuantityOverflow { product_id } => Err(CheckoutError::InvalidCart(format!(
          "Total quantity for product {} is too large",
          product_id
        ))),
        ReserveOutcome::Reserved { .. } => Err(CheckoutError::Store(StoreError::Corrupt(
          "reservation reported as rejected".to_string(),
        ))),
      }
    }
    Err(store_err) => {
      error!(error = %store_err, "Order commit failed after payment authorization.");
      ctx.write().enter(CheckoutState::InventoryFailed);
      compensate(&ctx, &transaction_id, "order commit failed").await;
      Err(CheckoutError::Store(store_err))
    }
  }
}

/// Voids an authorization whose order will not exist. A void that fails or
/// times out is recorded as a payment incident.
async fn compensate<S: Store>(ctx: &Ctx<S>, transaction_id: &str, reason: &str) {
  let (gateway, limit) = {
    let guard = ctx.read();
    (Arc::clone(&guard.gateway), guard.settings.gateway_timeout)
  };

  let voided = match tokio::time::timeout(limit, gateway.void(transaction_id)).await {
    Ok(result) => result,
    Err(_) => Err(GatewayError::Timeout(limit)),
  };
  match voided {
    Ok(_) => info!(%transaction_id, reason, "Authorization voided."),
    Err(e) => {
      error!(%transaction_id, reason, error = %e, "Failed to void authorization.");
      record_incident(
        ctx,
        IncidentKind::VoidFailed,
        Some(transaction_id.to_string()),
        format!("void after {} failed: {}", reason, e),
      )
      .await;
    }
  }
}

async fn record_incident<S: Store>(ctx: &Ctx<S>, kind: IncidentKind, transaction_id: Option<String>, detail: String) {
  let (store, incident) = {
    let guard = ctx.read();
    (
      guard.store.clone(),
      NewPaymentIncident {
        buyer_id: guard.request.buyer_id,
        idempotency_key: guard.idempotency_key.clone(),
        amount: guard.total,
        transaction_id,
        kind,
        detail,
      },
    )
  };
  match store.insert_payment_incident(&incident).await {
    Ok(row) => warn!(incident_id = %row.id, ?kind, "Payment incident recorded for review."),
    Err(e) => error!(error = %e, ?kind, detail = %incident.detail, "Could not record payment incident."),
  }
}
