// core/src/error.rs

//! Error types for each storefront component.
//!
//! Validation and business outcomes are kept apart from infrastructure faults so
//! callers can branch on them: a `StoreError` is never a business answer.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;

/// Faults raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(sqlx::Error),

  #[error("Migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Uniqueness conflict: {0}")]
  Conflict(String),

  #[error("Stored data is inconsistent: {0}")]
  Corrupt(String),
}

impl StoreError {
  /// Whether the fault is transient (pool exhaustion, dropped connection,
  /// serialization failure or deadlock) and the operation may be retried.
  pub fn is_retryable(&self) -> bool {
    match self {
      StoreError::Database(err) => match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
      },
      _ => false,
    }
  }
}

impl From<sqlx::Error> for StoreError {
  fn from(err: sqlx::Error) -> Self {
    if let sqlx::Error::Database(db_err) = &err {
      if db_err.is_unique_violation() {
        let constraint = db_err.constraint().unwrap_or("unknown").to_string();
        return StoreError::Conflict(constraint);
      }
    }
    StoreError::Database(err)
  }
}

pub type StoreResult<T, E = StoreError> = std::result::Result<T, E>;

/// Errors from catalog reads and catalog maintenance.
#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("Invalid filter: {0}")]
  InvalidFilter(String),

  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Already exists: {0}")]
  Conflict(String),

  #[error("Category {category_id} still owns {product_count} product(s); reassign them first")]
  CategoryInUse { category_id: Uuid, product_count: i64 },

  #[error("Product {product_id} appears on orders and cannot be deleted")]
  ProductOrdered { product_id: Uuid },

  #[error(transparent)]
  Store(StoreError),
}

impl From<StoreError> for CatalogError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::Conflict(what) => CatalogError::Conflict(what),
      other => CatalogError::Store(other),
    }
  }
}

/// Errors from admin-side ledger operations. Checkout uses
/// [`crate::inventory::ReserveOutcome`] for its business outcomes instead.
#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("Product {0} not found")]
  ProductNotFound(Uuid),

  #[error("Stock for product {product_id} cannot go below zero (current {current}, change {delta})")]
  NegativeStock { product_id: Uuid, current: i32, delta: i32 },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Faults talking to the payment processor. A decline is not a fault; it is an
/// [`crate::payment::Authorization::Declined`] value.
#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("Payment gateway unavailable: {0}")]
  Unavailable(String),

  #[error("Payment gateway refused the request: {0}")]
  Refused(String),

  #[error("Payment gateway did not answer within {0:?}")]
  Timeout(Duration),
}

/// Engine-level failures of a [`crate::pipeline::Pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Handler missing for step: {step_name}")]
  HandlerMissing { step_name: String },
}

/// Everything `checkout` can answer besides an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
  #[error("Invalid cart: {0}")]
  InvalidCart(String),

  #[error("Buyer {0} not found")]
  BuyerNotFound(Uuid),

  #[error("Idempotency key '{key}' was already used for a different cart")]
  IdempotencyKeyReused { key: String },

  #[error("Payment declined: {reason}")]
  PaymentDeclined { reason: String },

  #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
  InsufficientStock {
    product_id: Uuid,
    requested: i32,
    available: i32,
  },

  #[error("Payment gateway timed out after {0:?}; the attempt was flagged for review")]
  GatewayTimeout(Duration),

  #[error(transparent)]
  Gateway(GatewayError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Checkout workflow error: {0}")]
  Pipeline(#[from] PipelineError),
}

impl CheckoutError {
  /// Business outcomes the client can act on (adjust the cart, change the card).
  pub fn is_business_outcome(&self) -> bool {
    matches!(
      self,
      CheckoutError::PaymentDeclined { .. } | CheckoutError::InsufficientStock { .. }
    )
  }
}

impl From<GatewayError> for CheckoutError {
  fn from(err: GatewayError) -> Self {
    match err {
      GatewayError::Timeout(after) => CheckoutError::GatewayTimeout(after),
      other => CheckoutError::Gateway(other),
    }
  }
}

/// Errors from order reads and status changes.
#[derive(Debug, Error)]
pub enum OrderError {
  #[error("Order {0} not found")]
  NotFound(Uuid),

  #[error("Order cannot move from {from} to {to}")]
  InvalidTransition { from: OrderStatus, to: OrderStatus },

  #[error(transparent)]
  Store(#[from] StoreError),
}
