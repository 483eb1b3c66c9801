// app/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::{json, Value};
use thiserror::Error;

use storefront::{CatalogError, CheckoutError, LedgerError, OrderError, PipelineError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error(transparent)]
  Catalog(#[from] CatalogError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),

  #[error(transparent)]
  Checkout(#[from] CheckoutError),

  #[error(transparent)]
  Order(#[from] OrderError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Workflow setup error: {0}")]
  Workflow(#[from] PipelineError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

fn store_status(err: &StoreError) -> StatusCode {
  match err {
    StoreError::Conflict(_) => StatusCode::CONFLICT,
    e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn store_body(err: &StoreError) -> Value {
  match err {
    StoreError::Conflict(what) => json!({"error": "Conflict", "message": format!("Already exists: {}", what)}),
    e if e.is_retryable() => json!({"error": "StoreUnavailable", "message": "Please retry shortly"}),
    _ => json!({"error": "StoreError", "message": "Database operation failed"}),
  }
}

impl AppError {
  /// Machine-readable body. Infrastructure details stay in the logs.
  fn body(&self) -> Value {
    match self {
      AppError::Validation(m) => json!({"error": "Validation", "message": m}),
      AppError::NotFound(m) => json!({"error": "NotFound", "message": m}),
      AppError::Config(_) | AppError::Workflow(_) | AppError::Internal(_) => {
        json!({"error": "Internal", "message": "An internal error occurred"})
      }
      AppError::Catalog(e) => match e {
        CatalogError::InvalidFilter(m) => json!({"error": "InvalidFilter", "message": m}),
        CatalogError::Validation(m) => json!({"error": "Validation", "message": m}),
        CatalogError::NotFound(m) => json!({"error": "NotFound", "message": m}),
        CatalogError::Conflict(m) => json!({"error": "Conflict", "message": format!("Already exists: {}", m)}),
        CatalogError::CategoryInUse {
          category_id,
          product_count,
        } => json!({
          "error": "CategoryInUse",
          "message": e.to_string(),
          "categoryId": category_id,
          "productCount": product_count,
        }),
        CatalogError::ProductOrdered { product_id } => json!({
          "error": "ProductOrdered",
          "message": e.to_string(),
          "productId": product_id,
        }),
        CatalogError::Store(s) => store_body(s),
      },
      AppError::Ledger(e) => match e {
        LedgerError::ProductNotFound(id) => json!({"error": "NotFound", "message": e.to_string(), "productId": id}),
        LedgerError::NegativeStock { product_id, .. } => {
          json!({"error": "NegativeStock", "message": e.to_string(), "productId": product_id})
        }
        LedgerError::Store(s) => store_body(s),
      },
      AppError::Checkout(e) => match e {
        CheckoutError::InvalidCart(m) => json!({"error": "InvalidCart", "message": m}),
        CheckoutError::BuyerNotFound(id) => json!({"error": "BuyerNotFound", "message": e.to_string(), "buyerId": id}),
        CheckoutError::IdempotencyKeyReused { .. } => json!({"error": "IdempotencyKeyReused", "message": e.to_string()}),
        CheckoutError::PaymentDeclined { reason } => json!({"error": "PaymentDeclined", "message": reason}),
        CheckoutError::InsufficientStock {
          product_id,
          requested,
          available,
        } => json!({
          "error": "InsufficientStock",
          "productId": product_id,
          "requested": requested,
          "available": available,
        }),
        CheckoutError::GatewayTimeout(_) => json!({
          "error": "GatewayTimeout",
          "message": "The payment provider did not answer in time; the attempt was flagged for review",
        }),
        CheckoutError::Gateway(_) => json!({"error": "PaymentGatewayError", "message": "Payment provider error"}),
        CheckoutError::Store(s) => store_body(s),
        CheckoutError::Pipeline(_) => json!({"error": "Internal", "message": "An internal error occurred"}),
      },
      AppError::Order(e) => match e {
        OrderError::NotFound(id) => json!({"error": "NotFound", "message": e.to_string(), "orderId": id}),
        OrderError::InvalidTransition { from, to } => json!({
          "error": "InvalidTransition",
          "message": e.to_string(),
          "from": from,
          "to": to,
        }),
        OrderError::Store(s) => store_body(s),
      },
      AppError::Store(s) => store_body(s),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Config(_) | AppError::Workflow(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Catalog(e) => match e {
        CatalogError::InvalidFilter(_) | CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::Conflict(_) | CatalogError::CategoryInUse { .. } | CatalogError::ProductOrdered { .. } => {
          StatusCode::CONFLICT
        }
        CatalogError::Store(s) => store_status(s),
      },
      AppError::Ledger(e) => match e {
        LedgerError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::NegativeStock { .. } => StatusCode::BAD_REQUEST,
        LedgerError::Store(s) => store_status(s),
      },
      AppError::Checkout(e) => match e {
        CheckoutError::InvalidCart(_) => StatusCode::BAD_REQUEST,
        CheckoutError::BuyerNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::IdempotencyKeyReused { .. } | CheckoutError::InsufficientStock { .. } => StatusCode::CONFLICT,
        CheckoutError::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CheckoutError::Gateway(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::Store(s) => store_status(s),
        CheckoutError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
      AppError::Order(e) => match e {
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        OrderError::Store(s) => store_status(s),
      },
      AppError::Store(s) => store_status(s),
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with error");
    }
    HttpResponse::build(status).json(self.body())
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use uuid::Uuid;

  #[test]
  fn business_outcomes_map_to_client_statuses() {
    let declined = AppError::from(CheckoutError::PaymentDeclined {
      reason: "nope".into(),
    });
    assert_eq!(declined.status_code(), StatusCode::PAYMENT_REQUIRED);

    let id = Uuid::new_v4();
    let short = AppError::from(CheckoutError::InsufficientStock {
      product_id: id,
      requested: 2,
      available: 1,
    });
    assert_eq!(short.status_code(), StatusCode::CONFLICT);
    assert_eq!(short.body()["error"], "InsufficientStock");
    assert_eq!(short.body()["productId"], id.to_string());

    let ordered = AppError::from(CatalogError::ProductOrdered { product_id: id });
    assert_eq!(ordered.status_code(), StatusCode::CONFLICT);
    assert_eq!(ordered.body()["error"], "ProductOrdered");
  }

  #[test]
  fn infrastructure_details_are_not_leaked() {
    let err = AppError::from(StoreError::Corrupt("orders row 42 is broken".into()));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!err.body().to_string().contains("row 42"));

    let busy = AppError::from(CatalogError::Store(StoreError::Database(sqlx::Error::PoolTimedOut)));
    assert_eq!(busy.status_code(), StatusCode::SERVICE_UNAVAILABLE);
  }
}
