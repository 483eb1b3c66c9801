// core/src/models/order.rs

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  NotProcessed,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  /// Orders only move forward; cancellation is possible until shipment.
  pub fn can_transition_to(self, next: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
      (self, next),
      (NotProcessed, Processing) | (NotProcessed, Cancelled) | (Processing, Shipped) | (Processing, Cancelled) | (Shipped, Delivered)
    )
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      OrderStatus::NotProcessed => "NOT_PROCESSED",
      OrderStatus::Processing => "PROCESSING",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Cancelled => "CANCELLED",
    };
    f.write_str(s)
  }
}

/// A purchased line, priced at the moment of purchase.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price: Decimal,
}

impl OrderLine {
  pub fn subtotal(&self) -> Decimal {
    self.unit_price * Decimal::from(self.quantity)
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub status: OrderStatus,
  pub lines: Vec<OrderLine>,
  pub total: Decimal,
  pub currency: String,
  /// Opaque record returned by the payment gateway.
  pub payment: serde_json::Value,
  pub payment_transaction_id: String,
  pub idempotency_key: String,
  pub cart_fingerprint: Uuid,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price: Decimal,
}

/// Everything needed to write an order row and its lines.
#[derive(Debug, Clone)]
pub struct NewOrder {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub lines: Vec<NewOrderLine>,
  pub total: Decimal,
  pub currency: String,
  pub payment: serde_json::Value,
  pub payment_transaction_id: String,
  pub idempotency_key: String,
  pub cart_fingerprint: Uuid,
}
