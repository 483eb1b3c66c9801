// core/src/models/incident.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

/// Why a payment needs a human to look at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SqlxType)]
#[sqlx(type_name = "payment_incident_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
  /// The gateway never answered; a charge may exist without an order.
  GatewayTimeout,
  /// An authorization could not be voided after the order failed.
  VoidFailed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIncident {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub idempotency_key: String,
  pub amount: Decimal,
  pub transaction_id: Option<String>,
  pub kind: IncidentKind,
  pub detail: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentIncident {
  pub buyer_id: Uuid,
  pub idempotency_key: String,
  pub amount: Decimal,
  pub transaction_id: Option<String>,
  pub kind: IncidentKind,
  pub detail: String,
}
