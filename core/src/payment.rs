// core/src/payment.rs

//! Payment gateway contract and an in-process mock processor.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::GatewayError;

/// Answer to an authorization request.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
  /// `record` is the processor's opaque payload, stored verbatim on the order.
  Approved {
    transaction_id: String,
    record: serde_json::Value,
  },
  Declined { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidReceipt {
  pub transaction_id: String,
  pub voided_at: DateTime<Utc>,
}

/// Anything that can hold and release funds on a payment nonce.
///
/// Implementations must be safe to call concurrently; checkout bounds every
/// call with its own timeout, so they need not.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
  async fn authorize(&self, nonce: &str, amount: Decimal) -> Result<Authorization, GatewayError>;
  async fn void(&self, transaction_id: &str) -> Result<VoidReceipt, GatewayError>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
  async fn authorize(&self, nonce: &str, amount: Decimal) -> Result<Authorization, GatewayError> {
    (**self).authorize(nonce, amount).await
  }

  async fn void(&self, transaction_id: &str) -> Result<VoidReceipt, GatewayError> {
    (**self).void(transaction_id).await
  }
}

pub const DECLINED_NONCE_PREFIX: &str = "fake-declined";
pub const VOID_FAILS_NONCE_PREFIX: &str = "fake-void-fails";

#[derive(Default)]
struct MockLedger {
  authorized: HashSet<String>,
  void_fails: HashSet<String>,
  voided: Vec<String>,
}

/// A processor simulation. Every nonce is approved except:
///  - nonces starting with `fake-declined`, which are declined;
///  - nonces starting with `fake-void-fails`, which are approved but whose
///    authorization cannot be voided later.
pub struct MockPaymentGateway {
  merchant_id: String,
  latency: Duration,
  state: Mutex<MockLedger>,
}

impl MockPaymentGateway {
  pub fn new(merchant_id: impl Into<String>, latency: Duration) -> Self {
    Self {
      merchant_id: merchant_id.into(),
      latency,
      state: Mutex::new(MockLedger::default()),
    }
  }

  /// Transaction ids voided so far, in call order.
  pub fn voided(&self) -> Vec<String> {
    self.state.lock().voided.clone()
  }

  pub fn authorization_count(&self) -> usize {
    self.state.lock().authorized.len()
  }
}

impl Default for MockPaymentGateway {
  fn default() -> Self {
    Self::new("mock-merchant", Duration::ZERO)
  }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
  #[instrument(name = "mock_gateway::authorize", skip(self, nonce), fields(merchant = %self.merchant_id, %amount))]
  async fn authorize(&self, nonce: &str, amount: Decimal) -> Result<Authorization, GatewayError> {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    if amount <= Decimal::ZERO {
      return Err(GatewayError::Refused("Amount must be greater than zero".to_string()));
    }
    if nonce.starts_with(DECLINED_NONCE_PREFIX) {
      info!("Mock authorization DECLINED.");
      return Ok(Authorization::Declined {
        reason: "Card declined by issuer".to_string(),
      });
    }

    let transaction_id = format!("mock_txn_{}", Uuid::new_v4().simple());
    {
      let mut state = self.state.lock();
      state.authorized.insert(transaction_id.clone());
      if nonce.starts_with(VOID_FAILS_NONCE_PREFIX) {
        state.void_fails.insert(transaction_id.clone());
      }
    }
    info!(%transaction_id, "Mock authorization APPROVED.");
    Ok(Authorization::Approved {
      record: json!({
        "processor": "mock",
        "merchantId": self.merchant_id,
        "transactionId": transaction_id,
        "amount": amount.to_string(),
        "status": "authorized",
      }),
      transaction_id,
    })
  }

  #[instrument(name = "mock_gateway::void", skip(self), fields(merchant = %self.merchant_id))]
  async fn void(&self, transaction_id: &str) -> Result<VoidReceipt, GatewayError> {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    let mut state = self.state.lock();
    if !state.authorized.contains(transaction_id) {
      return Err(GatewayError::Refused(format!("Unknown transaction {}", transaction_id)));
    }
    if state.void_fails.contains(transaction_id) {
      warn!("Mock void FAILED.");
      return Err(GatewayError::Unavailable("Void rejected by processor".to_string()));
    }
    state.voided.push(transaction_id.to_string());
    Ok(VoidReceipt {
      transaction_id: transaction_id.to_string(),
      voided_at: Utc::now(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn declined_nonce_is_a_value_not_an_error() {
    let gateway = MockPaymentGateway::default();
    let answer = gateway.authorize("fake-declined-card", Decimal::ONE).await.unwrap();
    assert!(matches!(answer, Authorization::Declined { .. }));
    assert_eq!(gateway.authorization_count(), 0);
  }

  #[tokio::test]
  async fn approved_authorization_can_be_voided_once_recorded() {
    let gateway = MockPaymentGateway::default();
    let Authorization::Approved { transaction_id, record } =
      gateway.authorize("fake-valid-nonce", Decimal::new(1050, 2)).await.unwrap()
    else {
      panic!("expected approval");
    };
    assert_eq!(record["amount"], "10.50");
    gateway.void(&transaction_id).await.unwrap();
    assert_eq!(gateway.voided(), vec![transaction_id]);
  }

  #[tokio::test]
  async fn void_fails_for_marked_nonces() {
    let gateway = MockPaymentGateway::default();
    let Authorization::Approved { transaction_id, .. } =
      gateway.authorize("fake-void-fails-1", Decimal::ONE).await.unwrap()
    else {
      panic!("expected approval");
    };
    assert!(gateway.void(&transaction_id).await.is_err());
    assert!(gateway.voided().is_empty());
  }
}
