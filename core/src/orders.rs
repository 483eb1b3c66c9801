// core/src/orders.rs

//! Order reads and post-purchase status changes.

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::OrderError;
use crate::models::{Order, OrderStatus, PaymentIncident};
use crate::store::{Store, StoreTx};

#[derive(Clone)]
pub struct OrderService<S: Store> {
  store: S,
}

impl<S: Store> OrderService<S> {
  pub fn new(store: S) -> Self {
    Self { store }
  }

  pub async fn find_order(&self, id: Uuid) -> Result<Order, OrderError> {
    self.store.find_order(id).await?.ok_or(OrderError::NotFound(id))
  }

  /// Newest first.
  pub async fn orders_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<Order>, OrderError> {
    Ok(self.store.orders_for_buyer(buyer_id).await?)
  }

  /// Moves an order along its lifecycle. Cancelling does not return stock.
  #[instrument(name = "orders::update_status", skip(self), err(Display))]
  pub async fn update_status(&self, id: Uuid, next: OrderStatus) -> Result<Order, OrderError> {
    let mut tx = self.store.begin().await?;
    let order = tx.lock_order(id).await?.ok_or(OrderError::NotFound(id))?;
    if !order.status.can_transition_to(next) {
      return Err(OrderError::InvalidTransition {
        from: order.status,
        to: next,
      });
    }
    let updated = tx.write_order_status(id, next).await?;
    tx.commit().await?;
    info!(order_id = %id, from = %order.status, to = %next, "Order status changed.");
    Ok(updated)
  }

  /// Payments that may have been captured without an order, newest first.
  pub async fn payment_incidents(&self) -> Result<Vec<PaymentIncident>, OrderError> {
    Ok(self.store.list_payment_incidents().await?)
  }
}
