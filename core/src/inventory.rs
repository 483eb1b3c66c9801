// core/src/inventory.rs

//! Inventory Ledger: the only code that mutates `quantity` and `sold`.
//!
//! Every mutation locks the affected product rows first (ascending id order,
//! so overlapping carts cannot deadlock), checks the whole batch, and only then
//! writes. A rejected batch writes nothing.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{LedgerError, StoreError, StoreResult};
use crate::models::StockLevel;
use crate::store::{Store, StoreTx};

/// A positive quantity of one product to take out of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockRequest {
  product_id: Uuid,
  quantity: i32,
}

impl StockRequest {
  /// `None` unless `quantity` is positive.
  pub fn new(product_id: Uuid, quantity: i32) -> Option<Self> {
    (quantity > 0).then_some(Self { product_id, quantity })
  }

  pub fn product_id(&self) -> Uuid {
    self.product_id
  }

  pub fn quantity(&self) -> i32 {
    self.quantity
  }
}

/// Result of a reservation. Shortages and unknown products are expected
/// business answers, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReserveOutcome {
  /// Every line fit; the counters after the decrement.
  Reserved { levels: Vec<StockLevel> },
  #[serde(rename_all = "camelCase")]
  InsufficientStock {
    product_id: Uuid,
    requested: i32,
    available: i32,
  },
  #[serde(rename_all = "camelCase")]
  ProductNotFound { product_id: Uuid },
  /// The lines for one product add up to more than an `i32` holds.
  #[serde(rename_all = "camelCase")]
  QuantityOverflow { product_id: Uuid },
}

impl ReserveOutcome {
  pub fn is_reserved(&self) -> bool {
    matches!(self, ReserveOutcome::Reserved { .. })
  }
}

/// The summed quantity of one product's lines does not fit an `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityOverflow {
  pub product_id: Uuid,
}

/// Sums requests per product and orders them by product id.
pub fn merge_requests(requests: &[StockRequest]) -> Result<Vec<StockRequest>, QuantityOverflow> {
  let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
  for r in requests {
    let total = merged.entry(r.product_id).or_insert(0);
    *total = total.checked_add(r.quantity).ok_or(QuantityOverflow {
      product_id: r.product_id,
    })?;
  }
  Ok(
    merged
      .into_iter()
      .map(|(product_id, quantity)| StockRequest { product_id, quantity })
      .collect(),
  )
}

/// All-or-nothing decrement inside the caller's transaction. The caller decides
/// whether to commit; on anything but `Reserved` nothing has been written.
pub async fn reserve_and_decrement_in<T: StoreTx>(tx: &mut T, requests: &[StockRequest]) -> StoreResult<ReserveOutcome> {
  let merged = match merge_requests(requests) {
    Ok(merged) => merged,
    Err(QuantityOverflow { product_id }) => return Ok(ReserveOutcome::QuantityOverflow { product_id }),
  };
  let ids: Vec<Uuid> = merged.iter().map(|r| r.product_id).collect();
  let locked: HashMap<Uuid, StockLevel> = tx
    .lock_stock(&ids)
    .await?
    .into_iter()
    .map(|level| (level.product_id, level))
    .collect();

  for request in &merged {
    let Some(level) = locked.get(&request.product_id) else {
      return Ok(ReserveOutcome::ProductNotFound {
        product_id: request.product_id,
      });
    };
    if request.quantity > level.quantity {
      return Ok(ReserveOutcome::InsufficientStock {
        product_id: request.product_id,
        requested: request.quantity,
        available: level.quantity,
      });
    }
  }

  let mut levels = Vec::with_capacity(merged.len());
  for request in &merged {
    let current = locked[&request.product_id];
    let sold = current.sold.checked_add(request.quantity).ok_or_else(|| {
      StoreError::Corrupt(format!("sold counter overflow for product {}", request.product_id))
    })?;
    let next = StockLevel {
      product_id: request.product_id,
      quantity: current.quantity - request.quantity,
      sold,
    };
    tx.write_stock(next).await?;
    levels.push(next);
  }
  Ok(ReserveOutcome::Reserved { levels })
}

#[derive(Clone)]
pub struct InventoryLedger<S: Store> {
  store: S,
}

impl<S: Store> InventoryLedger<S> {
  pub fn new(store: S) -> Self {
    Self { store }
  }

  /// Reserve-and-decrement in a transaction of its own, committed only when
  /// every line fits.
  #[instrument(name = "ledger::reserve_and_decrement", skip(self, requests), fields(lines = requests.len()))]
  pub async fn reserve_and_decrement(&self, requests: &[StockRequest]) -> StoreResult<ReserveOutcome> {
    let mut tx = self.store.begin().await?;
    let outcome = reserve_and_decrement_in(&mut tx, requests).await?;
    if outcome.is_reserved() {
      tx.commit().await?;
    } else {
      warn!(?outcome, "Reservation rejected; nothing written.");
    }
    Ok(outcome)
  }

  /// Admin stock edit: sets the available quantity outright.
  #[instrument(name = "ledger::set_stock", skip(self), err(Display))]
  pub async fn set_stock(&self, product_id: Uuid, quantity: i32) -> Result<StockLevel, LedgerError> {
    let mut tx = self.store.begin().await?;
    let current = lock_one(&mut tx, product_id).await?;
    if quantity < 0 {
      return Err(LedgerError::NegativeStock {
        product_id,
        current: current.quantity,
        delta: quantity.saturating_sub(current.quantity),
      });
    }
    let next = StockLevel { quantity, ..current };
    tx.write_stock(next).await?;
    tx.commit().await?;
    info!(%product_id, from = current.quantity, to = quantity, "Stock set.");
    Ok(next)
  }

  /// Admin stock edit: adds `delta` (may be negative) to the available quantity.
  #[instrument(name = "ledger::restock", skip(self), err(Display))]
  pub async fn restock(&self, product_id: Uuid, delta: i32) -> Result<StockLevel, LedgerError> {
    let mut tx = self.store.begin().await?;
    let current = lock_one(&mut tx, product_id).await?;
    let quantity = match current.quantity.checked_add(delta) {
      Some(q) if q >= 0 => q,
      _ => {
        return Err(LedgerError::NegativeStock {
          product_id,
          current: current.quantity,
          delta,
        })
      }
    };
    let next = StockLevel { quantity, ..current };
    tx.write_stock(next).await?;
    tx.commit().await?;
    info!(%product_id, delta, quantity, "Stock adjusted.");
    Ok(next)
  }
}

async fn lock_one<T: StoreTx>(tx: &mut T, product_id: Uuid) -> Result<StockLevel, LedgerError> {
  tx.lock_stock(&[product_id])
    .await?
    .into_iter()
    .next()
    .ok_or(LedgerError::ProductNotFound(product_id))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn non_positive_requests_cannot_be_built() {
    assert!(StockRequest::new(Uuid::nil(), 0).is_none());
    assert!(StockRequest::new(Uuid::nil(), -2).is_none());
    assert_eq!(StockRequest::new(Uuid::nil(), 2).map(|r| r.quantity()), Some(2));
  }

  #[test]
  fn merge_sums_duplicates_and_sorts_by_id() {
    let a = Uuid::from_u128(2);
    let b = Uuid::from_u128(1);
    let merged = merge_requests(&[
      StockRequest::new(a, 1).unwrap(),
      StockRequest::new(b, 2).unwrap(),
      StockRequest::new(a, 3).unwrap(),
    ])
    .unwrap();
    let flat: Vec<(Uuid, i32)> = merged.iter().map(|r| (r.product_id(), r.quantity())).collect();
    assert_eq!(flat, vec![(b, 2), (a, 4)]);
  }

  #[test]
  fn merge_refuses_quantities_that_overflow() {
    let bolt = Uuid::from_u128(7);
    let lines = [
      StockRequest::new(bolt, i32::MAX).unwrap(),
      StockRequest::new(bolt, i32::MAX).unwrap(),
    ];
    assert_eq!(merge_requests(&lines), Err(QuantityOverflow { product_id: bolt }));
  }
}
