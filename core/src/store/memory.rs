// core/src/store/memory.rs

//! In-process [`Store`] used by tests and by the server when no database is
//! configured.
//!
//! One `tokio::sync::Mutex` guards the whole state. A transaction holds the
//! lock from `begin` until it is committed or dropped and works on a staged
//! copy, so transactions are fully serialised and an uncommitted one leaves no
//! trace. Plain reads wait for any open transaction.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::catalog::CatalogQuery;
use crate::error::{StoreError, StoreResult};
use crate::models::{
  Buyer, Category, NewBuyer, NewCategory, NewOrder, NewPaymentIncident, NewProduct, Order, OrderLine, OrderStatus,
  PaymentIncident, Product, ProductDetail, ProductSummary, StockLevel,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
  categories: HashMap<Uuid, Category>,
  products: HashMap<Uuid, Product>,
  buyers: HashMap<Uuid, Buyer>,
  orders: HashMap<Uuid, Order>,
  incidents: Vec<PaymentIncident>,
  /// Last timestamp handed out; keeps `created_at` strictly increasing.
  clock: Option<DateTime<Utc>>,
}

impl MemoryState {
  fn now(&mut self) -> DateTime<Utc> {
    let now = Utc::now();
    let next = match self.clock {
      Some(last) if now <= last => last + Duration::microseconds(1),
      _ => now,
    };
    self.clock = Some(next);
    next
  }

  fn category_name(&self, id: Uuid) -> StoreResult<&str> {
    self
      .categories
      .get(&id)
      .map(|c| c.name.as_str())
      .ok_or_else(|| StoreError::Corrupt(format!("product references missing category {}", id)))
  }

  fn summaries<'a>(&self, products: impl Iterator<Item = &'a Product>) -> StoreResult<Vec<ProductSummary>> {
    products
      .map(|p| Ok(ProductSummary::from_product(p, self.category_name(p.category_id)?)))
      .collect()
  }

  fn find_order_by_key(&self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> Option<Order> {
    self
      .orders
      .values()
      .filter(|o| o.buyer_id == buyer_id && o.idempotency_key == key && o.created_at >= since)
      .max_by_key(|o| o.created_at)
      .cloned()
  }
}

/// Newest first, ties broken by id, the same order the SQL backend uses.
fn newest_first(a: &Product, b: &Product) -> std::cmp::Ordering {
  b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

#[derive(Clone, Default)]
pub struct MemoryStore {
  state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

pub struct MemoryTx {
  guard: OwnedMutexGuard<MemoryState>,
  staged: MemoryState,
}

#[async_trait]
impl Store for MemoryStore {
  type Tx = MemoryTx;

  async fn begin(&self) -> StoreResult<MemoryTx> {
    let guard = Arc::clone(&self.state).lock_owned().await;
    let staged = guard.clone();
    Ok(MemoryTx { guard, staged })
  }

  async fn search_products(&self, query: &CatalogQuery) -> StoreResult<(Vec<ProductSummary>, i64)> {
    let state = self.state.lock().await;
    let mut matched: Vec<&Product> = state.products.values().filter(|p| query.matches(p)).collect();
    matched.sort_by(|a, b| query.relevance(a).cmp(&query.relevance(b)).then_with(|| newest_first(a, b)));

    let total = matched.len() as i64;
    let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(query.limit()).unwrap_or(0);
    let page = state.summaries(matched.into_iter().skip(offset).take(limit))?;
    Ok((page, total))
  }

  async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
    Ok(self.state.lock().await.products.get(&id).cloned())
  }

  async fn find_product_by_slug(&self, slug: &str) -> StoreResult<Option<ProductDetail>> {
    let state = self.state.lock().await;
    let Some(product) = state.products.values().find(|p| p.slug == slug) else {
      return Ok(None);
    };
    let category = state
      .categories
      .get(&product.category_id)
      .cloned()
      .ok_or_else(|| StoreError::Corrupt(format!("product references missing category {}", product.category_id)))?;
    Ok(Some(ProductDetail {
      product: product.clone(),
      category,
    }))
  }

  async fn find_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
    let state = self.state.lock().await;
    Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
  }

  async fn products_in_category(
    &self,
    category_id: Uuid,
    exclude: Option<Uuid>,
    limit: i64,
  ) -> StoreResult<Vec<ProductSummary>> {
    let state = self.state.lock().await;
    let mut products: Vec<&Product> = state
      .products
      .values()
      .filter(|p| p.category_id == category_id && Some(p.id) != exclude)
      .collect();
    products.sort_by(|a, b| newest_first(a, b));
    state.summaries(products.into_iter().take(usize::try_from(limit).unwrap_or(0)))
  }

  async fn count_products(&self) -> StoreResult<i64> {
    Ok(self.state.lock().await.products.len() as i64)
  }

  async fn list_categories(&self) -> StoreResult<Vec<Category>> {
    let state = self.state.lock().await;
    let mut categories: Vec<Category> = state.categories.values().cloned().collect();
    categories.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(categories)
  }

  async fn find_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
    let state = self.state.lock().await;
    Ok(state.categories.values().find(|c| c.slug == slug).cloned())
  }

  async fn find_buyer(&self, id: Uuid) -> StoreResult<Option<Buyer>> {
    Ok(self.state.lock().await.buyers.get(&id).cloned())
  }

  async fn insert_buyer(&self, buyer: &NewBuyer) -> StoreResult<Buyer> {
    let mut state = self.state.lock().await;
    if state.buyers.values().any(|b| b.email == buyer.email) {
      return Err(StoreError::Conflict("buyers_email_key".to_string()));
    }
    let now = state.now();
    let row = Buyer {
      id: Uuid::new_v4(),
      name: buyer.name.clone(),
      email: buyer.email.clone(),
      address: buyer.address.clone(),
      role: buyer.role,
      created_at: now,
      updated_at: now,
    };
    state.buyers.insert(row.id, row.clone());
    Ok(row)
  }

  async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
    Ok(self.state.lock().await.orders.get(&id).cloned())
  }

  async fn find_order_by_key(&self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> StoreResult<Option<Order>> {
    Ok(self.state.lock().await.find_order_by_key(buyer_id, key, since))
  }

  async fn orders_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Order>> {
    let state = self.state.lock().await;
    let mut orders: Vec<Order> = state.orders.values().filter(|o| o.buyer_id == buyer_id).cloned().collect();
    orders.sort_by_key(|o| Reverse((o.created_at, o.id)));
    Ok(orders)
  }

  async fn insert_payment_incident(&self, incident: &NewPaymentIncident) -> StoreResult<PaymentIncident> {
    let mut state = self.state.lock().await;
    let row = PaymentIncident {
      id: Uuid::new_v4(),
      buyer_id: incident.buyer_id,
      idempotency_key: incident.idempotency_key.clone(),
      amount: incident.amount,
      transaction_id: incident.transaction_id.clone(),
      kind: incident.kind,
      detail: incident.detail.clone(),
      created_at: state.now(),
    };
    state.incidents.push(row.clone());
    Ok(row)
  }

  async fn list_payment_incidents(&self) -> StoreResult<Vec<PaymentIncident>> {
    let state = self.state.lock().await;
    let mut incidents = state.incidents.clone();
    incidents.sort_by_key(|i| Reverse(i.created_at));
    Ok(incidents)
  }
}

#[async_trait]
impl StoreTx for MemoryTx {
  async fn lock_stock(&mut self, product_ids: &[Uuid]) -> StoreResult<Vec<StockLevel>> {
    let mut ids = product_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    Ok(
      ids
        .iter()
        .filter_map(|id| self.staged.products.get(id))
        .map(|p| StockLevel {
          product_id: p.id,
          quantity: p.quantity,
          sold: p.sold,
        })
        .collect(),
    )
  }

  async fn write_stock(&mut self, level: StockLevel) -> StoreResult<()> {
    if level.quantity < 0 || level.sold < 0 {
      return Err(StoreError::Corrupt(format!(
        "negative stock counters for product {}",
        level.product_id
      )));
    }
    let now = self.staged.now();
    let product = self
      .staged
      .products
      .get_mut(&level.product_id)
      .ok_or_else(|| StoreError::Corrupt(format!("stock write for missing product {}", level.product_id)))?;
    product.quantity = level.quantity;
    product.sold = level.sold;
    product.updated_at = now;
    Ok(())
  }

  async fn lock_idempotency_key(&mut self, _buyer_id: Uuid, _key: &str) -> StoreResult<()> {
    // Already exclusive: the transaction holds the store lock.
    Ok(())
  }

  async fn find_order_by_key(&mut self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> StoreResult<Option<Order>> {
    Ok(self.staged.find_order_by_key(buyer_id, key, since))
  }

  async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
    if self.staged.orders.contains_key(&order.id) {
      return Err(StoreError::Conflict("orders_pkey".to_string()));
    }
    if !self.staged.buyers.contains_key(&order.buyer_id) {
      return Err(StoreError::Corrupt(format!("order for missing buyer {}", order.buyer_id)));
    }
    if let Some(line) = order.lines.iter().find(|l| !self.staged.products.contains_key(&l.product_id)) {
      return Err(StoreError::Corrupt(format!("order line for missing product {}", line.product_id)));
    }
    let now = self.staged.now();
    let row = Order {
      id: order.id,
      buyer_id: order.buyer_id,
      status: OrderStatus::NotProcessed,
      lines: order
        .lines
        .iter()
        .map(|l| OrderLine {
          product_id: l.product_id,
          product_name: l.product_name.clone(),
          quantity: l.quantity,
          unit_price: l.unit_price,
        })
        .collect(),
      total: order.total,
      currency: order.currency.clone(),
      payment: order.payment.clone(),
      payment_transaction_id: order.payment_transaction_id.clone(),
      idempotency_key: order.idempotency_key.clone(),
      cart_fingerprint: order.cart_fingerprint,
      created_at: now,
      updated_at: now,
    };
    self.staged.orders.insert(row.id, row.clone());
    Ok(row)
  }

  async fn lock_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
    Ok(self.staged.orders.get(&id).cloned())
  }

  async fn write_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
    let now = self.staged.now();
    let order = self
      .staged
      .orders
      .get_mut(&id)
      .ok_or_else(|| StoreError::Corrupt(format!("status write for missing order {}", id)))?;
    order.status = status;
    order.updated_at = now;
    Ok(order.clone())
  }

  async fn find_category(&mut self, id: Uuid) -> StoreResult<Option<Category>> {
    Ok(self.staged.categories.get(&id).cloned())
  }

  async fn insert_category(&mut self, category: &NewCategory) -> StoreResult<Category> {
    if self.staged.categories.values().any(|c| c.name == category.name) {
      return Err(StoreError::Conflict("categories_name_key".to_string()));
    }
    if self.staged.categories.values().any(|c| c.slug == category.slug) {
      return Err(StoreError::Conflict("categories_slug_key".to_string()));
    }
    let row = Category {
      id: Uuid::new_v4(),
      name: category.name.clone(),
      slug: category.slug.clone(),
    };
    self.staged.categories.insert(row.id, row.clone());
    Ok(row)
  }

  async fn update_category(&mut self, category: &Category) -> StoreResult<Category> {
    for other in self.staged.categories.values().filter(|c| c.id != category.id) {
      if other.name == category.name {
        return Err(StoreError::Conflict("categories_name_key".to_string()));
      }
      if other.slug == category.slug {
        return Err(StoreError::Conflict("categories_slug_key".to_string()));
      }
    }
    let row = self
      .staged
      .categories
      .get_mut(&category.id)
      .ok_or_else(|| StoreError::Corrupt(format!("update for missing category {}", category.id)))?;
    *row = category.clone();
    Ok(row.clone())
  }

  async fn count_products_in_category(&mut self, category_id: Uuid) -> StoreResult<i64> {
    Ok(
      self
        .staged
        .products
        .values()
        .filter(|p| p.category_id == category_id)
        .count() as i64,
    )
  }

  async fn reassign_products(&mut self, from: Uuid, to: Uuid) -> StoreResult<u64> {
    let now = self.staged.now();
    let mut moved = 0;
    for product in self.staged.products.values_mut().filter(|p| p.category_id == from) {
      product.category_id = to;
      product.updated_at = now;
      moved += 1;
    }
    Ok(moved)
  }

  async fn delete_category(&mut self, id: Uuid) -> StoreResult<bool> {
    if self.staged.products.values().any(|p| p.category_id == id) {
      return Err(StoreError::Corrupt(format!("category {} is still referenced by products", id)));
    }
    Ok(self.staged.categories.remove(&id).is_some())
  }

  async fn slug_taken(&mut self, slug: &str) -> StoreResult<bool> {
    Ok(self.staged.products.values().any(|p| p.slug == slug))
  }

  async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
    if self.staged.products.values().any(|p| p.slug == product.slug) {
      return Err(StoreError::Conflict("products_slug_key".to_string()));
    }
    if !self.staged.categories.contains_key(&product.category_id) {
      return Err(StoreError::Corrupt(format!(
        "product for missing category {}",
        product.category_id
      )));
    }
    let now = self.staged.now();
    let row = Product {
      id: Uuid::new_v4(),
      name: product.name.clone(),
      slug: product.slug.clone(),
      description: product.description.clone(),
      price: product.price,
      quantity: product.quantity,
      sold: 0,
      category_id: product.category_id,
      photo_path: product.photo_path.clone(),
      shipping: product.shipping,
      created_at: now,
      updated_at: now,
    };
    self.staged.products.insert(row.id, row.clone());
    Ok(row)
  }

  async fn lock_product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
    Ok(self.staged.products.get(&id).cloned())
  }

  async fn write_product(&mut self, product: &Product) -> StoreResult<Product> {
    if self
      .staged
      .products
      .values()
      .any(|p| p.id != product.id && p.slug == product.slug)
    {
      return Err(StoreError::Conflict("products_slug_key".to_string()));
    }
    if !self.staged.categories.contains_key(&product.category_id) {
      return Err(StoreError::Corrupt(format!(
        "product for missing category {}",
        product.category_id
      )));
    }
    let now = self.staged.now();
    let row = self
      .staged
      .products
      .get_mut(&product.id)
      .ok_or_else(|| StoreError::Corrupt(format!("update for missing product {}", product.id)))?;
    row.name = product.name.clone();
    row.slug = product.slug.clone();
    row.description = product.description.clone();
    row.price = product.price;
    row.category_id = product.category_id;
    row.photo_path = product.photo_path.clone();
    row.shipping = product.shipping;
    row.updated_at = now;
    Ok(row.clone())
  }

  async fn product_has_orders(&mut self, id: Uuid) -> StoreResult<bool> {
    Ok(
      self
        .staged
        .orders
        .values()
        .any(|o| o.lines.iter().any(|l| l.product_id == id)),
    )
  }

  async fn delete_product(&mut self, id: Uuid) -> StoreResult<bool> {
    if self.product_has_orders(id).await? {
      return Err(StoreError::Corrupt(format!("product {} is still referenced by order lines", id)));
    }
    Ok(self.staged.products.remove(&id).is_some())
  }

  async fn commit(self) -> StoreResult<()> {
    let MemoryTx { mut guard, staged } = self;
    *guard = staged;
    Ok(())
  }
}
