// core/src/store/mod.rs

//! Repository traits for the storefront tables.
//!
//! Reads that need no isolation live on [`Store`]. Anything that mutates
//! inventory, orders or the catalog structure goes through a [`StoreTx`], so
//! the transaction boundary is explicit at every call site. Dropping a
//! transaction without [`StoreTx::commit`] rolls it back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::CatalogQuery;
use crate::error::StoreResult;
use crate::models::{
  Buyer, Category, NewBuyer, NewCategory, NewOrder, NewPaymentIncident, NewProduct, Order, OrderStatus,
  PaymentIncident, Product, ProductDetail, ProductSummary, StockLevel,
};

#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
  type Tx: StoreTx;

  async fn begin(&self) -> StoreResult<Self::Tx>;

  // --- catalog ---

  /// One page of matching products plus the total match count.
  async fn search_products(&self, query: &CatalogQuery) -> StoreResult<(Vec<ProductSummary>, i64)>;
  async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
  async fn find_product_by_slug(&self, slug: &str) -> StoreResult<Option<ProductDetail>>;
  /// Products for the given ids; unknown ids are simply absent.
  async fn find_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>>;
  async fn products_in_category(
    &self,
    category_id: Uuid,
    exclude: Option<Uuid>,
    limit: i64,
  ) -> StoreResult<Vec<ProductSummary>>;
  async fn count_products(&self) -> StoreResult<i64>;
  async fn list_categories(&self) -> StoreResult<Vec<Category>>;
  async fn find_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;

  // --- buyers ---

  async fn find_buyer(&self, id: Uuid) -> StoreResult<Option<Buyer>>;
  async fn insert_buyer(&self, buyer: &NewBuyer) -> StoreResult<Buyer>;

  // --- orders ---

  async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
  /// The newest order `buyer_id` placed with `key` at or after `since`.
  async fn find_order_by_key(&self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> StoreResult<Option<Order>>;
  async fn orders_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Order>>;

  // --- payment incidents ---

  async fn insert_payment_incident(&self, incident: &NewPaymentIncident) -> StoreResult<PaymentIncident>;
  async fn list_payment_incidents(&self) -> StoreResult<Vec<PaymentIncident>>;
}

#[async_trait]
pub trait StoreTx: Send {
  /// Locks the given product rows for update, in ascending id order, and
  /// returns the counters of those that exist.
  async fn lock_stock(&mut self, product_ids: &[Uuid]) -> StoreResult<Vec<StockLevel>>;
  /// Overwrites the counters of a row previously locked with `lock_stock`.
  async fn write_stock(&mut self, level: StockLevel) -> StoreResult<()>;

  /// Serialises checkouts sharing `(buyer_id, key)` until this transaction ends.
  async fn lock_idempotency_key(&mut self, buyer_id: Uuid, key: &str) -> StoreResult<()>;
  async fn find_order_by_key(&mut self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> StoreResult<Option<Order>>;
  async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order>;
  async fn lock_order(&mut self, id: Uuid) -> StoreResult<Option<Order>>;
  async fn write_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order>;

  async fn find_category(&mut self, id: Uuid) -> StoreResult<Option<Category>>;
  async fn insert_category(&mut self, category: &NewCategory) -> StoreResult<Category>;
  /// Overwrites the name and slug of an existing category.
  async fn update_category(&mut self, category: &Category) -> StoreResult<Category>;
  async fn count_products_in_category(&mut self, category_id: Uuid) -> StoreResult<i64>;
  /// Moves every product of `from` into `to`; returns how many moved.
  async fn reassign_products(&mut self, from: Uuid, to: Uuid) -> StoreResult<u64>;
  async fn delete_category(&mut self, id: Uuid) -> StoreResult<bool>;

  async fn slug_taken(&mut self, slug: &str) -> StoreResult<bool>;
  async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product>;
  /// Locks one product row for update.
  async fn lock_product(&mut self, id: Uuid) -> StoreResult<Option<Product>>;
  /// Writes the descriptive columns of a locked product. The stock counters
  /// are left alone; they only move through `write_stock`.
  async fn write_product(&mut self, product: &Product) -> StoreResult<Product>;
  /// Whether any order line points at the product.
  async fn product_has_orders(&mut self, id: Uuid) -> StoreResult<bool>;
  async fn delete_product(&mut self, id: Uuid) -> StoreResult<bool>;

  async fn commit(self) -> StoreResult<()>;
}
