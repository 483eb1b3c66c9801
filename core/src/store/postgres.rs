// core/src/store/postgres.rs

//! PostgreSQL [`Store`] over a `PgPool`.
//!
//! Inventory rows are locked with `SELECT ... FOR UPDATE` in ascending id
//! order. Checkouts sharing an idempotency key are serialised with a
//! transaction-scoped advisory lock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::catalog::CatalogQuery;
use crate::error::{StoreError, StoreResult};
use crate::models::{
  Buyer, Category, NewBuyer, NewCategory, NewOrder, NewPaymentIncident, NewProduct, Order, OrderLine, OrderStatus,
  PaymentIncident, Product, ProductDetail, ProductSummary, StockLevel,
};

const PRODUCT_COLUMNS: &str =
  "id, name, slug, description, price, quantity, sold, category_id, photo_path, shipping, created_at, updated_at";

const SUMMARY_SELECT: &str = "SELECT p.id, p.name, p.slug, p.description, p.price, p.quantity, p.sold, p.shipping, \
   p.category_id, c.name AS category_name, p.photo_path, p.created_at \
   FROM products p JOIN categories c ON c.id = p.category_id";

const ORDER_COLUMNS: &str = "id, buyer_id, status, total, currency, payment, payment_transaction_id, \
   idempotency_key, cart_fingerprint, created_at, updated_at";

const BUYER_COLUMNS: &str = "id, name, email, address, role, created_at, updated_at";

const INCIDENT_COLUMNS: &str = "id, buyer_id, idempotency_key, amount, transaction_id, kind, detail, created_at";

#[derive(FromRow)]
struct OrderRow {
  id: Uuid,
  buyer_id: Uuid,
  status: OrderStatus,
  total: Decimal,
  currency: String,
  payment: serde_json::Value,
  payment_transaction_id: String,
  idempotency_key: String,
  cart_fingerprint: Uuid,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl OrderRow {
  fn into_order(self, lines: Vec<OrderLine>) -> Order {
    Order {
      id: self.id,
      buyer_id: self.buyer_id,
      status: self.status,
      lines,
      total: self.total,
      currency: self.currency,
      payment: self.payment,
      payment_transaction_id: self.payment_transaction_id,
      idempotency_key: self.idempotency_key,
      cart_fingerprint: self.cart_fingerprint,
      created_at: self.created_at,
      updated_at: self.updated_at,
    }
  }
}

#[derive(FromRow)]
struct LineRow {
  order_id: Uuid,
  #[sqlx(flatten)]
  line: OrderLine,
}

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .acquire_timeout(Duration::from_secs(5))
      .connect(database_url)
      .await?;
    Ok(Self::new(pool))
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  /// Applies the bundled migrations.
  pub async fn migrate(&self) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    Ok(())
  }
}

pub struct PgTx {
  tx: Transaction<'static, Postgres>,
}

/// Appends the filter predicates. Assumes the builder already ends in a
/// `WHERE TRUE` over `products p`.
fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, query: &CatalogQuery) {
  let f = &query.filter;
  if !f.categories.is_empty() {
    qb.push(" AND p.category_id = ANY(").push_bind(f.categories.clone()).push(")");
  }
  if let Some(min) = f.price_min {
    qb.push(" AND p.price >= ").push_bind(min);
  }
  if let Some(max) = f.price_max {
    qb.push(" AND p.price <= ").push_bind(max);
  }
  if let Some(pattern) = query.like_contains() {
    qb.push(" AND (p.name ILIKE ")
      .push_bind(pattern.clone())
      .push(" ESCAPE '\\' OR p.description ILIKE ")
      .push_bind(pattern)
      .push(" ESCAPE '\\')");
  }
}

async fn attach_lines(conn: &mut PgConnection, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
  if rows.is_empty() {
    return Ok(Vec::new());
  }
  let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
  let lines: Vec<LineRow> = sqlx::query_as(
    "SELECT order_id, product_id, product_name, quantity, unit_price FROM order_lines \
     WHERE order_id = ANY($1) ORDER BY order_id, position",
  )
  .bind(&ids)
  .fetch_all(&mut *conn)
  .await?;

  let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
  for row in lines {
    by_order.entry(row.order_id).or_default().push(row.line);
  }
  Ok(
    rows
      .into_iter()
      .map(|r| {
        let lines = by_order.remove(&r.id).unwrap_or_default();
        r.into_order(lines)
      })
      .collect(),
  )
}

async fn load_order(conn: &mut PgConnection, row: Option<OrderRow>) -> StoreResult<Option<Order>> {
  match row {
    Some(row) => Ok(attach_lines(conn, vec![row]).await?.pop()),
    None => Ok(None),
  }
}

async fn order_by_key(
  conn: &mut PgConnection,
  buyer_id: Uuid,
  key: &str,
  since: DateTime<Utc>,
) -> StoreResult<Option<Order>> {
  let row: Option<OrderRow> = sqlx::query_as(&format!(
    "SELECT {} FROM orders WHERE buyer_id = $1 AND idempotency_key = $2 AND created_at >= $3 \
     ORDER BY created_at DESC LIMIT 1",
    ORDER_COLUMNS
  ))
  .bind(buyer_id)
  .bind(key)
  .bind(since)
  .fetch_optional(&mut *conn)
  .await?;
  load_order(conn, row).await
}

#[async_trait]
impl Store for PgStore {
  type Tx = PgTx;

  async fn begin(&self) -> StoreResult<PgTx> {
    Ok(PgTx {
      tx: self.pool.begin().await?,
    })
  }

  #[instrument(name = "pg::search_products", skip_all, fields(page = query.page, page_size = query.page_size))]
  async fn search_products(&self, query: &CatalogQuery) -> StoreResult<(Vec<ProductSummary>, i64)> {
    // Count and page come from one snapshot so `total` agrees with the rows.
    let mut tx = self.pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
      .execute(&mut *tx)
      .await?;

    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM products p WHERE TRUE");
    push_filters(&mut count_qb, query);
    let total: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;

    let mut page_qb = QueryBuilder::new(SUMMARY_SELECT);
    page_qb.push(" WHERE TRUE");
    push_filters(&mut page_qb, query);
    page_qb.push(" ORDER BY ");
    if let (Some(prefix), Some(contains)) = (query.like_prefix(), query.like_contains()) {
      page_qb
        .push("CASE WHEN p.name ILIKE ")
        .push_bind(prefix)
        .push(" ESCAPE '\\' THEN 0 WHEN p.name ILIKE ")
        .push_bind(contains)
        .push(" ESCAPE '\\' THEN 1 ELSE 2 END, ");
    }
    page_qb
      .push("p.created_at DESC, p.id DESC LIMIT ")
      .push_bind(query.limit())
      .push(" OFFSET ")
      .push_bind(query.offset());
    let products: Vec<ProductSummary> = page_qb.build_query_as().fetch_all(&mut *tx).await?;

    tx.commit().await?;
    debug!(total, rows = products.len(), "Search executed.");
    Ok((products, total))
  }

  async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
    Ok(
      sqlx::query_as(&format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn find_product_by_slug(&self, slug: &str) -> StoreResult<Option<ProductDetail>> {
    let product: Option<Product> = sqlx::query_as(&format!("SELECT {} FROM products WHERE slug = $1", PRODUCT_COLUMNS))
      .bind(slug)
      .fetch_optional(&self.pool)
      .await?;
    let Some(product) = product else {
      return Ok(None);
    };
    let category: Category = sqlx::query_as("SELECT id, name, slug FROM categories WHERE id = $1")
      .bind(product.category_id)
      .fetch_one(&self.pool)
      .await?;
    Ok(Some(ProductDetail { product, category }))
  }

  async fn find_products(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
    Ok(
      sqlx::query_as(&format!("SELECT {} FROM products WHERE id = ANY($1)", PRODUCT_COLUMNS))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?,
    )
  }

  async fn products_in_category(
    &self,
    category_id: Uuid,
    exclude: Option<Uuid>,
    limit: i64,
  ) -> StoreResult<Vec<ProductSummary>> {
    Ok(
      sqlx::query_as(&format!(
        "{} WHERE p.category_id = $1 AND ($2::uuid IS NULL OR p.id <> $2) \
         ORDER BY p.created_at DESC, p.id DESC LIMIT $3",
        SUMMARY_SELECT
      ))
      .bind(category_id)
      .bind(exclude)
      .bind(limit)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn count_products(&self) -> StoreResult<i64> {
    Ok(
      sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&self.pool)
        .await?,
    )
  }

  async fn list_categories(&self) -> StoreResult<Vec<Category>> {
    Ok(
      sqlx::query_as("SELECT id, name, slug FROM categories ORDER BY name")
        .fetch_all(&self.pool)
        .await?,
    )
  }

  async fn find_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
    Ok(
      sqlx::query_as("SELECT id, name, slug FROM categories WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn find_buyer(&self, id: Uuid) -> StoreResult<Option<Buyer>> {
    Ok(
      sqlx::query_as(&format!("SELECT {} FROM buyers WHERE id = $1", BUYER_COLUMNS))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn insert_buyer(&self, buyer: &NewBuyer) -> StoreResult<Buyer> {
    Ok(
      sqlx::query_as(&format!(
        "INSERT INTO buyers (id, name, email, address, role) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        BUYER_COLUMNS
      ))
      .bind(Uuid::new_v4())
      .bind(&buyer.name)
      .bind(&buyer.email)
      .bind(&buyer.address)
      .bind(buyer.role)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
    let mut conn = self.pool.acquire().await?;
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
      .bind(id)
      .fetch_optional(&mut *conn)
      .await?;
    load_order(&mut conn, row).await
  }

  async fn find_order_by_key(&self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> StoreResult<Option<Order>> {
    let mut conn = self.pool.acquire().await?;
    order_by_key(&mut conn, buyer_id, key, since).await
  }

  async fn orders_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<Order>> {
    let mut conn = self.pool.acquire().await?;
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, id DESC",
      ORDER_COLUMNS
    ))
    .bind(buyer_id)
    .fetch_all(&mut *conn)
    .await?;
    attach_lines(&mut conn, rows).await
  }

  async fn insert_payment_incident(&self, incident: &NewPaymentIncident) -> StoreResult<PaymentIncident> {
    Ok(
      sqlx::query_as(&format!(
        "INSERT INTO payment_incidents (id, buyer_id, idempotency_key, amount, transaction_id, kind, detail) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
        INCIDENT_COLUMNS
      ))
      .bind(Uuid::new_v4())
      .bind(incident.buyer_id)
      .bind(&incident.idempotency_key)
      .bind(incident.amount)
      .bind(&incident.transaction_id)
      .bind(incident.kind)
      .bind(&incident.detail)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn list_payment_incidents(&self) -> StoreResult<Vec<PaymentIncident>> {
    Ok(
      sqlx::query_as(&format!(
        "SELECT {} FROM payment_incidents ORDER BY created_at DESC",
        INCIDENT_COLUMNS
      ))
      .fetch_all(&self.pool)
      .await?,
    )
  }
}

#[async_trait]
impl StoreTx for PgTx {
  async fn lock_stock(&mut self, product_ids: &[Uuid]) -> StoreResult<Vec<StockLevel>> {
    Ok(
      sqlx::query_as(
        "SELECT id AS product_id, quantity, sold FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
      )
      .bind(product_ids)
      .fetch_all(&mut *self.tx)
      .await?,
    )
  }

  async fn write_stock(&mut self, level: StockLevel) -> StoreResult<()> {
    let result = sqlx::query("UPDATE products SET quantity = $2, sold = $3, updated_at = now() WHERE id = $1")
      .bind(level.product_id)
      .bind(level.quantity)
      .bind(level.sold)
      .execute(&mut *self.tx)
      .await?;
    if result.rows_affected() == 0 {
      return Err(StoreError::Corrupt(format!(
        "stock write for missing product {}",
        level.product_id
      )));
    }
    Ok(())
  }

  async fn lock_idempotency_key(&mut self, buyer_id: Uuid, key: &str) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
      .bind(format!("{}:{}", buyer_id, key))
      .execute(&mut *self.tx)
      .await?;
    Ok(())
  }

  async fn find_order_by_key(&mut self, buyer_id: Uuid, key: &str, since: DateTime<Utc>) -> StoreResult<Option<Order>> {
    order_by_key(&mut self.tx, buyer_id, key, since).await
  }

  async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<Order> {
    let row: OrderRow = sqlx::query_as(&format!(
      "INSERT INTO orders (id, buyer_id, total, currency, payment, payment_transaction_id, idempotency_key, \
       cart_fingerprint) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(order.buyer_id)
    .bind(order.total)
    .bind(&order.currency)
    .bind(&order.payment)
    .bind(&order.payment_transaction_id)
    .bind(&order.idempotency_key)
    .bind(order.cart_fingerprint)
    .fetch_one(&mut *self.tx)
    .await?;

    if !order.lines.is_empty() {
      let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO order_lines (order_id, position, product_id, product_name, quantity, unit_price) ");
      qb.push_values(order.lines.iter().enumerate(), |mut b, (position, line)| {
        b.push_bind(order.id)
          .push_bind(position as i32)
          .push_bind(line.product_id)
          .push_bind(&line.product_name)
          .push_bind(line.quantity)
          .push_bind(line.unit_price);
      });
      qb.build().execute(&mut *self.tx).await?;
    }

    let lines = order
      .lines
      .iter()
      .map(|l| OrderLine {
        product_id: l.product_id,
        product_name: l.product_name.clone(),
        quantity: l.quantity,
        unit_price: l.unit_price,
      })
      .collect();
    Ok(row.into_order(lines))
  }

  async fn lock_order(&mut self, id: Uuid) -> StoreResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS))
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await?;
    load_order(&mut self.tx, row).await
  }

  async fn write_order_status(&mut self, id: Uuid, status: OrderStatus) -> StoreResult<Order> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(&mut *self.tx)
    .await?;
    load_order(&mut self.tx, row)
      .await?
      .ok_or_else(|| StoreError::Corrupt(format!("status write for missing order {}", id)))
  }

  async fn find_category(&mut self, id: Uuid) -> StoreResult<Option<Category>> {
    Ok(
      sqlx::query_as("SELECT id, name, slug FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?,
    )
  }

  async fn insert_category(&mut self, category: &NewCategory) -> StoreResult<Category> {
    Ok(
      sqlx::query_as("INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3) RETURNING id, name, slug")
        .bind(Uuid::new_v4())
        .bind(&category.name)
        .bind(&category.slug)
        .fetch_one(&mut *self.tx)
        .await?,
    )
  }

  async fn update_category(&mut self, category: &Category) -> StoreResult<Category> {
    let row: Option<Category> =
      sqlx::query_as("UPDATE categories SET name = $2, slug = $3 WHERE id = $1 RETURNING id, name, slug")
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.slug)
        .fetch_optional(&mut *self.tx)
        .await?;
    row.ok_or_else(|| StoreError::Corrupt(format!("update for missing category {}", category.id)))
  }

  async fn count_products_in_category(&mut self, category_id: Uuid) -> StoreResult<i64> {
    Ok(
      sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = $1")
        .bind(category_id)
        .fetch_one(&mut *self.tx)
        .await?,
    )
  }

  async fn reassign_products(&mut self, from: Uuid, to: Uuid) -> StoreResult<u64> {
    let result = sqlx::query("UPDATE products SET category_id = $2, updated_at = now() WHERE category_id = $1")
      .bind(from)
      .bind(to)
      .execute(&mut *self.tx)
      .await?;
    Ok(result.rows_affected())
  }

  async fn delete_category(&mut self, id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
      .bind(id)
      .execute(&mut *self.tx)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn slug_taken(&mut self, slug: &str) -> StoreResult<bool> {
    Ok(
      sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1)")
        .bind(slug)
        .fetch_one(&mut *self.tx)
        .await?,
    )
  }

  async fn insert_product(&mut self, product: &NewProduct) -> StoreResult<Product> {
    Ok(
      sqlx::query_as(&format!(
        "INSERT INTO products (id, name, slug, description, price, quantity, sold, category_id, photo_path, shipping) \
         VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9) RETURNING {}",
        PRODUCT_COLUMNS
      ))
      .bind(Uuid::new_v4())
      .bind(&product.name)
      .bind(&product.slug)
      .bind(&product.description)
      .bind(product.price)
      .bind(product.quantity)
      .bind(product.category_id)
      .bind(&product.photo_path)
      .bind(product.shipping)
      .fetch_one(&mut *self.tx)
      .await?,
    )
  }

  async fn lock_product(&mut self, id: Uuid) -> StoreResult<Option<Product>> {
    Ok(
      sqlx::query_as(&format!("SELECT {} FROM products WHERE id = $1 FOR UPDATE", PRODUCT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?,
    )
  }

  async fn write_product(&mut self, product: &Product) -> StoreResult<Product> {
    let row: Option<Product> = sqlx::query_as(&format!(
      "UPDATE products SET name = $2, slug = $3, description = $4, price = $5, category_id = $6, \
       photo_path = $7, shipping = $8, updated_at = now() WHERE id = $1 RETURNING {}",
      PRODUCT_COLUMNS
    ))
    .bind(product.id)
    .bind(&product.name)
    .bind(&product.slug)
    .bind(&product.description)
    .bind(product.price)
    .bind(product.category_id)
    .bind(&product.photo_path)
    .bind(product.shipping)
    .fetch_optional(&mut *self.tx)
    .await?;
    row.ok_or_else(|| StoreError::Corrupt(format!("update for missing product {}", product.id)))
  }

  async fn product_has_orders(&mut self, id: Uuid) -> StoreResult<bool> {
    Ok(
      sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM order_lines WHERE product_id = $1)")
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?,
    )
  }

  async fn delete_product(&mut self, id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
      .bind(id)
      .execute(&mut *self.tx)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn commit(self) -> StoreResult<()> {
    self.tx.commit().await?;
    Ok(())
  }
}
