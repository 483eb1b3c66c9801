// core/src/models/product.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::Category;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  pub slug: String,
  pub description: String,
  pub price: Decimal,
  /// Units available for sale. Never negative.
  pub quantity: i32,
  /// Units sold so far. Only ever grows.
  pub sold: i32,
  pub category_id: Uuid,
  pub photo_path: Option<String>,
  pub shipping: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// One row of a catalog search page.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
  pub id: Uuid,
  pub name: String,
  pub slug: String,
  pub description: String,
  pub price: Decimal,
  pub quantity: i32,
  pub sold: i32,
  pub shipping: bool,
  pub category_id: Uuid,
  pub category_name: String,
  pub photo_path: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl ProductSummary {
  pub fn from_product(product: &Product, category_name: &str) -> Self {
    Self {
      id: product.id,
      name: product.name.clone(),
      slug: product.slug.clone(),
      description: product.description.clone(),
      price: product.price,
      quantity: product.quantity,
      sold: product.sold,
      shipping: product.shipping,
      category_id: product.category_id,
      category_name: category_name.to_string(),
      photo_path: product.photo_path.clone(),
      created_at: product.created_at,
    }
  }
}

/// A product together with its category, as served by the product page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
  #[serde(flatten)]
  pub product: Product,
  pub category: Category,
}

/// Validated input for inserting a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
  pub name: String,
  pub slug: String,
  pub description: String,
  pub price: Decimal,
  pub quantity: i32,
  pub category_id: Uuid,
  pub photo_path: Option<String>,
  pub shipping: bool,
}

/// The inventory counters of one product, as seen under a row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
  pub product_id: Uuid,
  pub quantity: i32,
  pub sold: i32,
}
