// core/src/catalog/mod.rs

//! Catalog Query Engine and catalog maintenance.
//!
//! Searches are read-only and always hit the store, so the stock figures on a
//! result page are the latest committed ones.

pub mod query;
pub mod slug;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::CatalogError;
use crate::models::{Category, NewCategory, NewProduct, Product, ProductDetail, ProductSummary};
use crate::store::{Store, StoreTx};

pub use query::{escape_like, CatalogQuery, PageRequest, ProductFilter, ProductPage};
pub use slug::slugify;

const MAX_NAME_LEN: usize = 160;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_CATEGORY_NAME_LEN: usize = 32;
const DEFAULT_RELATED_LIMIT: i64 = 4;

#[derive(Debug, Clone)]
pub struct CatalogSettings {
  pub default_page_size: i64,
  /// Upper bound on any page, so no request can ask for an unbounded scan.
  pub max_page_size: i64,
}

impl Default for CatalogSettings {
  fn default() -> Self {
    Self {
      default_page_size: 12,
      max_page_size: 100,
    }
  }
}

/// Admin input for a new product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProductInput {
  pub name: String,
  pub description: String,
  pub price: Decimal,
  pub quantity: i32,
  pub category_id: Uuid,
  #[serde(default)]
  pub shipping: bool,
  pub photo_path: Option<String>,
}

/// Admin edit of an existing product. Absent fields keep their value. Stock is
/// not editable here; it moves through the inventory ledger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
  pub name: Option<String>,
  pub description: Option<String>,
  pub price: Option<Decimal>,
  pub category_id: Option<Uuid>,
  pub shipping: Option<bool>,
  pub photo_path: Option<String>,
}

/// A category and one page of its products.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProducts {
  pub category: Category,
  #[serde(flatten)]
  pub page: ProductPage,
}

#[derive(Clone)]
pub struct CatalogService<S: Store> {
  store: S,
  settings: CatalogSettings,
}

impl<S: Store> CatalogService<S> {
  pub fn new(store: S, settings: CatalogSettings) -> Self {
    Self { store, settings }
  }

  pub fn settings(&self) -> &CatalogSettings {
    &self.settings
  }

  /// Filtered, paginated search. `total` counts every match, not just the page.
  #[instrument(name = "catalog::search", skip(self), err(Display))]
  pub async fn search(&self, filter: ProductFilter, page: PageRequest) -> Result<ProductPage, CatalogError> {
    let query = CatalogQuery::build(filter, page, &self.settings)?;
    let (products, total) = self.store.search_products(&query).await?;
    info!(total, returned = products.len(), page = query.page, "Catalog search finished.");
    Ok(ProductPage {
      products,
      total,
      page: query.page,
      page_size: query.page_size,
    })
  }

  #[instrument(name = "catalog::product_by_slug", skip(self))]
  pub async fn product_by_slug(&self, slug: &str) -> Result<ProductDetail, CatalogError> {
    self
      .store
      .find_product_by_slug(slug)
      .await?
      .ok_or_else(|| CatalogError::NotFound(format!("Product '{}' not found", slug)))
  }

  /// Other products of the same category, newest first.
  #[instrument(name = "catalog::related_products", skip(self))]
  pub async fn related_products(&self, product_id: Uuid, limit: Option<i64>) -> Result<Vec<ProductSummary>, CatalogError> {
    let product = self
      .store
      .find_product(product_id)
      .await?
      .ok_or_else(|| CatalogError::NotFound(format!("Product {} not found", product_id)))?;
    let limit = limit.unwrap_or(DEFAULT_RELATED_LIMIT).clamp(1, self.settings.max_page_size);
    Ok(
      self
        .store
        .products_in_category(product.category_id, Some(product.id), limit)
        .await?,
    )
  }

  pub async fn count_products(&self) -> Result<i64, CatalogError> {
    Ok(self.store.count_products().await?)
  }

  pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
    Ok(self.store.list_categories().await?)
  }

  #[instrument(name = "catalog::create_category", skip(self), err(Display))]
  pub async fn create_category(&self, name: &str) -> Result<Category, CatalogError> {
    let (name, slug) = category_name_and_slug(name)?;
    let mut tx = self.store.begin().await?;
    let category = tx.insert_category(&NewCategory { name, slug }).await?;
    tx.commit().await?;
    info!(category_id = %category.id, "Category created.");
    Ok(category)
  }

  /// Renames a category; its slug follows the new name.
  #[instrument(name = "catalog::rename_category", skip(self), err(Display))]
  pub async fn rename_category(&self, id: Uuid, name: &str) -> Result<Category, CatalogError> {
    let (name, slug) = category_name_and_slug(name)?;
    let mut tx = self.store.begin().await?;
    let Some(current) = tx.find_category(id).await? else {
      return Err(CatalogError::NotFound(format!("Category {} not found", id)));
    };
    let category = tx.update_category(&Category { name, slug, ..current }).await?;
    tx.commit().await?;
    info!(category_id = %id, slug = %category.slug, "Category renamed.");
    Ok(category)
  }

  /// The category behind `slug` with one page of its products, newest first.
  #[instrument(name = "catalog::category_by_slug", skip(self))]
  pub async fn category_by_slug(&self, slug: &str, page: PageRequest) -> Result<CategoryProducts, CatalogError> {
    let category = self
      .store
      .find_category_by_slug(slug)
      .await?
      .ok_or_else(|| CatalogError::NotFound(format!("Category '{}' not found", slug)))?;
    let filter = ProductFilter {
      categories: vec![category.id],
      ..ProductFilter::default()
    };
    let page = self.search(filter, page).await?;
    Ok(CategoryProducts { category, page })
  }

  /// Deletes a category. Products are never deleted along with it: a category
  /// that still owns products needs `reassign_to`, and the move plus the
  /// delete commit together.
  #[instrument(name = "catalog::delete_category", skip(self), err(Display))]
  pub async fn delete_category(&self, id: Uuid, reassign_to: Option<Uuid>) -> Result<u64, CatalogError> {
    if reassign_to == Some(id) {
      return Err(CatalogError::Validation(
        "Cannot reassign products to the category being deleted".to_string(),
      ));
    }

    let mut tx = self.store.begin().await?;
    if tx.find_category(id).await?.is_none() {
      return Err(CatalogError::NotFound(format!("Category {} not found", id)));
    }

    let product_count = tx.count_products_in_category(id).await?;
    let mut moved = 0;
    if product_count > 0 {
      let Some(target) = reassign_to else {
        warn!(category_id = %id, product_count, "Refusing to delete a category that still owns products.");
        return Err(CatalogError::CategoryInUse {
          category_id: id,
          product_count,
        });
      };
      if tx.find_category(target).await?.is_none() {
        return Err(CatalogError::NotFound(format!("Category {} not found", target)));
      }
      moved = tx.reassign_products(id, target).await?;
    }

    tx.delete_category(id).await?;
    tx.commit().await?;
    info!(category_id = %id, moved, "Category deleted.");
    Ok(moved)
  }

  /// Creates a product with a slug derived from its name, suffixed `-1`, `-2`,
  /// ... until unique. New products start with `sold = 0`.
  #[instrument(name = "catalog::create_product", skip(self, input), fields(name = %input.name), err(Display))]
  pub async fn create_product(&self, input: NewProductInput) -> Result<Product, CatalogError> {
    let new_product = validate_product(input)?;

    let mut tx = self.store.begin().await?;
    if tx.find_category(new_product.category_id).await?.is_none() {
      return Err(CatalogError::NotFound(format!(
        "Category {} not found",
        new_product.category_id
      )));
    }

    let slug = unique_product_slug(&mut tx, &new_product.name, None).await?;
    let product = tx.insert_product(&NewProduct { slug, ..new_product }).await?;
    tx.commit().await?;
    info!(product_id = %product.id, slug = %product.slug, "Product created.");
    Ok(product)
  }

  /// Edits the descriptive fields of a product. A new name gets a new slug.
  /// Orders already placed keep the name and price they were sold at.
  #[instrument(name = "catalog::update_product", skip(self, update), err(Display))]
  pub async fn update_product(&self, id: Uuid, update: ProductUpdate) -> Result<Product, CatalogError> {
    let mut tx = self.store.begin().await?;
    let Some(mut product) = tx.lock_product(id).await? else {
      return Err(CatalogError::NotFound(format!("Product {} not found", id)));
    };

    if let Some(name) = update.name {
      let name = validate_name(&name)?;
      if name != product.name {
        product.slug = unique_product_slug(&mut tx, &name, Some(product.slug.as_str())).await?;
        product.name = name;
      }
    }
    if let Some(description) = update.description {
      product.description = validate_description(&description)?;
    }
    if let Some(price) = update.price {
      product.price = validate_price(price)?;
    }
    if let Some(category_id) = update.category_id {
      if tx.find_category(category_id).await?.is_none() {
        return Err(CatalogError::NotFound(format!("Category {} not found", category_id)));
      }
      product.category_id = category_id;
    }
    if let Some(shipping) = update.shipping {
      product.shipping = shipping;
    }
    if let Some(photo_path) = update.photo_path {
      product.photo_path = Some(photo_path);
    }

    let product = tx.write_product(&product).await?;
    tx.commit().await?;
    info!(product_id = %id, slug = %product.slug, "Product updated.");
    Ok(product)
  }

  /// Deletes a product nobody has ordered. Ordered products stay, since their
  /// order lines still point at them.
  #[instrument(name = "catalog::delete_product", skip(self), err(Display))]
  pub async fn delete_product(&self, id: Uuid) -> Result<Product, CatalogError> {
    let mut tx = self.store.begin().await?;
    let Some(product) = tx.lock_product(id).await? else {
      return Err(CatalogError::NotFound(format!("Product {} not found", id)));
    };
    if tx.product_has_orders(id).await? {
      warn!(product_id = %id, "Refusing to delete a product that has been ordered.");
      return Err(CatalogError::ProductOrdered { product_id: id });
    }
    tx.delete_product(id).await?;
    tx.commit().await?;
    info!(product_id = %id, "Product deleted.");
    Ok(product)
  }
}

/// Slug for `name`, suffixed `-1`, `-2`, ... until no other product has it.
/// `own` is the product's current slug, which it may keep.
async fn unique_product_slug<T: StoreTx>(tx: &mut T, name: &str, own: Option<&str>) -> Result<String, CatalogError> {
  let base = match slugify(name) {
    s if s.is_empty() => "product".to_string(),
    s => s,
  };
  let mut slug = base.clone();
  let mut counter = 1;
  while Some(slug.as_str()) != own && tx.slug_taken(&slug).await? {
    slug = format!("{}-{}", base, counter);
    counter += 1;
  }
  Ok(slug)
}

fn category_name_and_slug(name: &str) -> Result<(String, String), CatalogError> {
  let name = name.trim();
  if name.is_empty() || name.chars().count() > MAX_CATEGORY_NAME_LEN {
    return Err(CatalogError::Validation(format!(
      "Category name must be 1 to {} characters",
      MAX_CATEGORY_NAME_LEN
    )));
  }
  let slug = slugify(name);
  if slug.is_empty() {
    return Err(CatalogError::Validation(
      "Category name must contain letters or digits".to_string(),
    ));
  }
  Ok((name.to_string(), slug))
}

fn validate_name(name: &str) -> Result<String, CatalogError> {
  let name = name.trim();
  if name.is_empty() {
    return Err(CatalogError::Validation("Product name is required".to_string()));
  }
  if name.chars().count() > MAX_NAME_LEN {
    return Err(CatalogError::Validation(format!(
      "Product name must be at most {} characters",
      MAX_NAME_LEN
    )));
  }
  Ok(name.to_string())
}

fn validate_description(description: &str) -> Result<String, CatalogError> {
  let description = description.trim();
  if description.is_empty() {
    return Err(CatalogError::Validation("Product description is required".to_string()));
  }
  if description.chars().count() > MAX_DESCRIPTION_LEN {
    return Err(CatalogError::Validation(format!(
      "Product description must be at most {} characters",
      MAX_DESCRIPTION_LEN
    )));
  }
  Ok(description.to_string())
}

fn validate_price(price: Decimal) -> Result<Decimal, CatalogError> {
  let price = price.normalize();
  if price <= Decimal::ZERO || price > Decimal::new(99_999_999, 2) {
    return Err(CatalogError::Validation(
      "Price must be greater than 0 and at most 999999.99".to_string(),
    ));
  }
  if price.scale() > 2 {
    return Err(CatalogError::Validation("Price has more than two decimal places".to_string()));
  }
  Ok(price)
}

fn validate_product(input: NewProductInput) -> Result<NewProduct, CatalogError> {
  let name = validate_name(&input.name)?;
  let description = validate_description(&input.description)?;
  let price = validate_price(input.price)?;
  if input.quantity < 0 {
    return Err(CatalogError::Validation("Quantity cannot be negative".to_string()));
  }

  Ok(NewProduct {
    name,
    slug: String::new(),
    description,
    price,
    quantity: input.quantity,
    category_id: input.category_id,
    photo_path: input.photo_path,
    shipping: input.shipping,
  })
}
