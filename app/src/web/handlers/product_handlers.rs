// app/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use storefront::{CatalogError, NewProductInput, PageRequest, ProductFilter, ProductUpdate, Store};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::state::AppState;

/// Query string of `GET /products`. `category` is a comma-separated id list.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
  pub category: Option<String>,
  pub price_min: Option<Decimal>,
  pub price_max: Option<Decimal>,
  pub keyword: Option<String>,
  pub page: Option<i64>,
  pub page_size: Option<i64>,
}

impl SearchParams {
  fn into_parts(self) -> Result<(ProductFilter, PageRequest), CatalogError> {
    let mut categories = Vec::new();
    for raw in self.category.iter().flat_map(|c| c.split(',')) {
      let raw = raw.trim();
      if raw.is_empty() {
        continue;
      }
      let id = Uuid::parse_str(raw).map_err(|_| CatalogError::InvalidFilter(format!("'{}' is not a category id", raw)))?;
      categories.push(id);
    }
    Ok((
      ProductFilter {
        categories,
        price_min: self.price_min,
        price_max: self.price_max,
        keyword: self.keyword,
      },
      PageRequest {
        page: self.page,
        page_size: self.page_size,
      },
    ))
  }
}

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  query_params: web::Query<SearchParams>,
) -> Result<HttpResponse> {
  let (filter, page) = query_params.into_inner().into_parts()?;
  let result = app_state.catalog.search(filter, page).await?;
  Ok(HttpResponse::Ok().json(result))
}

pub async fn count_products_handler<S: Store>(app_state: web::Data<AppState<S>>) -> Result<HttpResponse> {
  let total = app_state.catalog.count_products().await?;
  Ok(HttpResponse::Ok().json(json!({ "total": total })))
}

#[instrument(name = "handler::get_product", skip(app_state, path), fields(slug = %path.as_ref()))]
pub async fn get_product_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<String>,
) -> Result<HttpResponse> {
  let detail = app_state.catalog.product_by_slug(&path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(detail))
}

#[derive(Deserialize, Debug)]
pub struct RelatedParams {
  pub limit: Option<i64>,
}

pub async fn related_products_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
  query_params: web::Query<RelatedParams>,
) -> Result<HttpResponse> {
  let related = app_state
    .catalog
    .related_products(path.into_inner(), query_params.limit)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "products": related })))
}

#[instrument(name = "handler::create_product", skip(app_state, payload), fields(name = %payload.name))]
pub async fn create_product_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  payload: web::Json<NewProductInput>,
) -> Result<HttpResponse> {
  let product = app_state.catalog.create_product(payload.into_inner()).await?;
  info!(product_id = %product.id, "Product created via API.");
  Ok(HttpResponse::Created().json(product))
}

#[instrument(name = "handler::update_product", skip(app_state, path, payload), fields(product_id = %path.as_ref()))]
pub async fn update_product_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
  payload: web::Json<ProductUpdate>,
) -> Result<HttpResponse> {
  let product = app_state
    .catalog
    .update_product(path.into_inner(), payload.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(product))
}

#[instrument(name = "handler::delete_product", skip(app_state, path), fields(product_id = %path.as_ref()))]
pub async fn delete_product_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse> {
  let removed = app_state.catalog.delete_product(path.into_inner()).await?;
  info!(product_id = %removed.id, "Product deleted via API.");
  Ok(HttpResponse::Ok().json(json!({ "deleted": removed })))
}

/// Body of `PUT /products/{id}/stock`: exactly one of the two fields.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdate {
  pub quantity: Option<i32>,
  pub delta: Option<i32>,
}

#[instrument(name = "handler::update_stock", skip(app_state, path), fields(product_id = %path.as_ref()))]
pub async fn update_stock_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
  payload: web::Json<StockUpdate>,
) -> Result<HttpResponse> {
  let product_id = path.into_inner();
  let level = match (payload.quantity, payload.delta) {
    (Some(quantity), None) => app_state.ledger.set_stock(product_id, quantity).await?,
    (None, Some(delta)) => app_state.ledger.restock(product_id, delta).await?,
    _ => {
      return Err(AppError::Validation(
        "Provide exactly one of 'quantity' or 'delta'".to_string(),
      ))
    }
  };
  Ok(HttpResponse::Ok().json(level))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn category_list_is_split_and_validated() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let params = SearchParams {
      category: Some(format!("{}, {},", a, b)),
      ..Default::default()
    };
    let (filter, _) = params.into_parts().unwrap();
    assert_eq!(filter.categories, vec![a, b]);

    let bad = SearchParams {
      category: Some("books".into()),
      ..Default::default()
    };
    assert!(matches!(bad.into_parts(), Err(CatalogError::InvalidFilter(_))));
  }
}
