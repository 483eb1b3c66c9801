// app/src/web/handlers/category_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use storefront::{PageRequest, Store};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::Result;
use crate::state::AppState;

pub async fn list_categories_handler<S: Store>(app_state: web::Data<AppState<S>>) -> Result<HttpResponse> {
  let categories = app_state.catalog.list_categories().await?;
  Ok(HttpResponse::Ok().json(json!({ "categories": categories })))
}

#[derive(Deserialize, Debug)]
pub struct NewCategoryPayload {
  pub name: String,
}

#[instrument(name = "handler::create_category", skip(app_state))]
pub async fn create_category_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  payload: web::Json<NewCategoryPayload>,
) -> Result<HttpResponse> {
  let category = app_state.catalog.create_category(&payload.name).await?;
  Ok(HttpResponse::Created().json(category))
}

#[instrument(name = "handler::rename_category", skip(app_state, path), fields(category_id = %path.as_ref()))]
pub async fn rename_category_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
  payload: web::Json<NewCategoryPayload>,
) -> Result<HttpResponse> {
  let category = app_state
    .catalog
    .rename_category(path.into_inner(), &payload.name)
    .await?;
  Ok(HttpResponse::Ok().json(category))
}

#[instrument(name = "handler::category_by_slug", skip(app_state, path), fields(slug = %path.as_ref()))]
pub async fn category_by_slug_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<String>,
  query_params: web::Query<PageRequest>,
) -> Result<HttpResponse> {
  let found = app_state
    .catalog
    .category_by_slug(&path.into_inner(), query_params.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(found))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCategoryParams {
  pub reassign_to: Option<Uuid>,
}

#[instrument(name = "handler::delete_category", skip(app_state, path), fields(category_id = %path.as_ref()))]
pub async fn delete_category_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
  query_params: web::Query<DeleteCategoryParams>,
) -> Result<HttpResponse> {
  let category_id = path.into_inner();
  let moved = app_state
    .catalog
    .delete_category(category_id, query_params.reassign_to)
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "deleted": category_id,
    "reassignedProducts": moved,
  })))
}
