// app/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use storefront::models::OrderStatus;
use storefront::Store;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::Result;
use crate::state::AppState;

pub async fn get_order_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse> {
  let order = app_state.orders.find_order(path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[derive(Deserialize, Debug)]
pub struct StatusPayload {
  pub status: OrderStatus,
}

#[instrument(name = "handler::update_order_status", skip(app_state, path), fields(order_id = %path.as_ref()))]
pub async fn update_order_status_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
  payload: web::Json<StatusPayload>,
) -> Result<HttpResponse> {
  let order = app_state
    .orders
    .update_status(path.into_inner(), payload.status)
    .await?;
  Ok(HttpResponse::Ok().json(order))
}

pub async fn buyer_orders_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse> {
  let orders = app_state.orders.orders_for_buyer(path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

pub async fn payment_incidents_handler<S: Store>(app_state: web::Data<AppState<S>>) -> Result<HttpResponse> {
  let incidents = app_state.orders.payment_incidents().await?;
  Ok(HttpResponse::Ok().json(json!({ "incidents": incidents })))
}
