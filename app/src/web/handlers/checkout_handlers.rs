// app/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use storefront::{CheckoutRequest, Store};
use tracing::{error, info, instrument};

use crate::errors::{AppError, Result};
use crate::state::AppState;

/// `POST /checkout`. 201 with the new order, or 200 with the original order
/// when the request replays an earlier checkout.
#[instrument(
  name = "handler::checkout",
  skip(app_state, payload),
  fields(buyer_id = %payload.buyer_id)
)]
pub async fn checkout_handler<S: Store>(
  app_state: web::Data<AppState<S>>,
  payload: web::Json<CheckoutRequest>,
) -> Result<HttpResponse> {
  let workflow = app_state.workflow.clone();
  let request = payload.into_inner();

  // Once a payment may be authorized the workflow must reach its end (order or
  // void) even if the client hangs up, so it runs detached from this request.
  let outcome = tokio::spawn(async move { workflow.checkout_traced(request).await })
    .await
    .map_err(|e| {
      error!(error = %e, "Checkout task failed to complete.");
      AppError::Internal(format!("checkout task failed: {}", e))
    })?;

  let order = outcome.result?;
  info!(order_id = %order.id, replayed = outcome.replayed, "Checkout answered.");
  if outcome.replayed {
    Ok(HttpResponse::Ok().json(order))
  } else {
    Ok(HttpResponse::Created().json(order))
  }
}
