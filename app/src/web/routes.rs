// app/src/web/routes.rs

use actix_web::{error, web, HttpResponse};
use storefront::Store;

use crate::errors::AppError;
use crate::web::handlers::{category_handlers, checkout_handlers, order_handlers, product_handlers};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed JSON bodies and query strings get the same error body as
/// every other validation failure.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(
      web::JsonConfig::default()
        .error_handler(|err, _req| error::Error::from(AppError::Validation(err.to_string()))),
    )
    .app_data(
      web::QueryConfig::default()
        .error_handler(|err, _req| error::Error::from(AppError::Validation(err.to_string()))),
    )
    .app_data(
      web::PathConfig::default()
        .error_handler(|err, _req| error::Error::from(AppError::Validation(err.to_string()))),
    );
}

pub fn configure_app_routes<S: Store>(cfg: &mut web::ServiceConfig) {
  extractor_configs(cfg);
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler::<S>))
          .route("", web::post().to(product_handlers::create_product_handler::<S>))
          // Registered before `/{slug}` so "count" is not taken for a slug.
          .route("/count", web::get().to(product_handlers::count_products_handler::<S>))
          // One resource per path shape, so a method mismatch is a 405 and
          // never falls through to another handler.
          .service(
            web::resource("/{product}")
              .route(web::get().to(product_handlers::get_product_handler::<S>))
              .route(web::put().to(product_handlers::update_product_handler::<S>))
              .route(web::delete().to(product_handlers::delete_product_handler::<S>)),
          )
          .route(
            "/{product_id}/related",
            web::get().to(product_handlers::related_products_handler::<S>),
          )
          .route(
            "/{product_id}/stock",
            web::put().to(product_handlers::update_stock_handler::<S>),
          ),
      )
      .service(
        web::scope("/categories")
          .route("", web::get().to(category_handlers::list_categories_handler::<S>))
          .route("", web::post().to(category_handlers::create_category_handler::<S>))
          .service(
            web::resource("/{category}")
              .route(web::get().to(category_handlers::category_by_slug_handler::<S>))
              .route(web::put().to(category_handlers::rename_category_handler::<S>))
              .route(web::delete().to(category_handlers::delete_category_handler::<S>)),
          ),
      )
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler::<S>))
      .service(
        web::scope("/orders")
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler::<S>))
          .route(
            "/{order_id}/status",
            web::put().to(order_handlers::update_order_status_handler::<S>),
          ),
      )
      .route(
        "/buyers/{buyer_id}/orders",
        web::get().to(order_handlers::buyer_orders_handler::<S>),
      )
      .route(
        "/payment-incidents",
        web::get().to(order_handlers::payment_incidents_handler::<S>),
      ),
  );
}
