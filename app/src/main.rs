// app/src/main.rs

mod config;
mod errors;
mod seed;
mod state;
mod web;

use std::sync::Arc;

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use storefront::{MemoryStore, MockPaymentGateway, PaymentGateway, PgStore, Store};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};
use crate::state::AppState;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
  match format {
    LogFormat::Json => tracing_subscriber::fmt()
      .json()
      .with_env_filter(filter)
      .with_span_events(FmtSpan::CLOSE)
      .init(),
    LogFormat::Pretty => tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_span_events(FmtSpan::CLOSE) // Log when spans close, showing duration
      .init(),
  }
}

async fn serve<S: Store>(app_state: AppState<S>) -> anyhow::Result<()> {
  if app_state.config.seed_db {
    seed::seed_catalog(&app_state).await.context("seeding the catalog")?;
  }

  let server_address = format!("{}:{}", app_state.config.server_host, app_state.config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes::<S>)
  })
  .bind(&server_address)
  .with_context(|| format!("binding {}", server_address))?
  .run()
  .await
  .context("running the HTTP server")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  let app_config = Arc::new(AppConfig::from_env().context("loading configuration")?);
  init_tracing(app_config.log_format);
  tracing::info!(
    backend = if app_config.database_url.is_some() { "postgres" } else { "memory" },
    "Starting storefront server..."
  );

  let gateway: Arc<dyn PaymentGateway> = Arc::new(MockPaymentGateway::new(
    app_config.mock_payment_merchant_id.clone(),
    app_config.mock_payment_latency,
  ));

  match app_config.database_url.clone() {
    Some(database_url) => {
      let store = PgStore::connect(&database_url, app_config.database_max_connections)
        .await
        .context("connecting to the database")?;
      tracing::info!("Successfully connected to the database.");
      store.migrate().await.context("running migrations")?;
      tracing::info!("Database migrations applied.");
      serve(AppState::new(store, gateway, app_config)?).await
    }
    None => {
      tracing::warn!("DATABASE_URL not set; serving from the in-memory store. Data is lost on exit.");
      serve(AppState::new(MemoryStore::new(), gateway, app_config)?).await
    }
  }
}
