// app/src/state.rs
use std::sync::Arc;

use storefront::{CatalogService, InventoryLedger, OrderService, OrderWorkflow, PaymentGateway, Store};

use crate::config::AppConfig;
use crate::errors::Result;

/// Everything a handler needs, generic over the storage backend so the same
/// routes serve PostgreSQL in production and the in-memory store in tests.
#[derive(Clone)]
pub struct AppState<S: Store> {
  pub store: S,
  pub catalog: CatalogService<S>,
  pub ledger: InventoryLedger<S>,
  pub workflow: OrderWorkflow<S>,
  pub orders: OrderService<S>,
  pub config: Arc<AppConfig>,
}

impl<S: Store> AppState<S> {
  pub fn new(store: S, gateway: Arc<dyn PaymentGateway>, config: Arc<AppConfig>) -> Result<Self> {
    Ok(Self {
      catalog: CatalogService::new(store.clone(), config.catalog_settings()),
      ledger: InventoryLedger::new(store.clone()),
      workflow: OrderWorkflow::new(store.clone(), gateway, config.checkout_settings())?,
      orders: OrderService::new(store.clone()),
      store,
      config,
    })
  }
}
