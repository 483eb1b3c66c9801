// src/lib.rs

//! Storefront: catalog search and checkout core for an online shop.
//!
//! The crate covers the two places where the shop has real consistency stakes:
//!  - The catalog query engine: multi-predicate product filtering with keyword
//!    search, stable ordering and counted pagination.
//!  - The order workflow: cart validation, server-side pricing, payment
//!    authorization, an all-or-nothing inventory decrement and order persistence,
//!    with compensation when a step after payment fails.
//!
//! Storage sits behind the [`Store`] / [`StoreTx`] traits with a PostgreSQL
//! backend ([`PgStore`]) and an in-process backend ([`MemoryStore`]). The payment
//! processor sits behind [`PaymentGateway`].

pub mod catalog;
pub mod checkout;
pub mod error;
pub mod inventory;
pub mod models;
pub mod orders;
pub mod payment;
pub mod pipeline;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::catalog::{
  CatalogQuery, CatalogService, CatalogSettings, CategoryProducts, NewProductInput, PageRequest, ProductFilter, ProductPage,
  ProductUpdate,
};
pub use crate::checkout::{CartLine, CheckoutOutcome, CheckoutRequest, CheckoutSettings, CheckoutState, OrderWorkflow};
pub use crate::error::{CatalogError, CheckoutError, GatewayError, LedgerError, OrderError, StoreError, StoreResult};
pub use crate::inventory::{InventoryLedger, ReserveOutcome, StockRequest};
pub use crate::orders::OrderService;
pub use crate::payment::{Authorization, MockPaymentGateway, PaymentGateway, VoidReceipt};
pub use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineError, PipelineResult};
pub use crate::store::memory::MemoryStore;
pub use crate::store::postgres::PgStore;
pub use crate::store::{Store, StoreTx};
