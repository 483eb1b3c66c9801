// core/src/models/mod.rs

//! Plain data structures mirroring the storefront tables.
//!
//! No behaviour beyond small invariants lives here; persistence goes through
//! [`crate::store::Store`].

pub mod buyer;
pub mod category;
pub mod incident;
pub mod order;
pub mod product;

pub use buyer::{Buyer, NewBuyer, Role};
pub use category::{Category, NewCategory};
pub use incident::{IncidentKind, NewPaymentIncident, PaymentIncident};
pub use order::{NewOrder, NewOrderLine, Order, OrderLine, OrderStatus};
pub use product::{NewProduct, Product, ProductDetail, ProductSummary, StockLevel};
