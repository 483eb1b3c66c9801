// app/src/web/handlers/mod.rs

pub mod category_handlers;
pub mod checkout_handlers;
pub mod order_handlers;
pub mod product_handlers;
