// app/src/seed.rs

//! Demo catalog for local runs (`SEED_DB=true`).

use rust_decimal::Decimal;
use storefront::models::{NewBuyer, Role};
use storefront::{NewProductInput, Store, StoreError};
use tracing::info;

use crate::errors::Result;
use crate::state::AppState;

const PRODUCTS: &[(&str, &str, &str, i64, i32)] = &[
  ("Kitchen", "Stoneware Mug", "Hand-glazed mug, 350 ml.", 1250, 40),
  ("Kitchen", "Pour-Over Kettle", "Gooseneck kettle with a thermometer.", 4900, 12),
  ("Kitchen", "Tea Towel Set", "Three linen towels.", 1800, 25),
  ("Books", "Rust in Practice", "A field guide to systems programming.", 3999, 8),
  ("Books", "The Quiet Garden", "Essays on slow living.", 2200, 15),
  ("Games", "Chess Set", "Walnut board with weighted pieces.", 8900, 5),
  ("Games", "Puzzle 1000", "A 1000 piece landscape puzzle.", 2400, 20),
];

/// Inserts the demo data unless the catalog already has products.
pub async fn seed_catalog<S: Store>(state: &AppState<S>) -> Result<()> {
  if state.catalog.count_products().await? > 0 {
    info!("Catalog already populated; skipping seed.");
    return Ok(());
  }

  let mut categories = std::collections::HashMap::new();
  for (category_name, name, description, cents, quantity) in PRODUCTS {
    let category_id = match categories.get(category_name) {
      Some(id) => *id,
      None => {
        let category = state.catalog.create_category(category_name).await?;
        categories.insert(*category_name, category.id);
        category.id
      }
    };
    state
      .catalog
      .create_product(NewProductInput {
        name: name.to_string(),
        description: description.to_string(),
        price: Decimal::new(*cents, 2),
        quantity: *quantity,
        category_id,
        shipping: true,
        photo_path: None,
      })
      .await?;
  }

  match state
    .store
    .insert_buyer(&NewBuyer {
      name: "Demo Buyer".to_string(),
      email: "demo@example.com".to_string(),
      address: Some("1 Demo Street".to_string()),
      role: Role::Customer,
    })
    .await
  {
    Ok(buyer) => info!(buyer_id = %buyer.id, "Demo buyer created."),
    Err(StoreError::Conflict(_)) => info!("Demo buyer already exists."),
    Err(e) => return Err(e.into()),
  }

  info!(products = PRODUCTS.len(), categories = categories.len(), "Demo catalog seeded.");
  Ok(())
}
