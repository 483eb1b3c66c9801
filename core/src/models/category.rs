// core/src/models/category.rs

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: Uuid,
  pub name: String,
  pub slug: String,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
  pub name: String,
  pub slug: String,
}
