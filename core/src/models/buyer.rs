// core/src/models/buyer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Role {
  Customer = 0,
  Admin = 1,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
  pub id: Uuid,
  pub name: String,
  pub email: String,
  pub address: Option<String>,
  pub role: Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBuyer {
  pub name: String,
  pub email: String,
  pub address: Option<String>,
  pub role: Role,
}
