// app/src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use storefront::{CatalogSettings, CheckoutSettings};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Without one the server runs on the in-memory store.
  pub database_url: Option<String>,
  pub database_max_connections: u32,

  pub catalog_default_page_size: i64,
  pub catalog_max_page_size: i64,

  pub payment_timeout: Duration,
  pub idempotency_window: Duration,
  /// Replay window for checkouts sent without an idempotency key.
  pub fingerprint_window: Duration,
  pub currency: String,

  pub mock_payment_merchant_id: String,
  pub mock_payment_latency: Duration,

  pub seed_db: bool,
  pub log_format: LogFormat,
}

fn var(name: &str) -> Option<String> {
  env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  match var(name) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
    None => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
      None | Some("pretty") | Some("text") => LogFormat::Pretty,
      Some("json") => LogFormat::Json,
      Some(other) => return Err(AppError::Config(format!("Invalid LOG_FORMAT: {}", other))),
    };

    let config = Self {
      server_host: var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
      server_port: parse_var("SERVER_PORT", 8080)?,
      database_url: var("DATABASE_URL"),
      database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
      catalog_default_page_size: parse_var("CATALOG_DEFAULT_PAGE_SIZE", 12)?,
      catalog_max_page_size: parse_var("CATALOG_MAX_PAGE_SIZE", 100)?,
      payment_timeout: Duration::from_millis(parse_var("PAYMENT_TIMEOUT_MS", 5_000)?),
      idempotency_window: Duration::from_secs(parse_var("IDEMPOTENCY_WINDOW_SECS", 86_400)?),
      fingerprint_window: Duration::from_secs(parse_var("FINGERPRINT_WINDOW_SECS", 600)?),
      currency: var("CURRENCY").unwrap_or_else(|| "USD".to_string()).to_ascii_uppercase(),
      mock_payment_merchant_id: var("MOCK_PAYMENT_MERCHANT_ID").unwrap_or_else(|| "mock_main_acct".to_string()),
      mock_payment_latency: Duration::from_millis(parse_var("MOCK_PAYMENT_LATENCY_MS", 50)?),
      seed_db: parse_var("SEED_DB", false)?,
      log_format,
    };
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.catalog_default_page_size < 1 || self.catalog_max_page_size < self.catalog_default_page_size {
      return Err(AppError::Config(
        "CATALOG_DEFAULT_PAGE_SIZE must be >= 1 and <= CATALOG_MAX_PAGE_SIZE".to_string(),
      ));
    }
    if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
      return Err(AppError::Config(format!("Invalid CURRENCY: {}", self.currency)));
    }
    if self.payment_timeout.is_zero() {
      return Err(AppError::Config("PAYMENT_TIMEOUT_MS must be positive".to_string()));
    }
    Ok(())
  }

  pub fn catalog_settings(&self) -> CatalogSettings {
    CatalogSettings {
      default_page_size: self.catalog_default_page_size,
      max_page_size: self.catalog_max_page_size,
    }
  }

  pub fn checkout_settings(&self) -> CheckoutSettings {
    CheckoutSettings {
      gateway_timeout: self.payment_timeout,
      idempotency_window: self.idempotency_window,
      fingerprint_window: self.fingerprint_window,
      currency: self.currency.clone(),
    }
  }
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      database_max_connections: 10,
      catalog_default_page_size: 12,
      catalog_max_page_size: 100,
      payment_timeout: Duration::from_secs(5),
      idempotency_window: Duration::from_secs(86_400),
      fingerprint_window: Duration::from_secs(600),
      currency: "USD".to_string(),
      mock_payment_merchant_id: "mock_main_acct".to_string(),
      mock_payment_latency: Duration::ZERO,
      seed_db: false,
      log_format: LogFormat::Pretty,
    }
  }
}
