// core/src/catalog/query.rs

//! Filter parsing, validation and the matching rules shared by every backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CatalogSettings;
use crate::error::CatalogError;
use crate::models::{Product, ProductSummary};

/// Filter options as received from a client. Every option is optional; an
/// empty filter matches the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
  /// Match products in ANY of these categories.
  #[serde(default)]
  pub categories: Vec<Uuid>,
  pub price_min: Option<Decimal>,
  pub price_max: Option<Decimal>,
  pub keyword: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
  pub page: Option<i64>,
  pub page_size: Option<i64>,
}

impl PageRequest {
  pub fn new(page: i64, page_size: i64) -> Self {
    Self {
      page: Some(page),
      page_size: Some(page_size),
    }
  }
}

/// A validated, normalised search: bounds checked, keyword trimmed, page size
/// capped. Backends only ever see this type.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
  pub filter: ProductFilter,
  pub page: i64,
  pub page_size: i64,
}

impl CatalogQuery {
  pub fn build(filter: ProductFilter, page: PageRequest, settings: &CatalogSettings) -> Result<Self, CatalogError> {
    let ProductFilter {
      mut categories,
      price_min,
      price_max,
      keyword,
    } = filter;

    for bound in [price_min, price_max].into_iter().flatten() {
      if bound.is_sign_negative() {
        return Err(CatalogError::InvalidFilter(format!("price bound {} is negative", bound)));
      }
    }
    if let (Some(min), Some(max)) = (price_min, price_max) {
      if min > max {
        return Err(CatalogError::InvalidFilter(format!(
          "priceMin ({}) is greater than priceMax ({})",
          min, max
        )));
      }
    }

    let keyword = keyword.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
    categories.sort_unstable();
    categories.dedup();

    let page_no = page.page.unwrap_or(1);
    if page_no < 1 {
      return Err(CatalogError::InvalidFilter(format!("page must be >= 1, got {}", page_no)));
    }
    let page_size = page.page_size.unwrap_or(settings.default_page_size);
    if page_size < 1 {
      return Err(CatalogError::InvalidFilter(format!(
        "pageSize must be > 0, got {}",
        page_size
      )));
    }
    let page_size = page_size.min(settings.max_page_size);
    if (page_no - 1).checked_mul(page_size).is_none() {
      return Err(CatalogError::InvalidFilter(format!("page {} is out of range", page_no)));
    }

    Ok(Self {
      filter: ProductFilter {
        categories,
        price_min,
        price_max,
        keyword,
      },
      page: page_no,
      page_size,
    })
  }

  pub fn limit(&self) -> i64 {
    self.page_size
  }

  pub fn offset(&self) -> i64 {
    (self.page - 1) * self.page_size
  }

  /// `%keyword%` with LIKE metacharacters escaped (escape char `\`).
  pub fn like_contains(&self) -> Option<String> {
    self.filter.keyword.as_deref().map(|k| format!("%{}%", escape_like(k)))
  }

  /// `keyword%` with LIKE metacharacters escaped (escape char `\`).
  pub fn like_prefix(&self) -> Option<String> {
    self.filter.keyword.as_deref().map(|k| format!("{}%", escape_like(k)))
  }

  /// In-process version of the SQL predicate.
  pub fn matches(&self, product: &Product) -> bool {
    let f = &self.filter;
    if !f.categories.is_empty() && !f.categories.contains(&product.category_id) {
      return false;
    }
    if f.price_min.is_some_and(|min| product.price < min) {
      return false;
    }
    if f.price_max.is_some_and(|max| product.price > max) {
      return false;
    }
    match f.keyword.as_deref() {
      Some(keyword) => {
        let needle = keyword.to_lowercase();
        product.name.to_lowercase().contains(&needle) || product.description.to_lowercase().contains(&needle)
      }
      None => true,
    }
  }

  /// 0 = name starts with the keyword, 1 = name contains it, 2 = description only.
  pub fn relevance(&self, product: &Product) -> u8 {
    let Some(keyword) = self.filter.keyword.as_deref() else {
      return 0;
    };
    let needle = keyword.to_lowercase();
    let name = product.name.to_lowercase();
    if name.starts_with(&needle) {
      0
    } else if name.contains(&needle) {
      1
    } else {
      2
    }
  }
}

/// Escapes `\`, `%` and `_` so user text is matched literally by LIKE/ILIKE.
pub fn escape_like(raw: &str) -> String {
  let mut escaped = String::with_capacity(raw.len());
  for c in raw.chars() {
    if matches!(c, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
  pub products: Vec<ProductSummary>,
  /// Matches before pagination.
  pub total: i64,
  pub page: i64,
  pub page_size: i64,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn settings() -> CatalogSettings {
    CatalogSettings {
      default_page_size: 12,
      max_page_size: 50,
    }
  }

  #[test]
  fn escape_like_neutralises_pattern_syntax() {
    assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    assert_eq!(escape_like("plain"), "plain");
  }

  #[test]
  fn inverted_price_bounds_are_rejected() {
    let filter = ProductFilter {
      price_min: Some(Decimal::from(30)),
      price_max: Some(Decimal::from(20)),
      ..Default::default()
    };
    let err = CatalogQuery::build(filter, PageRequest::default(), &settings()).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidFilter(_)));
  }

  #[test]
  fn equal_price_bounds_are_allowed() {
    let filter = ProductFilter {
      price_min: Some(Decimal::from(20)),
      price_max: Some(Decimal::from(20)),
      ..Default::default()
    };
    assert!(CatalogQuery::build(filter, PageRequest::default(), &settings()).is_ok());
  }

  #[test]
  fn page_size_is_capped_and_defaults_apply() {
    let q = CatalogQuery::build(ProductFilter::default(), PageRequest::new(3, 500), &settings()).unwrap();
    assert_eq!(q.page_size, 50);
    assert_eq!(q.offset(), 100);

    let q = CatalogQuery::build(ProductFilter::default(), PageRequest::default(), &settings()).unwrap();
    assert_eq!((q.page, q.page_size, q.offset()), (1, 12, 0));
  }

  #[test]
  fn zero_page_and_zero_size_are_invalid() {
    assert!(CatalogQuery::build(ProductFilter::default(), PageRequest::new(0, 10), &settings()).is_err());
    assert!(CatalogQuery::build(ProductFilter::default(), PageRequest::new(1, 0), &settings()).is_err());
  }

  #[test]
  fn blank_keyword_is_dropped_and_keyword_is_trimmed() {
    let blank = ProductFilter {
      keyword: Some("   ".into()),
      ..Default::default()
    };
    let q = CatalogQuery::build(blank, PageRequest::default(), &settings()).unwrap();
    assert_eq!(q.filter.keyword, None);

    let padded = ProductFilter {
      keyword: Some("  mug ".into()),
      ..Default::default()
    };
    let q = CatalogQuery::build(padded, PageRequest::default(), &settings()).unwrap();
    assert_eq!(q.like_contains().as_deref(), Some("%mug%"));
    assert_eq!(q.like_prefix().as_deref(), Some("mug%"));
  }
}
