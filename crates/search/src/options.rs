use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_AUTOCOMPLETE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    Name,
    CreatedAt,
    #[default]
    Relevance,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" | "base_price" => Ok(SortField::Price),
            "name" => Ok(SortField::Name),
            "created_at" | "createdat" => Ok(SortField::CreatedAt),
            "relevance" | "score" | "" => Ok(SortField::Relevance),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    /// Anything other than `desc` sorts ascending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("desc") {
            Ok(SortOrder::Desc)
        } else {
            Ok(SortOrder::Asc)
        }
    }
}

/// Query over the product index. `page` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub keyword: Option<String>,
    pub category_id: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// Flattened `name:value` terms, see [`crate::parse_filters`].
    pub filters: Vec<String>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub page: usize,
    pub size: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            keyword: None,
            category_id: None,
            min_price: None,
            max_price: None,
            filters: Vec::new(),
            sort_field: SortField::Relevance,
            sort_order: SortOrder::Desc,
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchOptions {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_size(&self) -> usize {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.effective_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_parses_known_names() {
        assert_eq!("price".parse::<SortField>().unwrap(), SortField::Price);
        assert_eq!("CREATED_AT".parse::<SortField>().unwrap(), SortField::CreatedAt);
        assert!("color".parse::<SortField>().is_err());
    }

    #[test]
    fn sort_order_defaults_to_ascending_for_unknown_values() {
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!("whatever".parse::<SortOrder>().unwrap(), SortOrder::Asc);
    }

    #[test]
    fn size_is_clamped() {
        let opts = SearchOptions { size: 1_000, page: 2, ..SearchOptions::default() };
        assert_eq!(opts.effective_size(), MAX_PAGE_SIZE);
        assert_eq!(opts.offset(), 200);
        let zero = SearchOptions { size: 0, ..SearchOptions::default() };
        assert_eq!(zero.effective_size(), 1);
    }
}
