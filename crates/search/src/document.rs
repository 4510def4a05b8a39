use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::Money;
use commerce_products::{OptionCombination, ProductId, ProductStatus, SellerId, VariantStatus};

/// Denormalised product as stored in the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub base_price: Money,
    pub category_id: String,
    pub status: ProductStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `name:value` pairs from active variants, e.g. `color:red`.
    pub attributes: BTreeSet<String>,
    pub suggestions: Vec<String>,
    pub variants: Vec<VariantDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDocument {
    pub sku: String,
    pub price: Money,
    pub status: VariantStatus,
    pub options: OptionCombination,
}

impl ProductDocument {
    /// Visible to shoppers: active and not deleted.
    pub fn is_searchable(&self) -> bool {
        self.status == ProductStatus::Active && !self.is_deleted
    }
}
