//! Outbound ports of the purchasing service.
//!
//! The application layer talks to the product catalog and to inventory only
//! through these traits; infra provides adapters over read models and the
//! command dispatcher, tests provide in-memory fakes.

use std::collections::BTreeSet;

use thiserror::Error;

use commerce_core::{DomainError, Money};
use commerce_products::ProductId;

use crate::common::ProductOptions;

/// A sellable option combination, as purchasing sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogVariant {
    pub sku: String,
    pub options: ProductOptions,
    pub unit_price: Money,
    pub purchasable: bool,
}

/// Catalog view of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub product_id: ProductId,
    pub name: String,
    /// Active and not deleted.
    pub purchasable: bool,
    pub variants: Vec<CatalogVariant>,
}

impl CatalogProduct {
    /// Option names a shopper has to pick: every name used by any variant.
    pub fn required_options(&self) -> BTreeSet<&str> {
        self.variants
            .iter()
            .flat_map(|v| v.options.names())
            .collect()
    }

    pub fn variant_for(&self, options: &ProductOptions) -> Option<&CatalogVariant> {
        self.variants.iter().find(|v| &v.options == options)
    }

    pub fn variant_by_sku(&self, sku: &str) -> Option<&CatalogVariant> {
        self.variants.iter().find(|v| v.sku == sku)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("insufficient stock for sku {sku}")]
    InsufficientStock { sku: String },

    /// The backing service could not be reached.
    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Rejected(#[from] DomainError),
}

pub trait ProductCatalog: Send + Sync {
    fn product(&self, product_id: ProductId) -> Result<Option<CatalogProduct>, PortError>;
}

pub trait InventoryChecker: Send + Sync {
    /// Units on hand, `None` when the SKU has no stock record.
    fn available(&self, sku: &str) -> Result<Option<i64>, PortError>;
}

pub trait InventoryManager: Send + Sync {
    /// Take `quantity` units; fails with `InsufficientStock` without side effects.
    fn reduce(&self, sku: &str, quantity: u32) -> Result<(), PortError>;

    fn restore(&self, sku: &str, quantity: u32) -> Result<(), PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce_core::AggregateId;
    use std::collections::BTreeMap;

    fn opts(pairs: &[(&str, &str)]) -> ProductOptions {
        let map: BTreeMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ProductOptions::new(map)
    }

    #[test]
    fn required_options_are_the_union_of_variant_option_names() {
        let product = CatalogProduct {
            product_id: ProductId::new(AggregateId::new()),
            name: "tee".to_string(),
            purchasable: true,
            variants: vec![
                CatalogVariant {
                    sku: "a".to_string(),
                    options: opts(&[("size", "M")]),
                    unit_price: Money::krw(1),
                    purchasable: true,
                },
                CatalogVariant {
                    sku: "b".to_string(),
                    options: opts(&[("color", "red"), ("size", "L")]),
                    unit_price: Money::krw(1),
                    purchasable: true,
                },
            ],
        };
        let required: Vec<&str> = product.required_options().into_iter().collect();
        assert_eq!(required, vec!["color", "size"]);
        assert_eq!(product.variant_for(&opts(&[("size", "L"), ("color", "red")])).map(|v| v.sku.as_str()), Some("b"));
        assert!(product.variant_for(&opts(&[("size", "S")])).is_none());
        assert!(product.variant_by_sku("a").is_some());
    }
}
