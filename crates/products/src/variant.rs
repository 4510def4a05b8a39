//! Product variants and SKU generation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{Entity, Money};

use crate::product::ProductId;

/// Option name to option value, e.g. `{"color": "red", "size": "M"}`.
///
/// A `BTreeMap` so iteration order (and therefore the SKU) does not depend on
/// insertion order.
pub type OptionCombination = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantStatus {
    Active,
    Inactive,
    OutOfStock,
    Discontinued,
}

/// Input for a new variant. `price` falls back to the product's base price.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantSpec {
    #[serde(default)]
    pub options: OptionCombination,
    #[serde(default)]
    pub price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub sku: String,
    pub options: OptionCombination,
    pub price: Money,
    pub status: VariantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    pub fn new(product_id: &ProductId, options: OptionCombination, price: Money, at: DateTime<Utc>) -> Self {
        Self {
            sku: generate_sku(product_id, &options),
            options,
            price,
            status: VariantStatus::Active,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_available_for_purchase(&self) -> bool {
        self.status == VariantStatus::Active
    }
}

impl Entity for ProductVariant {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.sku
    }
}

/// Derive a variant SKU from its product and option combination.
///
/// - no options: the product id itself
/// - otherwise: `{product_id}_{HASH}` where HASH is the upper-case hex of a
///   31-multiplier polynomial hash over `key_value` pairs (sorted by key,
///   joined with `_`), computed on UTF-16 code units with 32-bit wrapping.
pub fn generate_sku(product_id: &ProductId, options: &OptionCombination) -> String {
    if options.is_empty() {
        return product_id.to_string();
    }

    let joined = options
        .iter()
        .map(|(k, v)| format!("{k}_{v}"))
        .collect::<Vec<_>>()
        .join("_");

    format!("{product_id}_{:X}", polynomial_hash(&joined))
}

fn polynomial_hash(input: &str) -> u32 {
    input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit))) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce_core::AggregateId;

    fn options(pairs: &[(&str, &str)]) -> OptionCombination {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn sku_without_options_is_the_product_id() {
        let product_id = ProductId::new(AggregateId::new());
        assert_eq!(generate_sku(&product_id, &OptionCombination::new()), product_id.to_string());
    }

    #[test]
    fn sku_ignores_option_insertion_order() {
        let product_id = ProductId::new(AggregateId::new());
        let mut a = OptionCombination::new();
        a.insert("size".into(), "M".into());
        a.insert("color".into(), "red".into());
        let b = options(&[("color", "red"), ("size", "M")]);

        assert_eq!(generate_sku(&product_id, &a), generate_sku(&product_id, &b));
    }

    #[test]
    fn sku_hash_matches_known_values() {
        // "a_b" = ((97 * 31) + 95) * 31 + 98
        assert_eq!(polynomial_hash("a_b"), 96_260);
        assert_eq!(format!("{:X}", polynomial_hash("color_red")), "7617ADB5");
        // Wraps past i32::MAX; rendered as the unsigned 32-bit pattern.
        assert_eq!(format!("{:X}", polynomial_hash("color_red_size_XL")), "8C8CD368");
    }

    #[test]
    fn different_options_yield_different_skus() {
        let product_id = ProductId::new(AggregateId::new());
        let red = generate_sku(&product_id, &options(&[("color", "red")]));
        let blue = generate_sku(&product_id, &options(&[("color", "blue")]));
        assert_ne!(red, blue);
        assert!(red.starts_with(&format!("{product_id}_")));
    }

    #[test]
    fn only_active_variants_are_purchasable() {
        let product_id = ProductId::new(AggregateId::new());
        let mut variant = ProductVariant::new(&product_id, OptionCombination::new(), Money::krw(1000), Utc::now());
        assert!(variant.is_available_for_purchase());
        for status in [VariantStatus::Inactive, VariantStatus::OutOfStock, VariantStatus::Discontinued] {
            variant.status = status;
            assert!(!variant.is_available_for_purchase());
        }
    }
}
