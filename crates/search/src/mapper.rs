//! Product aggregate → search document.

use std::collections::BTreeSet;

use commerce_products::{Product, ProductVariant};

use crate::document::{ProductDocument, VariantDocument};

/// Option pairs of active variants as `name:value`, sorted.
pub fn flatten_attributes(variants: &[ProductVariant]) -> BTreeSet<String> {
    variants
        .iter()
        .filter(|v| v.is_available_for_purchase())
        .flat_map(|v| v.options.iter().map(|(name, value)| format!("{name}:{value}")))
        .collect()
}

/// Autocomplete entries: explicit extras first, then the name and its words,
/// then the brand and `"brand name"`. Blanks dropped, first occurrence wins.
pub fn generate_suggestions(name: &str, brand: &str, extra: &[String]) -> Vec<String> {
    let mut from_name = BTreeSet::new();
    if !name.trim().is_empty() {
        from_name.insert(name.to_string());
        from_name.extend(name.split_whitespace().map(str::to_string));
    }

    let mut from_brand = BTreeSet::new();
    if !brand.trim().is_empty() {
        from_brand.insert(brand.to_string());
        if !name.trim().is_empty() {
            from_brand.insert(format!("{brand} {name}"));
        }
    }

    let mut seen = BTreeSet::new();
    extra
        .iter()
        .cloned()
        .chain(from_name)
        .chain(from_brand)
        .filter(|s| !s.trim().is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Build the index document for a created product.
pub fn to_document(product: &Product) -> ProductDocument {
    let created_at = product.created_at().unwrap_or_default();
    ProductDocument {
        id: product.id_typed(),
        seller_id: product.seller_id().clone(),
        name: product.name().to_string(),
        brand: product.brand().to_string(),
        description: product.description().to_string(),
        base_price: product.base_price().clone(),
        category_id: product.category_id().to_string(),
        status: product.status(),
        is_deleted: product.is_deleted(),
        created_at,
        updated_at: product.updated_at().unwrap_or(created_at),
        attributes: flatten_attributes(product.variants()),
        suggestions: generate_suggestions(product.name(), product.brand(), &[]),
        variants: product
            .variants()
            .iter()
            .map(|v| VariantDocument {
                sku: v.sku.clone(),
                price: v.price.clone(),
                status: v.status,
                options: v.options.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use commerce_core::{AggregateId, Money};
    use commerce_products::{OptionCombination, ProductId, VariantStatus};

    fn variant(pairs: &[(&str, &str)], status: VariantStatus) -> ProductVariant {
        let options: OptionCombination =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut v = ProductVariant::new(&ProductId::new(AggregateId::new()), options, Money::krw(1_000), Utc::now());
        v.status = status;
        v
    }

    #[test]
    fn attributes_come_from_active_variants_only() {
        let variants = vec![
            variant(&[("color", "red"), ("size", "M")], VariantStatus::Active),
            variant(&[("color", "blue")], VariantStatus::Inactive),
            variant(&[("color", "red"), ("size", "L")], VariantStatus::Active),
        ];
        let attrs: Vec<String> = flatten_attributes(&variants).into_iter().collect();
        assert_eq!(attrs, vec!["color:red", "size:L", "size:M"]);
    }

    #[test]
    fn suggestions_cover_name_words_and_brand() {
        let s = generate_suggestions("Trail Runner", "Acme", &[]);
        assert_eq!(s, vec!["Runner", "Trail", "Trail Runner", "Acme", "Acme Trail Runner"]);
    }

    #[test]
    fn suggestions_are_deduplicated_and_skip_blanks() {
        let s = generate_suggestions("Acme", "Acme", &["Acme".to_string(), " ".to_string()]);
        assert_eq!(s, vec!["Acme", "Acme Acme"]);
        assert!(generate_suggestions(" ", "", &[]).is_empty());
    }
}
