use std::collections::BTreeMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use commerce_core::{AggregateId, DEFAULT_CURRENCY, DomainError, Money};
use commerce_products::{OptionCombination, VariantSpec, VariantStatus};
use commerce_purchasing::{CartItemId, ProductOptions};
use commerce_search::{SearchOptions, SortField, SortOrder, parse_filters};

use crate::app::errors::ApiError;
use crate::app::services::{CartDetails, RegisteredStock};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct VariantRequest {
    #[serde(default)]
    pub options: OptionCombination,
    pub price: Option<i64>,
    /// Units to register in stock for this variant.
    #[serde(default)]
    pub stock_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub brand: String,
    #[serde(default)]
    pub description: String,
    pub category_id: String,
    pub price: i64,
    pub currency: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantRequest>,
    /// Stock of the default variant when `variants` is empty.
    #[serde(default)]
    pub stock_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeCategoryRequest {
    pub category_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: i64,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddVariantsRequest {
    pub variants: Vec<VariantRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeVariantStatusRequest {
    pub status: VariantStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub category_id: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// `color:red,black|size:M`
    pub filters: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub prefix: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterStockRequest {
    pub sku: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct StockQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCartRequest {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChangeQuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct MergeCartRequest {
    pub source_cart_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub message: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineDto {
    pub product_id: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderLineDto>,
    pub message: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OptionalReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub order_id: Option<String>,
    pub product_id: String,
    pub sku: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub rating: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -------------------------
// Request mapping
// -------------------------

pub fn money(amount: i64, currency: Option<String>) -> Result<Money, DomainError> {
    Money::new(amount, currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()))
}

/// Variant specs plus the stock to register for each option combination.
pub fn variant_specs(
    variants: Vec<VariantRequest>,
    currency: Option<&str>,
) -> Result<(Vec<VariantSpec>, Vec<(OptionCombination, i64)>), DomainError> {
    let mut specs = Vec::with_capacity(variants.len());
    let mut stock = Vec::with_capacity(variants.len());
    for v in variants {
        let price = v
            .price
            .map(|amount| money(amount, currency.map(str::to_string)))
            .transpose()?;
        stock.push((v.options.clone(), v.stock_quantity));
        specs.push(VariantSpec { options: v.options, price });
    }
    Ok((specs, stock))
}

pub fn search_options(query: SearchQuery) -> Result<SearchOptions, ApiError> {
    let defaults = SearchOptions::default();
    let sort_field = match query.sort_field.as_deref() {
        Some(raw) => raw.parse::<SortField>().map_err(ApiError::bad_request)?,
        None => defaults.sort_field,
    };
    let sort_order = match query.sort_order.as_deref() {
        Some(raw) => raw.parse::<SortOrder>().map_err(ApiError::bad_request)?,
        None => defaults.sort_order,
    };
    Ok(SearchOptions {
        keyword: query.keyword.filter(|k| !k.trim().is_empty()),
        category_id: query.category_id.filter(|c| !c.trim().is_empty()),
        min_price: query.min_price,
        max_price: query.max_price,
        filters: query.filters.as_deref().map(parse_filters).unwrap_or_default(),
        sort_field,
        sort_order,
        page: query.page.unwrap_or(defaults.page),
        size: query.size.unwrap_or(defaults.size),
    })
}

pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, ApiError> {
    raw.parse::<AggregateId>().map_err(|_| ApiError::invalid_id(what))
}

pub fn options(map: BTreeMap<String, String>) -> ProductOptions {
    ProductOptions::new(map)
}

// -------------------------
// Responses
// -------------------------

pub fn command_response(status: StatusCode, id: impl ToString, events_committed: usize) -> Response {
    (
        status,
        Json(serde_json::json!({
            "id": id.to_string(),
            "events_committed": events_committed,
        })),
    )
        .into_response()
}

pub fn product_change_response(
    status: StatusCode,
    id: impl ToString,
    events_committed: usize,
    stocks: &[RegisteredStock],
) -> Response {
    (
        status,
        Json(serde_json::json!({
            "id": id.to_string(),
            "events_committed": events_committed,
            "stocks": stocks,
        })),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct CartLineResponse {
    pub item_id: CartItemId,
    pub product_id: String,
    pub sku: String,
    pub name: Option<String>,
    pub options: ProductOptions,
    pub quantity: u32,
    pub unit_price: Option<Money>,
    pub subtotal: Option<Money>,
    pub available: bool,
    pub unavailable_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart_id: String,
    pub customer_id: String,
    pub items: Vec<CartLineResponse>,
    pub item_count: usize,
    pub total_quantity: u32,
    pub total: Money,
    /// Items whose product or variant is gone from the catalog.
    pub missing: Vec<CartItemId>,
    pub converted: bool,
    pub expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CartDetails> for CartResponse {
    fn from(d: CartDetails) -> Self {
        let items = d
            .pricing
            .lines
            .into_iter()
            .map(|line| {
                let options = d.cart.item(line.item_id).map(|i| i.options.clone()).unwrap_or_default();
                CartLineResponse {
                    item_id: line.item_id,
                    product_id: line.product_id.to_string(),
                    sku: line.sku,
                    name: line.name,
                    options,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    subtotal: line.subtotal,
                    available: line.available,
                    unavailable_reason: line.unavailable_reason,
                }
            })
            .collect();

        Self {
            cart_id: d.cart.id_typed().to_string(),
            customer_id: d.cart.customer_id().to_string(),
            items,
            item_count: d.cart.item_count(),
            total_quantity: d.cart.total_quantity(),
            total: d.pricing.total,
            missing: d.pricing.missing,
            converted: d.cart.is_converted(),
            expired: d.expired,
            expires_at: d.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_maps_filters_and_sorting() {
        let opts = search_options(SearchQuery {
            keyword: Some("  ".to_string()),
            filters: Some("color:red,black|size:M".to_string()),
            sort_field: Some("price".to_string()),
            sort_order: Some("asc".to_string()),
            page: Some(2),
            ..SearchQuery::default()
        })
        .unwrap();
        assert_eq!(opts.keyword, None);
        assert_eq!(opts.filters, vec!["color:red", "color:black", "size:M"]);
        assert_eq!(opts.sort_field, SortField::Price);
        assert_eq!(opts.sort_order, SortOrder::Asc);
        assert_eq!(opts.page, 2);
        assert_eq!(opts.size, SearchOptions::default().size);
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let query = SearchQuery { sort_field: Some("color".to_string()), ..SearchQuery::default() };
        assert!(search_options(query).is_err());
    }

    #[test]
    fn variant_prices_use_the_product_currency() {
        let (specs, stock) = variant_specs(
            vec![VariantRequest {
                options: BTreeMap::from([("size".to_string(), "M".to_string())]),
                price: Some(1_500),
                stock_quantity: 4,
            }],
            Some("usd"),
        )
        .unwrap();
        assert_eq!(specs[0].price.as_ref().unwrap().currency(), "USD");
        assert_eq!(stock[0].1, 4);
    }
}
