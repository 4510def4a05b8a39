use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;

use commerce_core::AggregateId;
use commerce_products::{
    ActivateProduct, AddVariants, ChangeProductCategory, ChangeProductPrice, ChangeVariantStatus, CreateProduct,
    DeleteProduct, InactivateProduct, ProductCommand, ProductId, RemoveVariant, SellerId, UpdateProductInfo,
    UpdateVariant,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{SELLER_HEADER, required_header};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/variants/:sku", get(get_variant_by_sku))
        .route("/:id", get(get_product).patch(update_product).delete(delete_product))
        .route("/:id/category", patch(change_category))
        .route("/:id/price", patch(change_price))
        .route("/:id/activate", patch(activate_product))
        .route("/:id/inactivate", patch(inactivate_product))
        .route("/:id/variants", get(list_variants).post(add_variants))
        .route("/:id/variants/:sku", get(get_variant).patch(update_variant).delete(remove_variant))
        .route("/:id/variants/:sku/status", patch(change_variant_status))
}

fn seller(headers: &HeaderMap) -> Result<SellerId, ApiError> {
    required_header(headers, SELLER_HEADER).map(SellerId::new)
}

fn product_id(raw: &str) -> Result<ProductId, ApiError> {
    dto::parse_id(raw, "product").map(ProductId::new)
}

fn updated(services: &AppServices, product_id: ProductId, command: ProductCommand) -> Result<Response, ApiError> {
    let change = services.product_command(product_id, command, &[])?;
    Ok(dto::command_response(StatusCode::OK, product_id, change.events_committed))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::CreateProductRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = ProductId::new(AggregateId::new());
    let base_price = dto::money(body.price, body.currency.clone())?;

    let (variants, mut stock) = dto::variant_specs(body.variants, Some(base_price.currency()))?;
    if variants.is_empty() {
        stock.push((Default::default(), body.stock_quantity));
    }

    let command = ProductCommand::Create(CreateProduct {
        product_id,
        seller_id,
        name: body.name,
        brand: body.brand,
        description: body.description,
        category_id: body.category_id,
        base_price,
        variants,
        occurred_at: Utc::now(),
    });

    let change = services.product_command(product_id, command, &stock)?;
    Ok(dto::product_change_response(
        StatusCode::CREATED,
        product_id,
        change.events_committed,
        &change.stocks,
    ))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id = product_id(&id)?;
    let product = services.catalog().get(product_id).ok_or_else(|| ApiError::not_found("product"))?;
    Ok(Json(product).into_response())
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::UpdateInfo(UpdateProductInfo {
        product_id,
        seller_id,
        name: body.name,
        brand: body.brand,
        description: body.description,
        occurred_at: Utc::now(),
    });
    updated(&services, product_id, command)
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::Delete(DeleteProduct { product_id, seller_id, occurred_at: Utc::now() });
    updated(&services, product_id, command)
}

pub async fn change_category(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeCategoryRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::ChangeCategory(ChangeProductCategory {
        product_id,
        seller_id,
        category_id: body.category_id,
        occurred_at: Utc::now(),
    });
    updated(&services, product_id, command)
}

pub async fn change_price(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::PriceRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::ChangePrice(ChangeProductPrice {
        product_id,
        seller_id,
        price: dto::money(body.price, body.currency)?,
        occurred_at: Utc::now(),
    });
    updated(&services, product_id, command)
}

pub async fn activate_product(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::Activate(ActivateProduct { product_id, seller_id, occurred_at: Utc::now() });
    updated(&services, product_id, command)
}

pub async fn inactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::Inactivate(InactivateProduct { product_id, seller_id, occurred_at: Utc::now() });
    updated(&services, product_id, command)
}

pub async fn list_variants(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let product_id = product_id(&id)?;
    let product = services.catalog().get(product_id).ok_or_else(|| ApiError::not_found("product"))?;
    Ok(Json(product.variants).into_response())
}

/// New variants can carry initial stock, registered like on create.
pub async fn add_variants(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<dto::AddVariantsRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let currency = services.catalog().get(product_id).map(|p| p.base_price.currency().to_string());
    let (variants, stock) = dto::variant_specs(body.variants, currency.as_deref())?;

    let command = ProductCommand::AddVariants(AddVariants { product_id, seller_id, variants, occurred_at: Utc::now() });
    let change = services.product_command(product_id, command, &stock)?;
    Ok(dto::product_change_response(
        StatusCode::CREATED,
        product_id,
        change.events_committed,
        &change.stocks,
    ))
}

pub async fn get_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, sku)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let product_id = product_id(&id)?;
    let product = services.catalog().get(product_id).ok_or_else(|| ApiError::not_found("product"))?;
    let variant = product
        .variants
        .into_iter()
        .find(|v| v.sku == sku)
        .ok_or_else(|| ApiError::not_found("variant"))?;
    Ok(Json(variant).into_response())
}

pub async fn update_variant(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path((id, sku)): Path<(String, String)>,
    Json(body): Json<dto::PriceRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::UpdateVariant(UpdateVariant {
        product_id,
        seller_id,
        sku,
        price: dto::money(body.price, body.currency)?,
        occurred_at: Utc::now(),
    });
    updated(&services, product_id, command)
}

pub async fn change_variant_status(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path((id, sku)): Path<(String, String)>,
    Json(body): Json<dto::ChangeVariantStatusRequest>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::ChangeVariantStatus(ChangeVariantStatus {
        product_id,
        seller_id,
        sku,
        status: body.status,
        occurred_at: Utc::now(),
    });
    updated(&services, product_id, command)
}

pub async fn remove_variant(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path((id, sku)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let seller_id = seller(&headers)?;
    let product_id = product_id(&id)?;
    let command = ProductCommand::RemoveVariant(RemoveVariant { product_id, seller_id, sku, occurred_at: Utc::now() });
    updated(&services, product_id, command)
}

pub async fn get_variant_by_sku(
    Extension(services): Extension<Arc<AppServices>>,
    Path(sku): Path<String>,
) -> Result<Response, ApiError> {
    let (product, variant) = services.catalog().by_sku(&sku).ok_or_else(|| ApiError::not_found("variant"))?;
    Ok(Json(serde_json::json!({
        "product_id": product.id,
        "name": product.name,
        "brand": product.brand,
        "variant": variant,
    }))
    .into_response())
}
