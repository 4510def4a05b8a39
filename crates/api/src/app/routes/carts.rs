use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;

use commerce_core::AggregateId;
use commerce_products::ProductId;
use commerce_purchasing::{
    AddItemRequest, CartCommand, CartId, CartItemId, ClearCart, CreateCart, CustomerId, DeleteCart, RemoveItem,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart).delete(delete_cart))
        .route("/:id/items", post(add_item).delete(clear_cart))
        .route("/:id/items/:item_id", patch(change_quantity).delete(remove_item))
        .route("/:id/merge", post(merge_carts))
        .route("/:id/checkout", post(checkout))
}

fn cart_id(raw: &str) -> Result<CartId, ApiError> {
    dto::parse_id(raw, "cart").map(CartId::new)
}

fn item_id(raw: &str) -> Result<CartItemId, ApiError> {
    dto::parse_id(raw, "cart item").map(CartItemId::new)
}

pub async fn create_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateCartRequest>,
) -> Result<Response, ApiError> {
    let customer_id = CustomerId::new(body.customer_id)?;
    let cart_id = CartId::new(AggregateId::new());
    let command = CartCommand::Create(CreateCart { cart_id, customer_id, occurred_at: Utc::now() });
    let committed = services.cart_command(cart_id, command)?;
    Ok(dto::command_response(StatusCode::CREATED, cart_id, committed))
}

pub async fn get_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let details = services.cart_details(cart_id(&id)?)?;
    Ok(Json(dto::CartResponse::from(details)).into_response())
}

pub async fn delete_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let committed = services.cart_command(cart_id, CartCommand::Delete(DeleteCart { cart_id, occurred_at: Utc::now() }))?;
    Ok(dto::command_response(StatusCode::OK, cart_id, committed))
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddCartItemRequest>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let request = AddItemRequest {
        product_id: dto::parse_id(&body.product_id, "product").map(ProductId::new)?,
        options: dto::options(body.options),
        quantity: body.quantity,
    };
    let (item_id, committed) = services.add_cart_item(cart_id, &request)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": cart_id.to_string(),
            "item_id": item_id.to_string(),
            "events_committed": committed,
        })),
    )
        .into_response())
}

pub async fn change_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item)): Path<(String, String)>,
    Json(body): Json<dto::ChangeQuantityRequest>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let committed = services.change_item_quantity(cart_id, item_id(&item)?, body.quantity)?;
    Ok(dto::command_response(StatusCode::OK, cart_id, committed))
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let command = CartCommand::RemoveItem(RemoveItem { cart_id, item_id: item_id(&item)?, occurred_at: Utc::now() });
    let committed = services.cart_command(cart_id, command)?;
    Ok(dto::command_response(StatusCode::OK, cart_id, committed))
}

pub async fn clear_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let committed = services.cart_command(cart_id, CartCommand::Clear(ClearCart { cart_id, occurred_at: Utc::now() }))?;
    Ok(dto::command_response(StatusCode::OK, cart_id, committed))
}

pub async fn merge_carts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::MergeCartRequest>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let source = dto::parse_id(&body.source_cart_id, "source cart").map(CartId::new)?;
    let committed = services.merge_carts(cart_id, source)?;
    Ok(dto::command_response(StatusCode::OK, cart_id, committed))
}

pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CheckoutRequest>,
) -> Result<Response, ApiError> {
    let cart_id = cart_id(&id)?;
    let customer_id = CustomerId::new(body.customer_id)?;
    let order_id = services.checkout(cart_id, customer_id, body.message, body.channel)?;
    tracing::info!(cart_id = %cart_id, order_id = %order_id, "cart checked out");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "cart_id": cart_id.to_string(),
            "order_id": order_id.to_string(),
        })),
    )
        .into_response())
}
