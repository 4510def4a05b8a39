use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;

use commerce_stock::{DecreaseStock, IncreaseStock, MarkStockEmpty, StockCommand, StockId};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_stock))
        .route("/sku/:sku", get(get_stock_by_sku))
        .route("/:id", get(get_stock))
        .route("/:id/quantity", get(get_quantity))
        .route("/:id/increase", patch(increase_stock))
        .route("/:id/decrease", patch(decrease_stock))
        .route("/:id/empty", patch(empty_stock))
}

fn stock_id(raw: &str) -> Result<StockId, ApiError> {
    dto::parse_id(raw, "stock").map(StockId::new)
}

pub async fn register_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterStockRequest>,
) -> Result<Response, ApiError> {
    let (stock_id, committed) = services.register_stock(&body.sku, body.quantity)?;
    Ok(dto::command_response(StatusCode::CREATED, stock_id, committed))
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let stock_id = stock_id(&id)?;
    let view = services.stock_levels().get(stock_id).ok_or_else(|| ApiError::not_found("stock"))?;
    Ok(Json(view).into_response())
}

pub async fn get_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let stock_id = stock_id(&id)?;
    let quantity = services.stock_quantity(stock_id).ok_or_else(|| ApiError::not_found("stock"))?;
    Ok(Json(serde_json::json!({ "stock_id": stock_id, "quantity": quantity })).into_response())
}

pub async fn get_stock_by_sku(
    Extension(services): Extension<Arc<AppServices>>,
    Path(sku): Path<String>,
) -> Result<Response, ApiError> {
    let view = services.stock_levels().by_sku(&sku).ok_or_else(|| ApiError::not_found("stock"))?;
    Ok(Json(view).into_response())
}

pub async fn increase_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::StockQuantityRequest>,
) -> Result<Response, ApiError> {
    let stock_id = stock_id(&id)?;
    let command = StockCommand::Increase(IncreaseStock { stock_id, quantity: body.quantity, occurred_at: Utc::now() });
    let committed = services.stock_command(stock_id, command)?;
    Ok(dto::command_response(StatusCode::OK, stock_id, committed))
}

pub async fn decrease_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::StockQuantityRequest>,
) -> Result<Response, ApiError> {
    let stock_id = stock_id(&id)?;
    let command = StockCommand::Decrease(DecreaseStock { stock_id, quantity: body.quantity, occurred_at: Utc::now() });
    let committed = services.stock_command(stock_id, command)?;
    Ok(dto::command_response(StatusCode::OK, stock_id, committed))
}

pub async fn empty_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let stock_id = stock_id(&id)?;
    let command = StockCommand::MarkEmpty(MarkStockEmpty { stock_id, occurred_at: Utc::now() });
    let committed = services.stock_command(stock_id, command)?;
    Ok(dto::command_response(StatusCode::OK, stock_id, committed))
}
