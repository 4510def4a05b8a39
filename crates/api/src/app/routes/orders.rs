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
    CancelOrder, CompleteRefund, ConfirmPurchase, CustomerId, OrderCommand, OrderDraft, OrderId, OrderLineRequest,
    PaymentId, RequestRefund,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order))
        .route("/customer/:customer_id", get(orders_by_customer))
        .route("/:id", get(get_order))
        .route("/:id/confirm-payment", patch(confirm_payment))
        .route("/:id/fail-payment", patch(fail_payment))
        .route("/:id/cancel", patch(cancel_order))
        .route("/:id/confirm-purchase", patch(confirm_purchase))
        .route("/:id/request-refund", patch(request_refund))
        .route("/:id/refund", patch(complete_refund))
}

fn order_id(raw: &str) -> Result<OrderId, ApiError> {
    dto::parse_id(raw, "order").map(OrderId::new)
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> Result<Response, ApiError> {
    let lines = body
        .items
        .into_iter()
        .map(|line| {
            Ok(OrderLineRequest {
                product_id: dto::parse_id(&line.product_id, "product").map(ProductId::new)?,
                options: dto::options(line.options),
                quantity: line.quantity,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let draft = OrderDraft {
        order_id: OrderId::new(AggregateId::new()),
        customer_id: CustomerId::new(body.customer_id)?,
        message: body.message,
        channel: body.channel,
        occurred_at: Utc::now(),
    };
    let committed = services.create_order(&draft, &lines)?;
    Ok(dto::command_response(StatusCode::CREATED, draft.order_id, committed))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order = services.orders().get(order_id(&id)?).ok_or_else(|| ApiError::not_found("order"))?;
    Ok(Json(order).into_response())
}

pub async fn orders_by_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(customer_id): Path<String>,
) -> Result<Response, ApiError> {
    let customer_id = CustomerId::new(customer_id)?;
    Ok(Json(services.orders().by_customer(&customer_id)).into_response())
}

pub async fn confirm_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ConfirmPaymentRequest>,
) -> Result<Response, ApiError> {
    let order_id = order_id(&id)?;
    let (committed, status) = services.confirm_payment(order_id, PaymentId::new(body.payment_id)?)?;
    Ok(Json(serde_json::json!({
        "id": order_id.to_string(),
        "events_committed": committed,
        "status": status,
    }))
    .into_response())
}

pub async fn fail_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Result<Response, ApiError> {
    let order_id = order_id(&id)?;
    let committed = services.fail_payment(order_id, body.reason)?;
    Ok(dto::command_response(StatusCode::OK, order_id, committed))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<dto::OptionalReasonRequest>>,
) -> Result<Response, ApiError> {
    let order_id = order_id(&id)?;
    let reason = body.and_then(|Json(b)| b.reason);
    let command = OrderCommand::Cancel(CancelOrder { order_id, reason, occurred_at: Utc::now() });
    let (committed, restored) = services.cancel_order(order_id, command)?;
    Ok(Json(serde_json::json!({
        "id": order_id.to_string(),
        "events_committed": committed,
        "units_restored": restored,
    }))
    .into_response())
}

pub async fn confirm_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order_id = order_id(&id)?;
    let command = OrderCommand::ConfirmPurchase(ConfirmPurchase { order_id, occurred_at: Utc::now() });
    let committed = services.order_command(order_id, command)?;
    Ok(dto::command_response(StatusCode::OK, order_id, committed))
}

pub async fn request_refund(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> Result<Response, ApiError> {
    let order_id = order_id(&id)?;
    let command = OrderCommand::RequestRefund(RequestRefund { order_id, reason: body.reason, occurred_at: Utc::now() });
    let committed = services.order_command(order_id, command)?;
    Ok(dto::command_response(StatusCode::OK, order_id, committed))
}

pub async fn complete_refund(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order_id = order_id(&id)?;
    let command = OrderCommand::CompleteRefund(CompleteRefund { order_id, occurred_at: Utc::now() });
    let committed = services.order_command(order_id, command)?;
    Ok(dto::command_response(StatusCode::OK, order_id, committed))
}
