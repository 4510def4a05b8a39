use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::Utc;

use commerce_core::AggregateId;
use commerce_infra::projections::reviews::DEFAULT_REVIEW_PAGE_SIZE;
use commerce_products::ProductId;
use commerce_reviews::{CreateReview, DeleteReview, ReviewCommand, ReviewId, UserId};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{USER_HEADER, required_header};
use crate::app::services::AppServices;

// `:id` is the review id on DELETE and the product id on GET; both share the
// segment name so the router accepts them side by side.
pub fn router() -> Router {
    Router::new()
        .route("/", post(create_review))
        .route("/:id", delete(delete_review))
        .route("/:id/:sku", get(product_reviews))
}

pub async fn create_review(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Json(body): Json<dto::CreateReviewRequest>,
) -> Result<Response, ApiError> {
    let user_id = UserId::new(required_header(&headers, USER_HEADER)?);
    let review_id = ReviewId::new(AggregateId::new());
    let command = ReviewCommand::Create(CreateReview {
        review_id,
        order_id: body.order_id,
        product_id: dto::parse_id(&body.product_id, "product").map(ProductId::new)?,
        sku: body.sku,
        user_id,
        title: body.title,
        content: body.content,
        rating: body.rating,
        occurred_at: Utc::now(),
    });
    let committed = services.review_command(review_id, command)?;
    Ok(dto::command_response(StatusCode::CREATED, review_id, committed))
}

pub async fn product_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, sku)): Path<(String, String)>,
    Query(query): Query<dto::PageQuery>,
) -> Result<Response, ApiError> {
    let product_id = dto::parse_id(&id, "product").map(ProductId::new)?;
    let page = services.reviews().page(
        product_id,
        &sku,
        query.page.unwrap_or(1),
        query.size.unwrap_or(DEFAULT_REVIEW_PAGE_SIZE),
    );
    Ok(Json(serde_json::json!({
        "product_id": product_id,
        "sku": sku,
        "review_count": services.reviews().count(product_id),
        "reviews": page,
    }))
    .into_response())
}

pub async fn delete_review(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = UserId::new(required_header(&headers, USER_HEADER)?);
    let review_id = dto::parse_id(&id, "review").map(ReviewId::new)?;
    let command = ReviewCommand::Delete(DeleteReview { review_id, user_id, occurred_at: Utc::now() });
    let committed = services.review_command(review_id, command)?;
    Ok(dto::command_response(StatusCode::OK, review_id, committed))
}
