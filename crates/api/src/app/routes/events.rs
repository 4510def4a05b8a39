//! Read-only event stream inspection for operators.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::get,
};

use commerce_infra::command_dispatcher::DispatchError;
use commerce_infra::event_store::Pagination;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/events/:id", get(aggregate_events))
}

/// GET /admin/events/:id?limit=50&offset=0
///
/// One aggregate's stream in sequence order. `limit` is clamped to 1..=1000.
pub async fn aggregate_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::EventsQuery>,
) -> Result<Response, ApiError> {
    let aggregate_id = dto::parse_id(&id, "aggregate")?;
    let pagination = Pagination::new(query.limit, query.offset);
    let result = services
        .events()
        .aggregate_events(aggregate_id, pagination)
        .await
        .map_err(|e| ApiError::from(DispatchError::Store(e)))?;
    Ok(Json(result).into_response())
}
