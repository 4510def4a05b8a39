use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use commerce_search::{DEFAULT_AUTOCOMPLETE_LIMIT, SearchError};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/products", get(search_products))
        .route("/autocomplete", get(autocomplete))
}

fn unavailable(err: SearchError) -> ApiError {
    tracing::warn!(error = %err, "search failed");
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "dependency_unavailable", err.to_string())
}

pub async fn search_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SearchQuery>,
) -> Result<Response, ApiError> {
    let options = dto::search_options(query)?;
    let page = services.search().search(&options).map_err(unavailable)?;
    Ok(Json(page).into_response())
}

pub async fn autocomplete(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::AutocompleteQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUTOCOMPLETE_LIMIT);
    let suggestions = services.search().autocomplete(&query.prefix, limit).map_err(unavailable)?;
    Ok(Json(suggestions).into_response())
}
