//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring and the multi-step command flows
//! - `routes/`: HTTP routes + handlers (one file per service)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, ServiceError, build_services};

/// Build services from config and the full HTTP router on top of them.
pub async fn build_app(config: &AppConfig) -> Result<(Router, Arc<AppServices>), ServiceError> {
    let services = build_services(config).await?;
    Ok((router(services.clone()), services))
}

pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .merge(routes::health_router())
        .nest("/api/v1", routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
