use axum::{Router, routing::get};

pub mod carts;
pub mod common;
pub mod events;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod search;
pub mod stocks;
pub mod system;

/// Versioned API surface, mounted under `/api/v1`.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/search", search::router())
        .nest("/stocks", stocks::router())
        .nest("/carts", carts::router())
        .nest("/orders", orders::router())
        .nest("/reviews", reviews::router())
        .nest("/admin", events::router())
}

pub fn health_router() -> Router {
    Router::new().route("/health", get(system::health))
}
