use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use commerce_core::DomainError;
use commerce_infra::command_dispatcher::DispatchError;
use commerce_purchasing::{PortError, UseCaseError};

use crate::app::services::CommandError;

/// A ready-made error response, so handlers can use `?`.
#[derive(Debug)]
pub struct ApiError(Response);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0
    }
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self(json_error(status, code, message))
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
    }

    pub fn invalid_id(what: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(dispatch_error_to_response(err))
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(dispatch_error_to_response(err.into()))
    }
}

impl From<UseCaseError> for ApiError {
    fn from(err: UseCaseError) -> Self {
        match err {
            UseCaseError::Domain(e) => e.into(),
            UseCaseError::Port(PortError::InsufficientStock { sku }) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "CART_006",
                format!("Insufficient stock: {sku}"),
            ),
            UseCaseError::Port(PortError::Unavailable(msg)) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "dependency_unavailable", msg)
            }
            UseCaseError::Port(PortError::Rejected(e)) => e.into(),
        }
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Dispatch(e) => e.into(),
            CommandError::UseCase(e) => e.into(),
        }
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Rule { code, message } => json_error(StatusCode::UNPROCESSABLE_ENTITY, code, message),
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "not allowed"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event failed to decode");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_failed", msg),
    }
}

pub fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code.into(),
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn dispatch_errors_map_to_statuses() {
        assert_eq!(status_of(DispatchError::Concurrency("stale".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(DispatchError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DispatchError::InvariantViolation("no".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(DispatchError::Unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(status_of(DispatchError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(DispatchError::Publish("down".into())), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn rule_codes_become_error_codes() {
        let err = DomainError::rule("CART_002", "Cart item limit exceeded");
        assert_eq!(status_of(err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn port_errors_map_to_stock_and_availability() {
        let short = UseCaseError::Port(PortError::InsufficientStock { sku: "S".into() });
        assert_eq!(status_of(short), StatusCode::UNPROCESSABLE_ENTITY);
        let down = UseCaseError::Port(PortError::Unavailable("redis".into()));
        assert_eq!(status_of(down), StatusCode::SERVICE_UNAVAILABLE);
        let invalid = UseCaseError::Domain(DomainError::invalid_id("x"));
        assert_eq!(status_of(invalid), StatusCode::BAD_REQUEST);
    }
}
