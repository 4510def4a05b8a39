//! Domain error model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failures. Infrastructure errors live elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The aggregate's current state forbids the operation.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// Duplicate creation or a stale stream version.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller does not own the resource.
    #[error("unauthorized")]
    Unauthorized,

    /// A business rule with a stable, client-facing code (e.g. `CART_002`).
    #[error("{code}: {message}")]
    Rule { code: String, message: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn rule(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rule {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable code for coded rule failures.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rule { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_errors_expose_their_code() {
        let err = DomainError::rule("CART_002", "Cart item limit exceeded");
        assert_eq!(err.code(), Some("CART_002"));
        assert_eq!(err.to_string(), "CART_002: Cart item limit exceeded");
        assert_eq!(DomainError::not_found().code(), None);
    }
}
