//! `commerce-serializer`: JSON encoding shared by caches, read-model storage
//! and event payloads.
//!
//! Dates travel as RFC 3339 strings (chrono's serde representation) and
//! unknown fields are ignored on the way in, so older readers tolerate newer
//! documents.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializerError {
    #[error("serialization failed: {0}")]
    Serialize(String),

    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

pub type SerializerResult<T> = Result<T, SerializerError>;

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> SerializerResult<String> {
    serde_json::to_string(value).map_err(|e| {
        tracing::warn!(error = %e, "failed to serialize value");
        SerializerError::Serialize(e.to_string())
    })
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> SerializerResult<T> {
    serde_json::from_str(json).map_err(|e| {
        tracing::warn!(error = %e, "failed to deserialize json document");
        SerializerError::Deserialize(e.to_string())
    })
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> SerializerResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        tracing::warn!(error = %e, "failed to serialize value");
        SerializerError::Serialize(e.to_string())
    })
}

pub fn from_value<T: DeserializeOwned>(value: Value) -> SerializerResult<T> {
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(error = %e, "failed to deserialize json value");
        SerializerError::Deserialize(e.to_string())
    })
}

/// Re-shape one serializable value into another type with a compatible
/// JSON form (e.g. a request body into a domain snapshot).
pub fn convert<T, U>(value: &T) -> SerializerResult<U>
where
    T: Serialize + ?Sized,
    U: DeserializeOwned,
{
    from_value(to_value(value)?)
}
