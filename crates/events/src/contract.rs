//! Wire contract for domain events.
//!
//! Every event enum is serialized with an `"@type"` property naming its
//! variant, so a consumer holding only the JSON can tell which event it has
//! before choosing a concrete type:
//!
//! ```json
//! {"@type": "ItemAdded", "cart_id": "01HZ...", "occurred_at": "2024-05-01T10:00:00Z", ...}
//! ```
//!
//! Enums opt in with `#[serde(tag = "@type")]`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const TYPE_TAG: &str = "@type";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("event payload has no \"@type\" tag")]
    MissingTypeTag,

    #[error(transparent)]
    Serializer(#[from] commerce_serializer::SerializerError),
}

/// Encode an event, insisting on the type tag.
pub fn encode<E: Serialize>(event: &E) -> Result<JsonValue, ContractError> {
    let value = commerce_serializer::to_value(event)?;
    if type_of(&value).is_none() {
        return Err(ContractError::MissingTypeTag);
    }
    Ok(value)
}

pub fn decode<E: DeserializeOwned>(payload: &JsonValue) -> Result<E, ContractError> {
    if type_of(payload).is_none() {
        return Err(ContractError::MissingTypeTag);
    }
    Ok(commerce_serializer::from_value(payload.clone())?)
}

/// Variant name carried by an encoded event.
pub fn type_of(payload: &JsonValue) -> Option<&str> {
    payload.get(TYPE_TAG).and_then(JsonValue::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Opened {
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "@type")]
    enum Tagged {
        Opened(Opened),
        Closed,
    }

    #[derive(Debug, Serialize)]
    struct Untagged {
        name: String,
    }

    #[test]
    fn tagged_enums_carry_the_variant_name() {
        let value = encode(&Tagged::Opened(Opened { name: "a".into() })).unwrap();
        assert_eq!(type_of(&value), Some("Opened"));
        assert_eq!(value["name"], "a");

        let back: Tagged = decode(&value).unwrap();
        assert_eq!(back, Tagged::Opened(Opened { name: "a".into() }));
        assert_eq!(type_of(&encode(&Tagged::Closed).unwrap()), Some("Closed"));
    }

    #[test]
    fn untagged_payloads_are_rejected() {
        assert_eq!(
            encode(&Untagged { name: "a".into() }),
            Err(ContractError::MissingTypeTag)
        );
        assert_eq!(
            decode::<Tagged>(&serde_json::json!({"name": "a"})),
            Err(ContractError::MissingTypeTag)
        );
    }

    #[test]
    fn unknown_variants_fail_to_decode() {
        let err = decode::<Tagged>(&serde_json::json!({"@type": "Exploded"})).unwrap_err();
        assert!(matches!(err, ContractError::Serializer(_)));
    }
}
