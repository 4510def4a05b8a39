//! Strongly-typed identifiers.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use commerce_idgen::Ulid;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an aggregate root (one event stream per id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Ulid);

/// Identifier of a single stored event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

macro_rules! impl_ulid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Mint a new time-ordered identifier.
            pub fn new() -> Self {
                Self(commerce_idgen::next_ulid())
            }

            /// Mint an identifier stamped with `at`; handy for deterministic tests.
            pub fn new_at(at: DateTime<Utc>) -> Self {
                Self(commerce_idgen::ulid_at(at))
            }

            pub fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            pub fn as_ulid(&self) -> &Ulid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Ulid> for $t {
            fn from(value: Ulid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Ulid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = commerce_idgen::parse(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(ulid))
            }
        }
    };
}

impl_ulid_newtype!(AggregateId, "AggregateId");
impl_ulid_newtype!(EventId, "EventId");

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn display_and_parse_round_trip() {
        let id = AggregateId::new();
        let parsed: AggregateId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_failure_names_the_id_type() {
        match "nope".parse::<AggregateId>() {
            Err(DomainError::InvalidId(msg)) => assert!(msg.starts_with("AggregateId")),
            other => panic!("Expected InvalidId, got {other:?}"),
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = AggregateId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn ids_minted_in_sequence_sort_in_sequence() {
        let ids: Vec<AggregateId> = (0..500).map(|_| AggregateId::new()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn ids_stamped_later_sort_later() {
        let a = AggregateId::new_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let b = AggregateId::new_at(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(a < b);
    }
}
