//! `commerce-idgen`: ULID minting and inspection.
//!
//! Identifiers are 26-character Crockford base32 ULIDs: a 48-bit millisecond
//! timestamp followed by 80 bits of randomness. They sort lexicographically in
//! creation order, which keeps event streams and read models naturally ordered.

mod generator;

pub use generator::IdGenerator;
pub use ulid::Ulid;

use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Length of the binary ULID representation.
pub const ULID_BYTES: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid ulid: {0}")]
    Invalid(String),

    #[error("expected {ULID_BYTES} bytes, got {0}")]
    Length(usize),

    #[error("monotonic generator exhausted for the current millisecond")]
    Overflow,
}

static PROCESS_GENERATOR: LazyLock<IdGenerator> = LazyLock::new(IdGenerator::new);

/// Next id from the process-wide monotonic generator.
///
/// Ids minted by one process strictly increase. If the current millisecond's
/// random space is exhausted a fresh random id is drawn instead.
pub fn next_ulid() -> Ulid {
    PROCESS_GENERATOR.next_id().unwrap_or_else(|_| Ulid::new())
}

/// A ULID whose timestamp component is `at` (millisecond precision).
///
/// Instants before the Unix epoch clamp to the epoch.
pub fn ulid_at(at: DateTime<Utc>) -> Ulid {
    Ulid::from_datetime(to_system_time(at))
}

/// Mint a fresh ULID string.
pub fn generate() -> String {
    next_ulid().to_string()
}

/// String form of [`ulid_at`].
pub fn generate_at(at: DateTime<Utc>) -> String {
    ulid_at(at).to_string()
}

/// Timestamp encoded in a ULID string.
pub fn extract_timestamp(ulid: &str) -> Result<DateTime<Utc>, IdError> {
    let parsed = parse(ulid)?;
    let millis = i64::try_from(parsed.timestamp_ms())
        .map_err(|_| IdError::Invalid(format!("timestamp out of range: {ulid}")))?;

    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| IdError::Invalid(format!("timestamp out of range: {ulid}")))
}

pub fn is_valid(ulid: &str) -> bool {
    parse(ulid).is_ok()
}

/// Binary storage form of a ULID string.
pub fn to_bytes(ulid: &str) -> Result<[u8; ULID_BYTES], IdError> {
    Ok(parse(ulid)?.to_bytes())
}

/// Inverse of [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<String, IdError> {
    let raw: [u8; ULID_BYTES] = bytes
        .try_into()
        .map_err(|_| IdError::Length(bytes.len()))?;
    Ok(Ulid::from_bytes(raw).to_string())
}

/// Parse a ULID string (case-insensitive).
pub fn parse(ulid: &str) -> Result<Ulid, IdError> {
    Ulid::from_string(ulid).map_err(|e| IdError::Invalid(format!("{ulid}: {e}")))
}

pub(crate) fn to_system_time(at: DateTime<Utc>) -> SystemTime {
    let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
    UNIX_EPOCH + Duration::from_millis(millis)
}
