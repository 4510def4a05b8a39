use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ulid::{Generator, Ulid};

use crate::{to_system_time, IdError};

/// Thread-safe monotonic ULID source.
///
/// Ids minted within the same millisecond increment the random component
/// instead of drawing fresh randomness, so a single generator never hands out
/// ids out of order.
pub struct IdGenerator {
    inner: Mutex<Generator>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    pub fn next_id(&self) -> Result<Ulid, IdError> {
        let mut generator = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        generator.generate().map_err(|_| IdError::Overflow)
    }

    /// Like [`next_id`](Self::next_id) but stamped with `at`.
    pub fn next_id_at(&self, at: DateTime<Utc>) -> Result<Ulid, IdError> {
        let mut generator = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        generator
            .generate_from_datetime(to_system_time(at))
            .map_err(|_| IdError::Overflow)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn same_millisecond_ids_are_strictly_increasing() {
        let generator = IdGenerator::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let ids: Vec<Ulid> = (0..100).map(|_| generator.next_id_at(at).unwrap()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].timestamp_ms(), pair[1].timestamp_ms());
        }
    }

    #[test]
    fn concurrent_callers_never_receive_duplicates() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..250).map(|_| generator.next_id().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<Ulid> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn stamped_ids_carry_their_timestamp(millis in 0i64..4_102_444_800_000i64) {
            let at = Utc.timestamp_millis_opt(millis).single().unwrap();
            let id = IdGenerator::new().next_id_at(at).unwrap();
            prop_assert_eq!(id.timestamp_ms() as i64, millis);
        }
    }
}
