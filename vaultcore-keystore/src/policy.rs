//! Rotation schedule: how long a key version stays current.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand_core::OsRng;

use crate::error::KeyStoreError;

pub const SECONDS_PER_DAY: i64 = 86_400;

pub const DEFAULT_MIN_ROTATION_DAYS: u32 = 30;
pub const DEFAULT_MAX_ROTATION_DAYS: u32 = 90;

/// Randomized rotation window in whole days.
///
/// Every (re)generated `next_rotation` lands uniformly at random in
/// `[now + min_days, now + max_days]`, at one-second granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RotationSchedule {
    min_days: u32,
    max_days: u32,
}

impl RotationSchedule {
    pub fn new(min_days: u32, max_days: u32) -> Result<Self, KeyStoreError> {
        if max_days == 0 || min_days > max_days {
            return Err(KeyStoreError::KeyManagement(format!(
                "invalid rotation window: {}..={} days",
                min_days, max_days
            )));
        }
        Ok(Self { min_days, max_days })
    }

    pub fn min_days(&self) -> u32 {
        self.min_days
    }

    pub fn max_days(&self) -> u32 {
        self.max_days
    }

    /// Earliest and latest admissible rotation instants relative to `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + Duration::seconds(self.min_days as i64 * SECONDS_PER_DAY),
            now + Duration::seconds(self.max_days as i64 * SECONDS_PER_DAY),
        )
    }

    /// Draw the next rotation instant.
    pub fn next_rotation(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let min_secs = self.min_days as i64 * SECONDS_PER_DAY;
        let max_secs = self.max_days as i64 * SECONDS_PER_DAY;
        let offset = OsRng.gen_range(min_secs..=max_secs);
        now + Duration::seconds(offset)
    }
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self {
            min_days: DEFAULT_MIN_ROTATION_DAYS,
            max_days: DEFAULT_MAX_ROTATION_DAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_window() {
        assert!(RotationSchedule::new(10, 5).is_err());
        assert!(RotationSchedule::new(0, 0).is_err());
        assert!(RotationSchedule::new(0, 1).is_ok());
        assert!(RotationSchedule::new(7, 7).is_ok());
    }

    #[test]
    fn test_next_rotation_within_window() {
        let schedule = RotationSchedule::new(3, 5).unwrap();
        let now = Utc::now();
        let (earliest, latest) = schedule.window(now);
        for _ in 0..500 {
            let next = schedule.next_rotation(now);
            assert!(next >= earliest && next <= latest, "{} outside window", next);
        }
    }

    #[test]
    fn test_fixed_window_is_exact() {
        let schedule = RotationSchedule::new(2, 2).unwrap();
        let now = Utc::now();
        assert_eq!(schedule.next_rotation(now), now + Duration::days(2));
    }
}
