//! A deterministic clock, for tests that assert on `append_time` or other
//! timestamp-derived values.

use chrono::{DateTime, TimeZone, Utc};

/// Something that can report the current time. [`InMemoryLss`](crate::InMemoryLss)
/// takes one instead of calling `Utc::now()` directly so append timestamps
/// are reproducible in tests.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock, for production wiring.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// A fixed clock at the given instant.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Default for FixedClock {
    // 2025-01-01T00:00:00Z is a fixed, valid calendar date; `single()`
    // cannot return `None` for it.
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .expect("2025-01-01T00:00:00Z is a valid timestamp"),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
