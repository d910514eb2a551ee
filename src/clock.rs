//! Time source and day arithmetic

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

const DAY_MS: i64 = 86_400_000;

/// Source of the current time, injected so tests can pin it
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `ceil(elapsed_ms / 1 day)`
pub fn ceil_days(elapsed: Duration) -> i64 {
    -(-elapsed.num_milliseconds()).div_euclid(DAY_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_days() {
        assert_eq!(ceil_days(Duration::zero()), 0);
        assert_eq!(ceil_days(Duration::milliseconds(1)), 1);
        assert_eq!(ceil_days(Duration::days(1)), 1);
        assert_eq!(ceil_days(Duration::days(8)), 8);
        assert_eq!(ceil_days(Duration::days(1) + Duration::seconds(1)), 2);
        assert_eq!(ceil_days(Duration::hours(-12)), 0);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(Duration::days(2));
        assert_eq!(clock.now(), start + Duration::days(2));
    }
}
