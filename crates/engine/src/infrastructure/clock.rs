//! Clock and random implementations.

use crate::infrastructure::ports::{ClockPort, RandomPort};
use chrono::{DateTime, Utc};

/// System clock - uses real time.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: u64, max: u64) -> u64 {
        use rand::Rng;
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Fixed clock for testing.
#[cfg(test)]
#[derive(Clone)]
pub struct FixedClock(pub std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>);

#[cfg(test)]
impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(std::sync::Arc::new(std::sync::Mutex::new(instant)))
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut guard = self.0.lock().expect("clock poisoned");
        *guard += chrono::Duration::milliseconds(ms);
    }
}

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("clock poisoned")
    }
}

/// Fixed random for testing - always returns `min + offset` (clamped).
#[cfg(test)]
pub struct FixedRandom(pub u64);

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn gen_range(&self, min: u64, max: u64) -> u64 {
        (min + self.0).min(max)
    }
}
