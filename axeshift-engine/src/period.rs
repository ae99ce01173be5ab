//! Period resolution.
//!
//! The day window alone decides the period: inside it (inclusive) is day,
//! everything else is night.

use std::sync::Mutex;

use axeshift_domain::{Period, TimeWindow};
use chrono::{Local, NaiveTime};

/// Map a time of day to the active period.
pub fn resolve_period(now: NaiveTime, day_window: &TimeWindow) -> Period {
    if day_window.contains(now) {
        Period::Day
    } else {
        Period::Night
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the local time of day.
pub trait Clock: Send + Sync {
    /// Current local time of day
    fn now(&self) -> NaiveTime;
}

/// Wall clock in the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<NaiveTime>,
}

impl FixedClock {
    /// Create a clock stuck at `time`.
    pub fn new(time: NaiveTime) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Create a clock at `hour:minute`. Out-of-range input falls back to midnight.
    pub fn at(hour: u32, minute: u32) -> Self {
        Self::new(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
    }

    /// Move the clock.
    pub fn set(&self, time: NaiveTime) {
        let mut current = self.time.lock().unwrap_or_else(|e| e.into_inner());
        *current = time;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        *self.time.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================
