//! Axeshift Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes the clock, telemetry and configuration → returns what the
//! fleet should be running.
//!
//! # Components
//!
//! - **Period**: wall-clock time → day/night
//! - **Settings**: device + period → clamped target settings
//! - **Safety**: telemetry vs. ceilings → verdict
//! - **Transition**: current → target as interpolated steps

#![warn(clippy::all)]

pub mod period;
pub mod safety;
pub mod settings;
pub mod transition;

pub use period::{resolve_period, Clock, FixedClock, LocalClock};
pub use safety::{check_safety, SafetyVerdict, SafetyViolation};
pub use settings::{clamp_to_limits, resolve_target};
pub use transition::plan_transition;
