//! Safety evaluation of live telemetry.
//!
//! Strictly greater than the ceiling is a violation; exactly at the ceiling is safe.
//! Temperature is checked before power.

use std::fmt;

use axeshift_domain::{SafetyLimits, Telemetry};

/// Which ceiling was breached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyViolation {
    /// Temperature above `max_temperature`
    Temperature { observed: f64, limit: f64 },
    /// Power above `max_power`
    Power { observed: f64, limit: f64 },
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyViolation::Temperature { observed, limit } => {
                write!(f, "temperature too high: {observed:.1}°C > {limit:.1}°C")
            }
            SafetyViolation::Power { observed, limit } => {
                write!(f, "power too high: {observed:.2}W > {limit:.2}W")
            }
        }
    }
}

/// Outcome of a safety check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyVerdict {
    Safe,
    Violation(SafetyViolation),
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, SafetyVerdict::Safe)
    }
}

/// Evaluate one telemetry sample against the ceilings.
pub fn check_safety(telemetry: &Telemetry, limits: &SafetyLimits) -> SafetyVerdict {
    if telemetry.temperature > limits.max_temperature {
        return SafetyVerdict::Violation(SafetyViolation::Temperature {
            observed: telemetry.temperature,
            limit: limits.max_temperature,
        });
    }

    if telemetry.power > limits.max_power {
        return SafetyVerdict::Violation(SafetyViolation::Power {
            observed: telemetry.power,
            limit: limits.max_power,
        });
    }

    SafetyVerdict::Safe
}

// =============================================================================
// Tests
// =============================================================================
