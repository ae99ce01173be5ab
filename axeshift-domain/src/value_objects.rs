//! Value Objects for the Axeshift Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Voltage must be positive
    #[error("Invalid voltage: {0}")]
    InvalidVoltage(String),

    /// Frequency must be positive
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    /// Time of day must be `HH:MM`
    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    /// Safety limit must be positive
    #[error("Invalid safety limit: {0}")]
    InvalidLimit(String),

    /// Device definition is unusable
    #[error("Invalid device: {0}")]
    InvalidDevice(String),
}

// =============================================================================
// Millivolts
// =============================================================================

/// Core voltage in millivolts.
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millivolts(u32);

impl Millivolts {
    /// Create a new voltage with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidVoltage` if value is 0
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::InvalidVoltage("Voltage must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the raw millivolt value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Millivolts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mV", self.0)
    }
}

// =============================================================================
// Megahertz
// =============================================================================

/// ASIC clock frequency in MHz.
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Megahertz(u32);

impl Megahertz {
    /// Create a new frequency with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFrequency` if value is 0
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::InvalidFrequency("Frequency must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the raw MHz value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Megahertz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MHz", self.0)
    }
}

// =============================================================================
// Settings
// =============================================================================

/// A voltage/frequency pair applied to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Settings {
    /// Core voltage
    pub voltage: Millivolts,
    /// ASIC frequency
    pub frequency: Megahertz,
}

impl Settings {
    /// Create a settings pair from already validated parts
    pub fn new(voltage: Millivolts, frequency: Megahertz) -> Self {
        Self { voltage, frequency }
    }

    /// Create a settings pair from raw values
    ///
    /// # Errors
    /// Returns an error if either value is 0
    pub fn from_raw(voltage_mv: u32, frequency_mhz: u32) -> Result<Self, DomainError> {
        Ok(Self {
            voltage: Millivolts::new(voltage_mv)?,
            frequency: Megahertz::new(frequency_mhz)?,
        })
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.voltage, self.frequency)
    }
}

// =============================================================================
// Time Window
// =============================================================================

/// Local time-of-day window, inclusive at both ends.
///
/// A window whose start is after its end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    /// Create a window from two times of day
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a window from two `HH:MM` strings
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTime` if either string is malformed
    pub fn parse(start: &str, end: &str) -> Result<Self, DomainError> {
        Ok(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
        })
    }

    /// Window start
    pub fn start(&self) -> NaiveTime {
        self.start
    }

    /// Window end
    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether the window crosses midnight
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `t` falls inside the window (both ends inclusive)
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.wraps_midnight() {
            t >= self.start || t <= self.end
        } else {
            self.start <= t && t <= self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime, DomainError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| DomainError::InvalidTime(format!("{value:?}, expected HH:MM")))
}

// =============================================================================
// Period
// =============================================================================

/// Scheduler mode derived from wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Inside the configured day window (also the conservative profile)
    Day,
    /// Everything outside the day window
    Night,
}

impl Period {
    /// Both periods, in display order
    pub const ALL: [Period; 2] = [Period::Day, Period::Night];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Night => "night",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Safety Limits
// =============================================================================

/// Fleet-wide ceilings.
///
/// # Invariants
/// - All ceilings are > 0
/// - No applied device setting may exceed `max_voltage` / `max_frequency`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyLimits {
    /// Highest voltage any device may run
    pub max_voltage: Millivolts,
    /// Highest frequency any device may run
    pub max_frequency: Megahertz,
    /// Temperature ceiling in °C
    pub max_temperature: f64,
    /// Power ceiling in watts
    pub max_power: f64,
}

impl SafetyLimits {
    /// Create validated limits
    ///
    /// # Errors
    /// Returns `DomainError::InvalidLimit` if a thermal or power ceiling is not positive
    pub fn new(
        max_voltage: Millivolts,
        max_frequency: Megahertz,
        max_temperature: f64,
        max_power: f64,
    ) -> Result<Self, DomainError> {
        if max_temperature.is_nan() || max_temperature <= 0.0 {
            return Err(DomainError::InvalidLimit(format!(
                "max temperature must be positive, got {max_temperature}"
            )));
        }
        if max_power.is_nan() || max_power <= 0.0 {
            return Err(DomainError::InvalidLimit(format!(
                "max power must be positive, got {max_power}"
            )));
        }
        Ok(Self {
            max_voltage,
            max_frequency,
            max_temperature,
            max_power,
        })
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// Point-in-time reading from one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Hashrate in GH/s
    pub hashrate: f64,
    /// ASIC temperature in °C
    pub temperature: f64,
    /// Power draw in watts
    pub power: f64,
    /// Currently active core voltage, if reported
    pub voltage: Option<Millivolts>,
    /// Currently active frequency, if reported
    pub frequency: Option<Megahertz>,
}

impl Telemetry {
    /// Energy efficiency in J/TH (0 when the device reports no hashrate)
    pub fn efficiency(&self) -> f64 {
        efficiency(self.power, self.hashrate)
    }

    /// Active settings, when the device reports both parts
    pub fn active_settings(&self) -> Option<Settings> {
        Some(Settings::new(self.voltage?, self.frequency?))
    }
}

/// Watts per TH/s for a hashrate given in GH/s.
pub fn efficiency(power_watts: f64, hashrate_ghs: f64) -> f64 {
    if hashrate_ghs > 0.0 {
        power_watts / (hashrate_ghs / 1000.0)
    } else {
        0.0
    }
}

// =============================================================================
// Tests
// =============================================================================
