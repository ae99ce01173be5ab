//! Domain Entities
//!
//! The managed device record and the profiles it can be driven to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{DomainError, Period, Settings, TimeWindow};

// =============================================================================
// Device Identity
// =============================================================================

/// Unique device name, stable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identity
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDevice` if the name is blank
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::InvalidDevice("Device name must not be empty".to_string()));
        }
        Ok(Self(name))
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Profiles
// =============================================================================

/// Settings pair plus the window during which it is nominally active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    /// Target settings
    pub settings: Settings,
    /// Local time window
    pub window: TimeWindow,
}

/// Global day and night profiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSet {
    /// Day profile; its window decides the period
    pub day: Profile,
    /// Night profile
    pub night: Profile,
}

impl ProfileSet {
    /// Profile for a period
    pub fn for_period(&self, period: Period) -> &Profile {
        match period {
            Period::Day => &self.day,
            Period::Night => &self.night,
        }
    }

    /// Window that defines "day"
    pub fn day_window(&self) -> &TimeWindow {
        &self.day.window
    }
}

/// Per-device settings that supersede the global profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOverrides {
    /// Day override
    pub day: Option<Settings>,
    /// Night override
    pub night: Option<Settings>,
}

impl DeviceOverrides {
    /// Override for a period, if any
    pub fn for_period(&self, period: Period) -> Option<Settings> {
        match period {
            Period::Day => self.day,
            Period::Night => self.night,
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// A managed device and everything the control loop knows about it.
///
/// Created from configuration at startup and never removed; disabled
/// devices stay in the fleet but are skipped.
#[derive(Debug, Clone)]
pub struct Device {
    /// Unique name
    pub id: DeviceId,
    /// Base URL of the device API (e.g. `http://192.168.1.100`)
    pub address: String,
    /// Whether the control loop manages this device
    pub enabled: bool,
    /// Result of the last device call
    pub online: bool,
    /// Settings last written successfully
    pub last_settings: Option<Settings>,
    /// When `last_settings` was written
    pub last_update: Option<DateTime<Utc>>,
    /// Failed calls since the last successful status read
    pub error_count: u32,
    /// Period whose profile the device was last driven to
    pub current_period: Option<Period>,
    /// Device-specific profile settings
    pub overrides: DeviceOverrides,
    /// Set after a restart; polls skip the device until then
    pub rebooting_until: Option<DateTime<Utc>>,
}

impl Device {
    /// Create a device from configuration. Starts offline with no known settings.
    pub fn new(id: DeviceId, address: impl Into<String>, enabled: bool) -> Self {
        Self {
            id,
            address: address.into(),
            enabled,
            online: false,
            last_settings: None,
            last_update: None,
            error_count: 0,
            current_period: None,
            overrides: DeviceOverrides::default(),
            rebooting_until: None,
        }
    }

    /// Attach per-device overrides.
    pub fn with_overrides(mut self, overrides: DeviceOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Record a successful status read.
    pub fn mark_online(&mut self) {
        self.online = true;
        self.error_count = 0;
    }

    /// Record a failed device call.
    pub fn record_error(&mut self) {
        self.online = false;
        self.error_count = self.error_count.saturating_add(1);
    }

    /// Record a successful settings write.
    pub fn record_applied(&mut self, settings: Settings, at: DateTime<Utc>) {
        self.last_settings = Some(settings);
        self.last_update = Some(at);
    }

    /// Whether the last written settings already equal `target`.
    pub fn is_at(&self, target: Settings) -> bool {
        self.last_settings == Some(target)
    }

    /// Mark the device as rebooting until `until`.
    pub fn begin_reboot(&mut self, until: DateTime<Utc>) {
        self.rebooting_until = Some(until);
    }

    /// Whether the reboot grace period is still running at `now`.
    ///
    /// Clears the marker once it has expired.
    pub fn is_rebooting(&mut self, now: DateTime<Utc>) -> bool {
        match self.rebooting_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.rebooting_until = None;
                false
            }
            None => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
