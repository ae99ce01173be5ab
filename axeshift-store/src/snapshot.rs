//! Serializable statistics snapshot.
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T20:00:00Z",
//!   "devices": {
//!     "bitaxe1": {
//!       "address": "http://192.168.1.100",
//!       "online": true,
//!       "last_update": "2024-05-01T19:59:12Z",
//!       "periods": {
//!         "day": { "average_hashrate": 498.2, "average_power": 12.4, "sample_count": 720 },
//!         "night": { "average_hashrate": 0.0, "average_power": 0.0, "sample_count": 0 }
//!       }
//!     }
//!   }
//! }
//! ```

use axeshift_domain::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Average performance of one device over one period.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodPerformance {
    /// Mean hashrate in GH/s (0 without samples)
    pub average_hashrate: f64,
    /// Mean power in watts (0 without samples)
    pub average_power: f64,
    pub sample_count: u64,
}

/// Per-device section of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub address: String,
    pub online: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub periods: BTreeMap<Period, PeriodPerformance>,
}

/// Fleet statistics at a point in time, keyed by device name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub devices: BTreeMap<String, DeviceSnapshot>,
}

impl StatsSnapshot {
    /// Empty snapshot taken at `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            devices: BTreeMap::new(),
        }
    }

    /// Add or replace a device section.
    pub fn insert(&mut self, name: impl Into<String>, device: DeviceSnapshot) {
        self.devices.insert(name.into(), device);
    }
}
