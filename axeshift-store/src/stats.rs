//! Stats Aggregator: running per-device, per-period sums.
//!
//! Safe to call from concurrent poll tasks. The lock is held only for the
//! increment, never across I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use axeshift_domain::{DeviceId, Period, Telemetry};

use crate::snapshot::PeriodPerformance;

#[derive(Debug, Clone, Copy, Default)]
struct PeriodStats {
    hashrate_sum: f64,
    power_sum: f64,
    samples: u64,
}

impl PeriodStats {
    fn performance(&self) -> PeriodPerformance {
        if self.samples == 0 {
            return PeriodPerformance::default();
        }
        let n = self.samples as f64;
        PeriodPerformance {
            average_hashrate: self.hashrate_sum / n,
            average_power: self.power_sum / n,
            sample_count: self.samples,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceStats {
    day: PeriodStats,
    night: PeriodStats,
}

impl DeviceStats {
    fn period_mut(&mut self, period: Period) -> &mut PeriodStats {
        match period {
            Period::Day => &mut self.day,
            Period::Night => &mut self.night,
        }
    }

    fn period(&self, period: Period) -> &PeriodStats {
        match period {
            Period::Day => &self.day,
            Period::Night => &self.night,
        }
    }
}

/// Accumulated hashrate and power samples for the whole fleet.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    devices: Mutex<HashMap<DeviceId, DeviceStats>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one telemetry sample under `period`.
    pub fn record(&self, device: &DeviceId, period: Period, telemetry: &Telemetry) {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let stats = devices.entry(device.clone()).or_default().period_mut(period);
        stats.hashrate_sum += telemetry.hashrate;
        stats.power_sum += telemetry.power;
        stats.samples += 1;
    }

    /// Averages for one device and period. Zero when nothing was recorded.
    pub fn performance(&self, device: &DeviceId, period: Period) -> PeriodPerformance {
        let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices
            .get(device)
            .map(|stats| stats.period(period).performance())
            .unwrap_or_default()
    }

    /// Averages for every period of one device, both periods always present.
    pub fn device_performance(&self, device: &DeviceId) -> BTreeMap<Period, PeriodPerformance> {
        let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let stats = devices.get(device);
        Period::ALL
            .iter()
            .map(|period| {
                let performance = stats
                    .map(|s| s.period(*period).performance())
                    .unwrap_or_default();
                (*period, performance)
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
