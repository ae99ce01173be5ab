//! Stub implementations for testing.
//!
//! Simulates a fleet of devices in memory without making real API calls.
//! Each device can be scripted to go offline, fail writes, or hang on reads.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use axeshift_domain::{Megahertz, Millivolts, Settings, Telemetry};

use crate::error::ExecError;
use crate::ports::DevicePort;

// =============================================================================
// Call Log
// =============================================================================

/// A request observed by the stub, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    ReadStatus { address: String },
    WriteVoltage { address: String, voltage: Millivolts },
    WriteFrequency { address: String, frequency: Megahertz },
    Restart { address: String },
}

impl DeviceCall {
    /// Address the call was made against.
    pub fn address(&self) -> &str {
        match self {
            DeviceCall::ReadStatus { address }
            | DeviceCall::WriteVoltage { address, .. }
            | DeviceCall::WriteFrequency { address, .. }
            | DeviceCall::Restart { address } => address,
        }
    }

    /// True for voltage or frequency writes.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            DeviceCall::WriteVoltage { .. } | DeviceCall::WriteFrequency { .. }
        )
    }
}

// =============================================================================
// Stub Device Port
// =============================================================================

#[derive(Debug, Clone)]
struct StubDevice {
    telemetry: Telemetry,
    offline: bool,
    /// Remaining writes to reject
    failing_writes: u32,
    /// Delay before answering status reads
    read_delay: Option<Duration>,
    restarts: u32,
}

/// Stub device port for testing.
///
/// Writes update the live settings reported by subsequent reads. Unknown
/// addresses behave like an unreachable host.
pub struct StubDevicePort {
    devices: RwLock<HashMap<String, StubDevice>>,
    calls: RwLock<Vec<DeviceCall>>,
}

impl StubDevicePort {
    /// Create an empty stub fleet.
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Register a reachable device running `settings`.
    pub fn add_device(&self, address: &str, settings: Settings) {
        let telemetry = Telemetry {
            hashrate: 500.0,
            temperature: 55.0,
            power: 12.0,
            voltage: Some(settings.voltage),
            frequency: Some(settings.frequency),
        };
        self.devices.write().unwrap().insert(
            address.to_string(),
            StubDevice {
                telemetry,
                offline: false,
                failing_writes: 0,
                read_delay: None,
                restarts: 0,
            },
        );
    }

    /// Set the hashrate, temperature and power a device reports.
    pub fn set_readings(&self, address: &str, hashrate: f64, temperature: f64, power: f64) {
        self.with_device(address, |device| {
            device.telemetry.hashrate = hashrate;
            device.telemetry.temperature = temperature;
            device.telemetry.power = power;
        });
    }

    /// Make every request to the device fail with a transport error.
    pub fn set_offline(&self, address: &str, offline: bool) {
        self.with_device(address, |device| device.offline = offline);
    }

    /// Reject the next `count` writes to the device.
    pub fn fail_next_writes(&self, address: &str, count: u32) {
        self.with_device(address, |device| device.failing_writes = count);
    }

    /// Delay status reads by `delay` (simulates a hung device).
    pub fn set_read_delay(&self, address: &str, delay: Option<Duration>) {
        self.with_device(address, |device| device.read_delay = delay);
    }

    /// Settings the device is currently running.
    pub fn live_settings(&self, address: &str) -> Option<Settings> {
        let devices = self.devices.read().unwrap();
        let telemetry = &devices.get(address)?.telemetry;
        telemetry.active_settings()
    }

    /// Number of accepted restart requests.
    pub fn restart_count(&self, address: &str) -> u32 {
        let devices = self.devices.read().unwrap();
        devices.get(address).map(|d| d.restarts).unwrap_or(0)
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.read().unwrap().clone()
    }

    /// Writes made against one address, in order.
    pub fn writes_for(&self, address: &str) -> Vec<DeviceCall> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|call| call.address() == address && call.is_write())
            .cloned()
            .collect()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn with_device(&self, address: &str, f: impl FnOnce(&mut StubDevice)) {
        if let Some(device) = self.devices.write().unwrap().get_mut(address) {
            f(device);
        }
    }

    fn record(&self, call: DeviceCall) {
        self.calls.write().unwrap().push(call);
    }

    /// Check reachability and consume one scripted write failure.
    fn admit_write(&self, address: &str) -> Result<(), ExecError> {
        let mut devices = self.devices.write().unwrap();
        let device = devices.get_mut(address).ok_or_else(|| unreachable(address))?;

        if device.offline {
            return Err(unreachable(address));
        }
        if device.failing_writes > 0 {
            device.failing_writes -= 1;
            return Err(ExecError::Rejected {
                status: 500,
                body: "simulated write failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for StubDevicePort {
    fn default() -> Self {
        Self::new()
    }
}

fn unreachable(address: &str) -> ExecError {
    ExecError::Transport(format!("connection refused: {}", address))
}

#[async_trait]
impl DevicePort for StubDevicePort {
    async fn read_status(&self, address: &str) -> Result<Telemetry, ExecError> {
        self.record(DeviceCall::ReadStatus {
            address: address.to_string(),
        });

        let delay = {
            let devices = self.devices.read().unwrap();
            devices.get(address).and_then(|d| d.read_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let devices = self.devices.read().unwrap();
        match devices.get(address) {
            Some(device) if !device.offline => Ok(device.telemetry),
            _ => Err(unreachable(address)),
        }
    }

    async fn write_voltage(&self, address: &str, voltage: Millivolts) -> Result<(), ExecError> {
        self.record(DeviceCall::WriteVoltage {
            address: address.to_string(),
            voltage,
        });
        self.admit_write(address)?;
        self.with_device(address, |device| device.telemetry.voltage = Some(voltage));
        Ok(())
    }

    async fn write_frequency(
        &self,
        address: &str,
        frequency: Megahertz,
    ) -> Result<(), ExecError> {
        self.record(DeviceCall::WriteFrequency {
            address: address.to_string(),
            frequency,
        });
        self.admit_write(address)?;
        self.with_device(address, |device| device.telemetry.frequency = Some(frequency));
        Ok(())
    }

    async fn restart(&self, address: &str) -> Result<(), ExecError> {
        self.record(DeviceCall::Restart {
            address: address.to_string(),
        });

        let mut devices = self.devices.write().unwrap();
        match devices.get_mut(address) {
            Some(device) if !device.offline => {
                device.restarts += 1;
                Ok(())
            }
            _ => Err(unreachable(address)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
