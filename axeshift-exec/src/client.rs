//! Device Client: single-device operations with side effects on the device record.
//!
//! Every failed call marks the device offline and bumps its error count.
//! Only a successful status read brings it back online.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use axeshift_domain::{Device, Settings, Telemetry};

use crate::error::{ExecError, ExecResult};
use crate::ports::DevicePort;

/// How long a device is left alone after an accepted restart.
pub const RESTART_GRACE: Duration = Duration::from_secs(30);

// =============================================================================
// Retry Policy
// =============================================================================

/// Delay between failed apply attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// `base * 2^(n-1)` after the n-th failure
    Exponential { base: Duration },
}

impl Backoff {
    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base } => {
                let exponent = failed_attempt.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exponent)
            }
        }
    }
}

/// Bounded retry for settings writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed(delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub settings: Settings,
    /// Attempt that succeeded (1-based)
    pub attempts: u32,
}

// =============================================================================
// Device Client
// =============================================================================

/// Reads, writes and restarts one device at a time through a `DevicePort`.
pub struct DeviceClient<P: DevicePort> {
    port: Arc<P>,
    retry: RetryPolicy,
}

impl<P: DevicePort> DeviceClient<P> {
    /// Create a client over a shared port.
    pub fn new(port: Arc<P>, retry: RetryPolicy) -> Self {
        Self { port, retry }
    }

    /// The underlying port.
    pub fn port(&self) -> &Arc<P> {
        &self.port
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Read live telemetry. Success marks the device online and resets its error count.
    pub async fn read_status(&self, device: &mut Device) -> ExecResult<Telemetry> {
        match self.port.read_status(&device.address).await {
            Ok(telemetry) => {
                device.mark_online();
                debug!(
                    device = %device.id,
                    hashrate = telemetry.hashrate,
                    temperature = telemetry.temperature,
                    power = telemetry.power,
                    "Status read"
                );
                Ok(telemetry)
            }
            Err(e) => {
                device.record_error();
                error!(
                    device = %device.id,
                    error = %e,
                    error_count = device.error_count,
                    "Error fetching system info"
                );
                Err(e)
            }
        }
    }

    /// Write voltage then frequency, retrying the pair as a unit.
    ///
    /// Makes at most `attempts` attempts and sleeps only between attempts.
    /// A voltage failure skips the frequency write for that attempt.
    pub async fn apply_settings(
        &self,
        device: &mut Device,
        settings: Settings,
    ) -> ExecResult<ApplyReport> {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.write_pair(&device.address, settings).await {
                Ok(()) => {
                    device.record_applied(settings, Utc::now());
                    info!(
                        device = %device.id,
                        %settings,
                        attempt,
                        "Applied settings"
                    );
                    return Ok(ApplyReport {
                        settings,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    device.record_error();
                    warn!(
                        device = %device.id,
                        %settings,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Apply attempt failed"
                    );
                    last_error = e.to_string();

                    if attempt < attempts {
                        sleep(self.retry.backoff.delay(attempt)).await;
                    }
                }
            }
        }

        error!(
            device = %device.id,
            %settings,
            attempts,
            "Failed to apply settings, retries exhausted"
        );
        Err(ExecError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    /// Ask the device to reboot. Not retried.
    pub async fn restart(&self, device: &mut Device) -> ExecResult<()> {
        match self.port.restart(&device.address).await {
            Ok(()) => {
                info!(device = %device.id, "Restart initiated");
                Ok(())
            }
            Err(e) => {
                device.record_error();
                error!(device = %device.id, error = %e, "Restart request failed");
                Err(e)
            }
        }
    }

    async fn write_pair(&self, address: &str, settings: Settings) -> ExecResult<()> {
        self.port.write_voltage(address, settings.voltage).await?;
        self.port.write_frequency(address, settings.frequency).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{DeviceCall, StubDevicePort};
    use axeshift_domain::{DeviceId, Megahertz, Millivolts};

    const ADDR: &str = "http://10.0.0.1";

    fn settings(v: u32, f: u32) -> Settings {
        Settings::from_raw(v, f).unwrap()
    }

    fn device() -> Device {
        Device::new(DeviceId::new("bitaxe1").unwrap(), ADDR, true)
    }

    fn client(port: &Arc<StubDevicePort>) -> DeviceClient<StubDevicePort> {
        DeviceClient::new(port.clone(), RetryPolicy::fixed(3, Duration::from_secs(5)))
    }

    #[test]
    fn test_backoff_delays() {
        let fixed = Backoff::Fixed(Duration::from_secs(5));
        assert_eq!(fixed.delay(1), Duration::from_secs(5));
        assert_eq!(fixed.delay(3), Duration::from_secs(5));

        let exp = Backoff::Exponential {
            base: Duration::from_secs(1),
        };
        assert_eq!(exp.delay(1), Duration::from_secs(1));
        assert_eq!(exp.delay(2), Duration::from_secs(2));
        assert_eq!(exp.delay(4), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_read_status_marks_online() {
        let port = Arc::new(StubDevicePort::new());
        port.add_device(ADDR, settings(1150, 450));
        let client = client(&port);
        let mut device = device();
        device.error_count = 4;

        let telemetry = client.read_status(&mut device).await.unwrap();

        assert_eq!(telemetry.active_settings(), Some(settings(1150, 450)));
        assert!(device.online);
        assert_eq!(device.error_count, 0);
    }

    #[tokio::test]
    async fn test_read_status_failure_marks_offline() {
        let port = Arc::new(StubDevicePort::new());
        port.add_device(ADDR, settings(1150, 450));
        port.set_offline(ADDR, true);
        let client = client(&port);
        let mut device = device();
        device.online = true;

        assert!(client.read_status(&mut device).await.is_err());
        assert!(!device.online);
        assert_eq!(device.error_count, 1);
    }

    #[tokio::test]
    async fn test_apply_writes_voltage_before_frequency() {
        let port = Arc::new(StubDevicePort::new());
        port.add_device(ADDR, settings(1150, 450));
        let client = client(&port);
        let mut device = device();

        let report = client
            .apply_settings(&mut device, settings(1250, 550))
            .await
            .unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(device.last_settings, Some(settings(1250, 550)));
        assert!(device.last_update.is_some());
        assert_eq!(
            port.writes_for(ADDR),
            vec![
                DeviceCall::WriteVoltage {
                    address: ADDR.to_string(),
                    voltage: Millivolts::new(1250).unwrap()
                },
                DeviceCall::WriteFrequency {
                    address: ADDR.to_string(),
                    frequency: Megahertz::new(550).unwrap()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_retries_then_succeeds() {
        let port = Arc::new(StubDevicePort::new());
        port.add_device(ADDR, settings(1150, 450));
        port.fail_next_writes(ADDR, 2);
        let client = client(&port);
        let mut device = device();

        let started = tokio::time::Instant::now();
        let report = client
            .apply_settings(&mut device, settings(1250, 550))
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(device.error_count, 2);
        // Two failures, two sleeps
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(port.live_settings(ADDR), Some(settings(1250, 550)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_exhausts_retries_without_trailing_sleep() {
        let port = Arc::new(StubDevicePort::new());
        port.add_device(ADDR, settings(1150, 450));
        port.fail_next_writes(ADDR, 100);
        let client = client(&port);
        let mut device = device();

        let started = tokio::time::Instant::now();
        let result = client.apply_settings(&mut device, settings(1250, 550)).await;

        assert!(matches!(
            result,
            Err(ExecError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        // Each attempt fails on voltage, frequency never written
        assert_eq!(port.writes_for(ADDR).len(), 3);
        assert_eq!(device.error_count, 3);
        assert!(!device.online);
        assert!(device.last_settings.is_none());
    }

    #[tokio::test]
    async fn test_restart_single_request() {
        let port = Arc::new(StubDevicePort::new());
        port.add_device(ADDR, settings(1150, 450));
        let client = client(&port);
        let mut device = device();

        client.restart(&mut device).await.unwrap();
        assert_eq!(port.restart_count(ADDR), 1);

        port.set_offline(ADDR, true);
        assert!(client.restart(&mut device).await.is_err());
        assert_eq!(device.error_count, 1);
    }
}
