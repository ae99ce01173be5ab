//! `DevicePort` over the AxeOS REST API.

use async_trait::async_trait;

use axeshift_connectors::{AxeOsClient, AxeOsError, SystemInfo, SystemPatch};
use axeshift_domain::{Megahertz, Millivolts, Telemetry};

use crate::error::ExecError;
use crate::ports::DevicePort;

/// HTTP adapter shared by the whole fleet.
#[derive(Debug, Clone, Default)]
pub struct HttpDevicePort {
    client: AxeOsClient,
}

impl HttpDevicePort {
    /// Wrap a configured AxeOS client.
    pub fn new(client: AxeOsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DevicePort for HttpDevicePort {
    async fn read_status(&self, address: &str) -> Result<Telemetry, ExecError> {
        let info = self.client.get_system_info(address).await?;
        Ok(telemetry_from_info(&info))
    }

    async fn write_voltage(&self, address: &str, voltage: Millivolts) -> Result<(), ExecError> {
        self.client
            .patch_system(address, &SystemPatch::voltage(voltage.value()))
            .await?;
        Ok(())
    }

    async fn write_frequency(
        &self,
        address: &str,
        frequency: Megahertz,
    ) -> Result<(), ExecError> {
        self.client
            .patch_system(address, &SystemPatch::frequency(frequency.value()))
            .await?;
        Ok(())
    }

    async fn restart(&self, address: &str) -> Result<(), ExecError> {
        self.client.restart(address).await?;
        Ok(())
    }
}

impl From<AxeOsError> for ExecError {
    fn from(err: AxeOsError) -> Self {
        match err {
            AxeOsError::RequestFailed(msg) => ExecError::Transport(msg),
            AxeOsError::Timeout => ExecError::Timeout,
            AxeOsError::HttpStatus { status, body } => ExecError::Rejected { status, body },
            AxeOsError::ParseError(msg) => ExecError::InvalidResponse(msg),
        }
    }
}

/// Normalize a system info payload. Non-positive settings are treated as unreported.
fn telemetry_from_info(info: &SystemInfo) -> Telemetry {
    Telemetry {
        hashrate: info.hash_rate,
        temperature: info.temp,
        power: info.power,
        voltage: info
            .core_voltage
            .and_then(|v| Millivolts::new(v.round().max(0.0) as u32).ok()),
        frequency: info
            .frequency
            .and_then(|f| Megahertz::new(f.round().max(0.0) as u32).ok()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn info(core_voltage: Option<f64>, frequency: Option<f64>) -> SystemInfo {
        SystemInfo {
            hash_rate: 480.5,
            temp: 57.0,
            power: 12.1,
            core_voltage,
            frequency,
            hostname: None,
            version: None,
        }
    }

    #[test]
    fn test_telemetry_from_info() {
        let telemetry = telemetry_from_info(&info(Some(1200.0), Some(525.0)));

        assert_eq!(telemetry.hashrate, 480.5);
        assert_eq!(telemetry.voltage, Some(Millivolts::new(1200).unwrap()));
        assert_eq!(telemetry.frequency, Some(Megahertz::new(525).unwrap()));
    }

    #[test]
    fn test_zero_or_missing_settings_are_unreported() {
        let telemetry = telemetry_from_info(&info(Some(0.0), None));

        assert!(telemetry.voltage.is_none());
        assert!(telemetry.frequency.is_none());
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            ExecError::from(AxeOsError::Timeout),
            ExecError::Timeout
        ));
        assert!(matches!(
            ExecError::from(AxeOsError::HttpStatus {
                status: 500,
                body: String::new()
            }),
            ExecError::Rejected { status: 500, .. }
        ));
        assert!(matches!(
            ExecError::from(AxeOsError::RequestFailed("refused".into())),
            ExecError::Transport(_)
        ));
    }
}
