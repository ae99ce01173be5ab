//! Execution layer port definitions.
//!
//! The port is the black-box device capability surface: read status,
//! patch settings, trigger restart. Adapters implement it for a transport.

use async_trait::async_trait;

use axeshift_domain::{Megahertz, Millivolts, Telemetry};

use crate::error::ExecError;

// =============================================================================
// Device Port
// =============================================================================

/// Port for device operations, addressed by base URL.
///
/// Implementations:
/// - `HttpDevicePort` - AxeOS REST API
/// - `StubDevicePort` - For testing (scriptable failures and delays)
#[async_trait]
pub trait DevicePort: Send + Sync {
    /// Read live telemetry and active settings.
    async fn read_status(&self, address: &str) -> Result<Telemetry, ExecError>;

    /// Write the core voltage only.
    async fn write_voltage(&self, address: &str, voltage: Millivolts) -> Result<(), ExecError>;

    /// Write the frequency only.
    async fn write_frequency(&self, address: &str, frequency: Megahertz)
        -> Result<(), ExecError>;

    /// Request a reboot. Returns once the device has accepted the request.
    async fn restart(&self, address: &str) -> Result<(), ExecError>;
}
