//! AxeOS REST API Client
//!
//! Provides REST API integration for Bitaxe-class miners:
//! - Reading live system information (hashrate, temperature, power, settings)
//! - Patching core voltage and frequency
//! - Triggering a restart
//!
//! # Endpoints
//!
//! - `GET /api/system/info`
//! - `PATCH /api/system` with `{"coreVoltage": <mV>}` and/or `{"frequency": <MHz>}`
//! - `POST /api/system/restart`
//!
//! Every call is bounded by the client's request timeout.

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SYSTEM_INFO_PATH: &str = "/api/system/info";
const SYSTEM_PATH: &str = "/api/system";
const RESTART_PATH: &str = "/api/system/restart";

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the AxeOS REST client.
#[derive(Debug, Clone, Error)]
pub enum AxeOsError {
    /// HTTP request failed (connection refused, DNS, reset...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Device answered with a non-success status
    #[error("Device returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

// =============================================================================
// Payloads
// =============================================================================

/// Subset of `GET /api/system/info` the scheduler relies on.
///
/// Missing numeric readings default to 0, matching what the firmware
/// reports while the ASIC is still initialising.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Hashrate in GH/s
    #[serde(default)]
    pub hash_rate: f64,
    /// ASIC temperature in °C
    #[serde(default)]
    pub temp: f64,
    /// Power draw in watts
    #[serde(default)]
    pub power: f64,
    /// Configured core voltage in mV
    pub core_voltage: Option<f64>,
    /// Configured frequency in MHz
    pub frequency: Option<f64>,
    /// Device hostname
    pub hostname: Option<String>,
    /// Firmware version
    pub version: Option<String>,
}

/// Body of `PATCH /api/system`. Absent fields are left untouched by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemPatch {
    /// New core voltage in mV
    #[serde(rename = "coreVoltage", skip_serializing_if = "Option::is_none")]
    pub core_voltage: Option<u32>,
    /// New frequency in MHz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
}

impl SystemPatch {
    /// Patch only the core voltage.
    pub fn voltage(millivolts: u32) -> Self {
        Self {
            core_voltage: Some(millivolts),
            frequency: None,
        }
    }

    /// Patch only the frequency.
    pub fn frequency(megahertz: u32) -> Self {
        Self {
            core_voltage: None,
            frequency: Some(megahertz),
        }
    }
}

// =============================================================================
// AxeOS REST Client
// =============================================================================

/// HTTP client shared by every device in the fleet.
///
/// Devices are addressed per call by their base URL
/// (e.g. `http://192.168.1.100`).
#[derive(Debug, Clone)]
pub struct AxeOsClient {
    /// HTTP client
    client: Client,
    /// Upper bound for each request
    request_timeout: Duration,
}

impl AxeOsClient {
    /// Create a new client with the given per-request timeout.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            request_timeout,
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Build a full endpoint URL for a device.
    fn url(base_url: &str, path: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, AxeOsError> {
        let response = timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| AxeOsError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    AxeOsError::Timeout
                } else {
                    AxeOsError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let body = timeout(self.request_timeout, response.text())
            .await
            .map_err(|_| AxeOsError::Timeout)?
            .map_err(|e| AxeOsError::ParseError(e.to_string()))?;

        if !status.is_success() {
            return Err(AxeOsError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    /// Read live system information.
    ///
    /// # Endpoint
    ///
    /// `GET /api/system/info`
    pub async fn get_system_info(&self, base_url: &str) -> Result<SystemInfo, AxeOsError> {
        let url = Self::url(base_url, SYSTEM_INFO_PATH);
        let body = self.send(self.client.get(&url)).await?;

        serde_json::from_str(&body).map_err(|e| AxeOsError::ParseError(e.to_string()))
    }

    /// Patch system settings.
    ///
    /// # Endpoint
    ///
    /// `PATCH /api/system`
    pub async fn patch_system(&self, base_url: &str, patch: &SystemPatch) -> Result<(), AxeOsError> {
        let url = Self::url(base_url, SYSTEM_PATH);
        debug!(%url, ?patch, "Patching device settings");

        self.send(self.client.patch(&url).json(patch)).await?;
        Ok(())
    }

    /// Ask the device to reboot. Returns as soon as the device accepts the request.
    ///
    /// # Endpoint
    ///
    /// `POST /api/system/restart`
    pub async fn restart(&self, base_url: &str) -> Result<(), AxeOsError> {
        let url = Self::url(base_url, RESTART_PATH);
        self.send(self.client.post(&url)).await?;
        Ok(())
    }
}

impl Default for AxeOsClient {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_strips_trailing_slash() {
        assert_eq!(
            AxeOsClient::url("http://192.168.1.100/", SYSTEM_INFO_PATH),
            "http://192.168.1.100/api/system/info"
        );
        assert_eq!(
            AxeOsClient::url("http://192.168.1.100", SYSTEM_PATH),
            "http://192.168.1.100/api/system"
        );
    }

    #[test]
    fn test_parse_system_info() {
        let body = r#"{
            "power": 13.81,
            "voltage": 5187.5,
            "current": 2680.25,
            "temp": 58.25,
            "hashRate": 512.73,
            "coreVoltage": 1200,
            "coreVoltageActual": 1194,
            "frequency": 525,
            "hostname": "bitaxe",
            "version": "v2.4.2"
        }"#;

        let info: SystemInfo = serde_json::from_str(body).unwrap();

        assert!((info.hash_rate - 512.73).abs() < 1e-9);
        assert!((info.temp - 58.25).abs() < 1e-9);
        assert_eq!(info.core_voltage, Some(1200.0));
        assert_eq!(info.frequency, Some(525.0));
        assert_eq!(info.hostname.as_deref(), Some("bitaxe"));
    }

    #[test]
    fn test_parse_system_info_missing_readings() {
        let info: SystemInfo = serde_json::from_str("{}").unwrap();

        assert_eq!(info.hash_rate, 0.0);
        assert_eq!(info.power, 0.0);
        assert!(info.core_voltage.is_none());
        assert!(info.frequency.is_none());
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        assert_eq!(
            serde_json::to_string(&SystemPatch::voltage(1150)).unwrap(),
            r#"{"coreVoltage":1150}"#
        );
        assert_eq!(
            serde_json::to_string(&SystemPatch::frequency(450)).unwrap(),
            r#"{"frequency":450}"#
        );
    }

    #[tokio::test]
    async fn test_unreachable_device_is_request_failure() {
        let client = AxeOsClient::new(Duration::from_secs(2));

        // Port 9 on loopback is discard and almost never listening
        let result = client.get_system_info("http://127.0.0.1:9").await;

        assert!(matches!(
            result,
            Err(AxeOsError::RequestFailed(_)) | Err(AxeOsError::Timeout)
        ));
    }
}
