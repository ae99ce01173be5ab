//! Daemon configuration.
//!
//! Process settings come from environment variables with sensible defaults.
//! The fleet itself (devices, profiles, limits, tuning) lives in a JSON file.

use crate::error::{DaemonError, DaemonResult};
use axeshift_domain::{
    Device, DeviceId, DeviceOverrides, Megahertz, Millivolts, Profile, ProfileSet, SafetyLimits,
    Settings, TimeWindow,
};
use axeshift_exec::{RetryPolicy, TransitionConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Process Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Fleet file location
    pub fleet_path: PathBuf,

    /// Stats snapshot location
    pub stats_path: PathBuf,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Serve the HTTP API at all
    pub enabled: bool,
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let fleet_path =
            PathBuf::from(env::var("AXESHIFT_CONFIG").unwrap_or_else(|_| "axeshift.json".into()));
        let stats_path = PathBuf::from(
            env::var("AXESHIFT_STATS_PATH").unwrap_or_else(|_| "axeshift_stats.json".into()),
        );

        Ok(Self {
            api,
            fleet_path,
            stats_path,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            fleet_path: PathBuf::from("axeshift.test.json"),
            stats_path: PathBuf::from("axeshift_stats.test.json"),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("AXESHIFT_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid AXESHIFT_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let enabled_str = env::var("AXESHIFT_API_ENABLED").unwrap_or_else(|_| "true".to_string());
        let enabled = parse_bool(&enabled_str).ok_or_else(|| {
            DaemonError::Config(format!("Invalid AXESHIFT_API_ENABLED: {}", enabled_str))
        })?;

        let host = env::var("AXESHIFT_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("AXESHIFT_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            DaemonError::Config(format!("Invalid AXESHIFT_API_PORT: {}", port_str))
        })?;

        Ok(ApiConfig {
            enabled,
            host,
            port,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                enabled: true,
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            fleet_path: PathBuf::from("axeshift.json"),
            stats_path: PathBuf::from("axeshift_stats.json"),
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Fleet File (on-disk shape)
// =============================================================================

/// Raw fleet file as stored on disk. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetFile {
    pub miners: Vec<MinerEntry>,
    pub global_day_settings: ProfileEntry,
    pub global_night_settings: ProfileEntry,
    pub max_voltage: u32,
    pub max_frequency: u32,
    pub max_temp: f64,
    pub max_power: f64,
    #[serde(default = "defaults::check_interval")]
    pub check_interval: u64,
    #[serde(default = "defaults::status_interval")]
    pub status_interval: u64,
    #[serde(default = "defaults::log_stats_interval")]
    pub log_stats_interval: u64,
    #[serde(default = "defaults::enabled")]
    pub smooth_transition: bool,
    #[serde(default = "defaults::transition_steps")]
    pub transition_steps: u32,
    #[serde(default = "defaults::transition_delay")]
    pub transition_delay: u64,
    #[serde(default = "defaults::enabled")]
    pub parallel_operations: bool,
    #[serde(default = "defaults::max_workers")]
    pub max_workers: usize,
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "defaults::request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "defaults::poll_timeout")]
    pub poll_timeout: u64,
    #[serde(default = "defaults::apply_timeout")]
    pub apply_timeout: u64,
    #[serde(default = "defaults::error_backoff")]
    pub error_backoff: u64,
    #[serde(default = "defaults::shutdown_grace")]
    pub shutdown_grace: u64,
}

/// One device in the fleet file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerEntry {
    pub name: String,
    /// IP or base URL
    pub ip: String,
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_settings: Option<SettingsEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_settings: Option<SettingsEntry>,
}

/// Per-device override pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsEntry {
    pub voltage: u32,
    pub frequency: u32,
}

/// Global profile with its window (`HH:MM`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub start_time: String,
    pub end_time: String,
    pub voltage: u32,
    pub frequency: u32,
}

mod defaults {
    pub fn enabled() -> bool {
        true
    }
    pub fn check_interval() -> u64 {
        60
    }
    pub fn status_interval() -> u64 {
        60
    }
    pub fn log_stats_interval() -> u64 {
        300
    }
    pub fn transition_steps() -> u32 {
        5
    }
    pub fn transition_delay() -> u64 {
        10
    }
    pub fn max_workers() -> usize {
        5
    }
    pub fn retry_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        5
    }
    pub fn request_timeout() -> u64 {
        10
    }
    pub fn poll_timeout() -> u64 {
        30
    }
    pub fn apply_timeout() -> u64 {
        60
    }
    pub fn error_backoff() -> u64 {
        30
    }
    pub fn shutdown_grace() -> u64 {
        60
    }
}

impl Default for FleetFile {
    /// Two example devices with the stock day/night profiles.
    fn default() -> Self {
        let miner = |name: &str, ip: &str| MinerEntry {
            name: name.to_string(),
            ip: ip.to_string(),
            enabled: true,
            day_settings: None,
            night_settings: None,
        };

        Self {
            miners: vec![
                miner("bitaxe1", "192.168.1.100"),
                miner("bitaxe2", "192.168.1.101"),
            ],
            global_day_settings: ProfileEntry {
                start_time: "07:30".to_string(),
                end_time: "20:00".to_string(),
                voltage: 1150,
                frequency: 450,
            },
            global_night_settings: ProfileEntry {
                start_time: "20:00".to_string(),
                end_time: "07:30".to_string(),
                voltage: 1250,
                frequency: 550,
            },
            max_voltage: 1300,
            max_frequency: 600,
            max_temp: 70.0,
            max_power: 15.0,
            check_interval: defaults::check_interval(),
            status_interval: defaults::status_interval(),
            log_stats_interval: defaults::log_stats_interval(),
            smooth_transition: true,
            transition_steps: defaults::transition_steps(),
            transition_delay: defaults::transition_delay(),
            parallel_operations: true,
            max_workers: defaults::max_workers(),
            retry_attempts: defaults::retry_attempts(),
            retry_delay: defaults::retry_delay(),
            request_timeout: defaults::request_timeout(),
            poll_timeout: defaults::poll_timeout(),
            apply_timeout: defaults::apply_timeout(),
            error_backoff: defaults::error_backoff(),
            shutdown_grace: defaults::shutdown_grace(),
        }
    }
}

// =============================================================================
// Fleet Configuration (validated)
// =============================================================================

/// Control-loop settings shared by every cycle.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Global day/night profiles
    pub profiles: ProfileSet,
    /// Fleet-wide ceilings
    pub limits: SafetyLimits,
    /// Sleep between cycles
    pub check_interval: Duration,
    /// How often the status table is logged
    pub status_interval: Duration,
    /// How often stats are flushed
    pub stats_interval: Duration,
    pub transition: TransitionConfig,
    pub retry: RetryPolicy,
    /// Fan out per-device work; otherwise one device at a time
    pub parallel: bool,
    /// Worker pool width
    pub max_workers: usize,
    /// Bound on each device HTTP request
    pub request_timeout: Duration,
    /// Per-device budget for a status poll
    pub poll_timeout: Duration,
    /// Per-device budget for a period broadcast
    pub apply_timeout: Duration,
    /// Pause after a failed cycle
    pub error_backoff: Duration,
    /// How long shutdown waits for in-flight work
    pub shutdown_grace: Duration,
}

impl ControlConfig {
    /// Stock profiles with short timings, for tests.
    pub fn test() -> Self {
        let mut control = FleetConfig::from_file(FleetFile::default())
            .expect("stock fleet file is valid")
            .control;
        control.transition.step_delay = Duration::from_millis(10);
        control.retry = RetryPolicy::fixed(3, Duration::from_millis(10));
        control.poll_timeout = Duration::from_secs(1);
        control.apply_timeout = Duration::from_secs(5);
        control.error_backoff = Duration::from_millis(50);
        control.shutdown_grace = Duration::from_secs(5);
        control
    }
}

/// Validated fleet: devices plus control settings.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub devices: Vec<Device>,
    pub control: ControlConfig,
}

impl FleetConfig {
    /// Load and validate the fleet file.
    ///
    /// A missing file is replaced by the stock example and reported as a
    /// configuration error so the operator can edit it first.
    pub fn load(path: &Path) -> DaemonResult<Self> {
        if !path.exists() {
            let body = serde_json::to_string_pretty(&FleetFile::default())
                .map_err(|e| DaemonError::Config(e.to_string()))?;
            std::fs::write(path, body).map_err(|e| {
                DaemonError::Config(format!("Failed to write {}: {}", path.display(), e))
            })?;
            return Err(DaemonError::Config(format!(
                "No fleet file found; wrote an example to {}. Edit it and restart",
                path.display()
            )));
        }

        let body = std::fs::read_to_string(path).map_err(|e| {
            DaemonError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: FleetFile = serde_json::from_str(&body).map_err(|e| {
            DaemonError::Config(format!("Invalid fleet file {}: {}", path.display(), e))
        })?;

        Self::from_file(file)
    }

    /// Validate a parsed fleet file.
    pub fn from_file(file: FleetFile) -> DaemonResult<Self> {
        let profiles = ProfileSet {
            day: profile(&file.global_day_settings)?,
            night: profile(&file.global_night_settings)?,
        };
        let limits = SafetyLimits::new(
            Millivolts::new(file.max_voltage)?,
            Megahertz::new(file.max_frequency)?,
            file.max_temp,
            file.max_power,
        )?;

        if file.retry_attempts < 1 {
            return Err(DaemonError::Config("retry_attempts must be at least 1".into()));
        }
        if file.max_workers < 1 {
            return Err(DaemonError::Config("max_workers must be at least 1".into()));
        }
        if file.smooth_transition && file.transition_steps < 1 {
            return Err(DaemonError::Config(
                "transition_steps must be at least 1 when smooth_transition is on".into(),
            ));
        }
        for (key, value) in [
            ("check_interval", file.check_interval),
            ("status_interval", file.status_interval),
            ("log_stats_interval", file.log_stats_interval),
            ("request_timeout", file.request_timeout),
            ("poll_timeout", file.poll_timeout),
            ("apply_timeout", file.apply_timeout),
        ] {
            if value == 0 {
                return Err(DaemonError::Config(format!("{} must be positive", key)));
            }
        }

        let mut names = HashSet::new();
        let mut devices = Vec::with_capacity(file.miners.len());
        for miner in &file.miners {
            if !names.insert(miner.name.as_str()) {
                return Err(DaemonError::Config(format!(
                    "Duplicate device name: {}",
                    miner.name
                )));
            }
            let overrides = DeviceOverrides {
                day: miner.day_settings.map(settings).transpose()?,
                night: miner.night_settings.map(settings).transpose()?,
            };
            devices.push(
                Device::new(DeviceId::new(&miner.name)?, normalize_address(&miner.ip), miner.enabled)
                    .with_overrides(overrides),
            );
        }

        let control = ControlConfig {
            profiles,
            limits,
            check_interval: Duration::from_secs(file.check_interval),
            status_interval: Duration::from_secs(file.status_interval),
            stats_interval: Duration::from_secs(file.log_stats_interval),
            transition: TransitionConfig {
                smooth: file.smooth_transition,
                steps: file.transition_steps,
                step_delay: Duration::from_secs(file.transition_delay),
            },
            retry: RetryPolicy::fixed(file.retry_attempts, Duration::from_secs(file.retry_delay)),
            parallel: file.parallel_operations,
            max_workers: file.max_workers,
            request_timeout: Duration::from_secs(file.request_timeout),
            poll_timeout: Duration::from_secs(file.poll_timeout),
            apply_timeout: Duration::from_secs(file.apply_timeout),
            error_backoff: Duration::from_secs(file.error_backoff),
            shutdown_grace: Duration::from_secs(file.shutdown_grace),
        };

        Ok(Self { devices, control })
    }
}

fn profile(entry: &ProfileEntry) -> DaemonResult<Profile> {
    Ok(Profile {
        settings: Settings::from_raw(entry.voltage, entry.frequency)?,
        window: TimeWindow::parse(&entry.start_time, &entry.end_time)?,
    })
}

fn settings(entry: SettingsEntry) -> DaemonResult<Settings> {
    Ok(Settings::from_raw(entry.voltage, entry.frequency)?)
}

/// Prepend `http://` to bare hosts.
fn normalize_address(ip: &str) -> String {
    let ip = ip.trim();
    if ip.contains("://") {
        ip.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", ip.trim_end_matches('/'))
    }
}

// =============================================================================
// Tests
// =============================================================================
