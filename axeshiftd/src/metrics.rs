//! Prometheus metrics for the fleet.

use axeshift_domain::{DeviceId, Telemetry};
use prometheus::{Encoder, GaugeVec, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::DaemonResult;

/// Per-device gauges and fleet counters, on a private registry.
pub struct FleetMetrics {
    registry: Registry,
    hashrate: GaugeVec,
    temperature: GaugeVec,
    power: GaugeVec,
    online: IntGaugeVec,
    safety_violations: IntCounter,
    apply_failures: IntCounter,
    period_switches: IntCounter,
}

impl FleetMetrics {
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let hashrate = GaugeVec::new(
            Opts::new("axeshift_device_hashrate_ghs", "Last reported hashrate in GH/s"),
            &["device"],
        )?;
        let temperature = GaugeVec::new(
            Opts::new(
                "axeshift_device_temperature_celsius",
                "Last reported ASIC temperature",
            ),
            &["device"],
        )?;
        let power = GaugeVec::new(
            Opts::new("axeshift_device_power_watts", "Last reported power draw"),
            &["device"],
        )?;
        let online = IntGaugeVec::new(
            Opts::new("axeshift_device_online", "1 when the last status read succeeded"),
            &["device"],
        )?;
        let safety_violations = IntCounter::new(
            "axeshift_safety_violations_total",
            "Polls that breached a temperature or power ceiling",
        )?;
        let apply_failures = IntCounter::new(
            "axeshift_apply_failures_total",
            "Transitions that did not reach their target",
        )?;
        let period_switches =
            IntCounter::new("axeshift_period_switches_total", "Global period changes")?;

        registry.register(Box::new(hashrate.clone()))?;
        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(power.clone()))?;
        registry.register(Box::new(online.clone()))?;
        registry.register(Box::new(safety_violations.clone()))?;
        registry.register(Box::new(apply_failures.clone()))?;
        registry.register(Box::new(period_switches.clone()))?;

        Ok(Self {
            registry,
            hashrate,
            temperature,
            power,
            online,
            safety_violations,
            apply_failures,
            period_switches,
        })
    }

    /// Record a successful status read.
    pub fn observe(&self, device: &DeviceId, telemetry: &Telemetry) {
        let label = [device.as_str()];
        self.hashrate.with_label_values(&label).set(telemetry.hashrate);
        self.temperature.with_label_values(&label).set(telemetry.temperature);
        self.power.with_label_values(&label).set(telemetry.power);
        self.online.with_label_values(&label).set(1);
    }

    /// Record a failed status read.
    pub fn mark_offline(&self, device: &DeviceId) {
        self.online.with_label_values(&[device.as_str()]).set(0);
    }

    pub fn record_safety_violation(&self) {
        self.safety_violations.inc();
    }

    pub fn record_apply_failure(&self) {
        self.apply_failures.inc();
    }

    pub fn record_period_switch(&self) {
        self.period_switches.inc();
    }

    /// Prometheus text exposition of every metric.
    pub fn render(&self) -> DaemonResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_device_gauges() {
        let metrics = FleetMetrics::new().unwrap();
        let device = DeviceId::new("bitaxe1").unwrap();

        metrics.observe(
            &device,
            &Telemetry {
                hashrate: 512.5,
                temperature: 61.0,
                power: 13.2,
                voltage: None,
                frequency: None,
            },
        );
        metrics.record_period_switch();

        let text = metrics.render().unwrap();
        assert!(text.contains("axeshift_device_hashrate_ghs{device=\"bitaxe1\"} 512.5"));
        assert!(text.contains("axeshift_device_online{device=\"bitaxe1\"} 1"));
        assert!(text.contains("axeshift_period_switches_total 1"));
    }

    #[test]
    fn test_offline_flips_gauge() {
        let metrics = FleetMetrics::new().unwrap();
        let device = DeviceId::new("bitaxe1").unwrap();

        metrics.mark_offline(&device);

        let text = metrics.render().unwrap();
        assert!(text.contains("axeshift_device_online{device=\"bitaxe1\"} 0"));
        assert!(text.contains("axeshift_safety_violations_total 0"));
    }
}
