//! Transition Engine: moves a device to target settings, directly or in steps.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use axeshift_domain::{Device, Settings};
use axeshift_engine::plan_transition;

use crate::client::{ApplyReport, DeviceClient};
use crate::error::{ExecError, ExecResult};
use crate::ports::DevicePort;

/// Transition behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionConfig {
    /// Step gradually instead of writing the target directly
    pub smooth: bool,
    /// Number of steps, including the final one
    pub steps: u32,
    /// Pause between consecutive steps
    pub step_delay: Duration,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            smooth: true,
            steps: 5,
            step_delay: Duration::from_secs(10),
        }
    }
}

/// How the device reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Single apply of the target
    Direct(ApplyReport),
    /// All steps applied
    Stepped { steps: u32 },
}

/// Drives a device to a target through the Device Client.
pub struct TransitionEngine<P: DevicePort> {
    client: Arc<DeviceClient<P>>,
    config: TransitionConfig,
}

impl<P: DevicePort> TransitionEngine<P> {
    pub fn new(client: Arc<DeviceClient<P>>, config: TransitionConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> TransitionConfig {
        self.config
    }

    /// Move `device` to `target`.
    ///
    /// Smooth mode reads the active settings first and falls back to a direct
    /// apply when they cannot be read. A failed step aborts the transition;
    /// the device keeps whatever the last successful step wrote.
    pub async fn transition(
        &self,
        device: &mut Device,
        target: Settings,
    ) -> ExecResult<TransitionOutcome> {
        if !self.config.smooth || self.config.steps <= 1 {
            return self.direct(device, target).await;
        }

        let telemetry = match self.client.read_status(device).await {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!(
                    device = %device.id,
                    error = %e,
                    "Cannot read current settings, applying target directly"
                );
                return self.direct(device, target).await;
            }
        };

        let current = Settings {
            voltage: telemetry.voltage.unwrap_or(target.voltage),
            frequency: telemetry.frequency.unwrap_or(target.frequency),
        };
        let plan = plan_transition(current, target, self.config.steps);
        let steps = plan.len() as u32;

        info!(
            device = %device.id,
            from = %current,
            to = %target,
            steps,
            "Starting smooth transition"
        );

        for (index, step_settings) in plan.into_iter().enumerate() {
            let step = index as u32 + 1;
            if let Err(e) = self.client.apply_settings(device, step_settings).await {
                warn!(device = %device.id, step, steps, error = %e, "Transition aborted");
                return Err(ExecError::TransitionAborted {
                    step,
                    steps,
                    reason: e.to_string(),
                });
            }
            info!(device = %device.id, step, steps, settings = %step_settings, "Transition step applied");

            if step < steps {
                sleep(self.config.step_delay).await;
            }
        }

        info!(device = %device.id, settings = %target, "Transition complete");
        Ok(TransitionOutcome::Stepped { steps })
    }

    async fn direct(&self, device: &mut Device, target: Settings) -> ExecResult<TransitionOutcome> {
        let report = self.client.apply_settings(device, target).await?;
        Ok(TransitionOutcome::Direct(report))
    }
}

// =============================================================================
// Tests
// =============================================================================
