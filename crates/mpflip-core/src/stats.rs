//! Per-step counters and the stats snapshot exposed to hosts.

use serde::Serialize;

use crate::config::Mode;

/// Counters from a single `update`, summed over its substeps.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepStats {
    /// Frame dt after clamping to `dtMax`.
    pub dt: f32,
    /// Number of substeps executed.
    pub substeps: u32,
    pub spawned: usize,
    /// Particles removed by lifetime expiry.
    pub removed: usize,
    /// Particles returned to the emitter after falling out of the world.
    pub reseeded: usize,
    /// Particle-collider contacts resolved across all XPBD iterations.
    pub contacts: usize,
    pub passes: usize,
    /// Workgroups the pass list would dispatch on the device.
    pub workgroups: u64,
    /// RMS divergence after the last pressure solve (FLIP only).
    pub pressure_residual: Option<f32>,
    pub pressure_converged: Option<bool>,
    /// Live particles at the end of the step.
    pub alive: usize,
}

/// Exponential moving average of the frame rate implied by `dt`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameRate {
    ema_dt: f32,
}

impl FrameRate {
    pub fn record(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }
        // EMA with alpha=0.3 for responsiveness
        self.ema_dt = if self.ema_dt > 0.0 {
            self.ema_dt * 0.7 + dt * 0.3
        } else {
            dt
        };
    }

    pub fn fps(&self) -> f32 {
        if self.ema_dt > 0.0 {
            1.0 / self.ema_dt
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.ema_dt = 0.0;
    }
}

/// Snapshot reported by `ParticleSimulation::stats`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimStats {
    pub mode: Mode,
    pub alive: usize,
    pub capacity: usize,
    pub fps: f32,
    /// Clamped frame dt of the last `update`.
    pub dt: f32,
    pub steps: u64,
    pub substeps: u32,
    pub spawned: usize,
    pub removed: usize,
    pub reseeded: usize,
    pub contacts: usize,
    pub pressure_residual: Option<f32>,
    pub pressure_converged: Option<bool>,
    pub reserved_bytes: u64,
}
