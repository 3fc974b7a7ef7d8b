//! The `ParticleSimulation` facade: owns the device, the buffer bundle and
//! the pass graph, and handles reallocation when options change.

use std::sync::atomic::{AtomicU64, Ordering};

use log::info;
use serde::Serialize;

use crate::buffers::{allocate, dispose, BufferBundle};
use crate::compute::{ComputeDevice, HostDevice};
use crate::config::{create_default, RenderOptions, SimulationOptions};
use crate::error::{ResourceError, SimError};
use crate::graph::{PassDesc, SimulationGraph};
use crate::grid::GridBuffers;
use crate::particle::ParticleBuffers;
use crate::patch::{merge, OptionsPatch};
use crate::presets::Preset;
use crate::stats::{FrameRate, SimStats, StepStats};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// What the host scene holds for a simulation's point cloud.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCloudHandle {
    pub id: u64,
    /// Maximum number of points the cloud will ever show.
    pub capacity: usize,
    pub render: RenderOptions,
}

/// Host scene graph the point cloud is inserted into.
pub trait SceneContainer {
    fn add(&mut self, handle: &PointCloudHandle);

    fn remove(&mut self, handle: &PointCloudHandle);
}

/// Host-facing simulation facade.
///
/// Owns the device, one buffer bundle and the pass graph. Release the
/// bundle's device reservation with [`dispose`](Self::dispose).
pub struct ParticleSimulation<D: ComputeDevice = HostDevice> {
    device: D,
    options: SimulationOptions,
    bundle: BufferBundle,
    graph: SimulationGraph,
    handle: PointCloudHandle,
    attached: bool,
    frame_rate: FrameRate,
    last_step: StepStats,
    steps: u64,
}

impl<D: ComputeDevice> ParticleSimulation<D> {
    /// Build from defaults merged with `patch`.
    pub fn new(device: D, patch: Option<&OptionsPatch>) -> Result<Self, SimError> {
        let defaults = create_default();
        let options = match patch {
            Some(p) => merge(&defaults, p),
            None => defaults,
        };
        options.validate()?;
        if !device.supports_dispatch() {
            return Err(ResourceError::NoDispatchSupport(device.label().to_owned()).into());
        }

        let bundle = allocate(&device, &options)?;
        let graph = SimulationGraph::new(&options, device.limits());
        let handle = PointCloudHandle {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            capacity: options.max_particles as usize,
            render: options.render.clone(),
        };
        info!(
            "simulation {} created: {:?} mode, {} particles max",
            handle.id, options.mode, options.max_particles
        );

        Ok(Self {
            device,
            options,
            bundle,
            graph,
            handle,
            attached: false,
            frame_rate: FrameRate::default(),
            last_step: StepStats::default(),
            steps: 0,
        })
    }

    pub fn attach(&mut self, scene: &mut dyn SceneContainer) {
        if !self.attached {
            scene.add(&self.handle);
            self.attached = true;
        }
    }

    pub fn detach(&mut self, scene: &mut dyn SceneContainer) {
        if self.attached {
            scene.remove(&self.handle);
            self.attached = false;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Advance by the host frame time `dt` (seconds).
    pub fn update(&mut self, dt: f32) -> StepStats {
        let step = self.graph.step(&mut self.bundle, dt);
        self.frame_rate.record(dt);
        self.steps += 1;
        self.last_step = step;
        step
    }

    /// Merge, validate and apply `patch`. A mode, capacity or grid change
    /// allocates a fresh bundle before releasing the old one and resets the
    /// population; on error nothing changes.
    pub fn set_params(&mut self, patch: &OptionsPatch) -> Result<(), SimError> {
        let next = merge(&self.options, patch);
        next.validate()?;
        self.install(next)
    }

    pub fn apply_preset(&mut self, name: &str) -> Result<(), SimError> {
        let preset = Preset::from_name(name)?;
        let next = merge(&self.options, &preset.patch());
        next.validate()?;
        self.install(next)?;
        info!("applied preset `{}`", name);
        Ok(())
    }

    fn install(&mut self, next: SimulationOptions) -> Result<(), SimError> {
        if self.options.needs_realloc(&next) {
            let fresh = allocate(&self.device, &next)?;
            let old = std::mem::replace(&mut self.bundle, fresh);
            dispose(&self.device, old);

            if next.mode != self.options.mode {
                info!("mode switch {:?} -> {:?}", self.options.mode, next.mode);
            }
            self.graph = SimulationGraph::new(&next, self.device.limits());
            self.frame_rate.reset();
            self.last_step = StepStats::default();
            self.handle.capacity = next.max_particles as usize;
        } else {
            self.graph.reconfigure(&next);
        }
        self.handle.render = next.render.clone();
        self.options = next;
        Ok(())
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            mode: self.options.mode,
            alive: self.bundle.particles.alive(),
            capacity: self.bundle.particles.capacity(),
            fps: self.frame_rate.fps(),
            dt: self.last_step.dt,
            steps: self.steps,
            substeps: self.last_step.substeps,
            spawned: self.last_step.spawned,
            removed: self.last_step.removed,
            reseeded: self.last_step.reseeded,
            contacts: self.last_step.contacts,
            pressure_residual: self.last_step.pressure_residual,
            pressure_converged: self.last_step.pressure_converged,
            reserved_bytes: self.bundle.reserved_bytes(),
        }
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn particles(&self) -> &ParticleBuffers {
        &self.bundle.particles
    }

    pub fn grid(&self) -> &GridBuffers {
        &self.bundle.grid
    }

    pub fn passes(&self) -> &[PassDesc] {
        self.graph.passes()
    }

    pub fn handle(&self) -> &PointCloudHandle {
        &self.handle
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Release all buffers and the device reservation.
    pub fn dispose(self) {
        info!("simulation {} disposed", self.handle.id);
        dispose(&self.device, self.bundle);
    }
}
