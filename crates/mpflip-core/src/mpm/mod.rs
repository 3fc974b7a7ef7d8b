//! MLS-MPM backend with quadratic B-spline transfers.

pub mod constitutive;
pub mod transfer;

use glam::{Mat3, Vec3, Vec4};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::compute::DeviceLimits;
use crate::config::{Mode, MpmModel, SimulationOptions};
use crate::graph::{Frame, IntegrationBackend, PassDesc, PassKind};
use crate::particle::ParticleBuffers;
use crate::passes::{clamp_grid_velocity, clear_grid, grid_forces, reseed};

use constitutive::Constitutive;

/// The quadratic stencil reaches one cell past the containing cell, so the
/// walls are two cells thick.
const BOUNDARY_LAYERS: usize = 2;

pub struct MpmBackend {
    passes: Vec<PassDesc>,
    constitutive: Constitutive,
    acceleration: Vec3,
    particle_mass: f32,
    particle_volume: f32,
    apic_blend: f32,
    grid_speed_limit: f32,
    cfl_limit: f32,
}

impl MpmBackend {
    pub fn new(opts: &SimulationOptions, limits: &DeviceLimits) -> Self {
        let passes = [
            PassKind::GridClear,
            PassKind::StressUpdate,
            PassKind::P2gMpm,
            PassKind::GridForces,
            PassKind::GridVelocityClamp,
            PassKind::G2pMpm,
            PassKind::PlasticityProjection,
            PassKind::Reseed,
        ]
        .into_iter()
        .map(|kind| PassDesc::new(kind, limits))
        .collect();

        Self {
            passes,
            constitutive: Constitutive::new(&opts.mpm),
            acceleration: opts.forces.acceleration(),
            particle_mass: opts.particle_mass(),
            particle_volume: opts.particle_volume(),
            apic_blend: opts.mpm.apic_blend,
            grid_speed_limit: opts.mpm.grid_speed_limit,
            cfl_limit: opts.time.cfl_limit,
        }
    }

    /// Kirchhoff stress of every live particle into `particles.stress`.
    pub fn update_stress(&self, particles: &mut ParticleBuffers) {
        let n = particles.alive();
        let model = &self.constitutive;
        let stress_of =
            |p: usize| model.kirchhoff_stress(particles.deformation[p], particles.material[p]);

        #[cfg(feature = "parallel")]
        let stress: Vec<Mat3> = (0..n).into_par_iter().map(stress_of).collect();

        #[cfg(not(feature = "parallel"))]
        let stress: Vec<Mat3> = (0..n).map(stress_of).collect();

        particles.stress[..n].copy_from_slice(&stress);
    }

    /// Plastic return mapping on every live particle.
    pub fn project_plasticity(&self, particles: &mut ParticleBuffers, dt: f32) {
        if matches!(
            self.constitutive.model,
            MpmModel::Elastic | MpmModel::NeoHookean
        ) {
            return;
        }
        let n = particles.alive();
        let model = &self.constitutive;
        let project = |p: usize| {
            let mut material = particles.material[p];
            let f = model.project(particles.deformation[p], &mut material, dt);
            (f, material)
        };

        #[cfg(feature = "parallel")]
        let results: Vec<(Mat3, Vec4)> = (0..n).into_par_iter().map(project).collect();

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(Mat3, Vec4)> = (0..n).map(project).collect();

        for (p, (f, material)) in results.into_iter().enumerate() {
            particles.deformation[p] = f;
            particles.material[p] = material;
        }
    }
}

impl IntegrationBackend for MpmBackend {
    fn mode(&self) -> Mode {
        Mode::Mpm
    }

    fn passes(&self) -> &[PassDesc] {
        &self.passes
    }

    fn execute(&self, kind: PassKind, frame: &mut Frame<'_>) {
        let dt = frame.dt;
        match kind {
            PassKind::GridClear => clear_grid(frame.grid, false),
            PassKind::StressUpdate => self.update_stress(frame.particles),
            PassKind::P2gMpm => {
                transfer::p2g(frame.particles, frame.grid, self.particle_volume, dt)
            }
            PassKind::GridForces => {
                grid_forces(frame.grid, dt, self.acceleration, BOUNDARY_LAYERS)
            }
            PassKind::GridVelocityClamp => {
                let cfl_speed = self.cfl_limit * frame.grid.dx() / dt;
                clamp_grid_velocity(frame.grid, self.grid_speed_limit.min(cfl_speed))
            }
            PassKind::G2pMpm => transfer::g2p(frame.particles, frame.grid, self.apic_blend, dt),
            PassKind::PlasticityProjection => self.project_plasticity(frame.particles, dt),
            PassKind::Reseed => frame.stats.reseeded += reseed(frame.particles, frame.reseed_point),
            other => debug_assert!(false, "{other:?} is not an MPM pass"),
        }
    }

    fn particle_mass(&self) -> f32 {
        self.particle_mass
    }

    fn initial_material(&self) -> Vec4 {
        self.constitutive.initial_material()
    }
}
