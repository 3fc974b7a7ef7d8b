//! FLIP/APIC backend on a collocated grid with nearest-cell transfers.

pub mod forces;
pub mod pressure;
pub mod transfer;

use glam::{Vec3, Vec4};

use crate::compute::DeviceLimits;
use crate::config::{Mode, SimulationOptions};
use crate::graph::{Binding, Frame, IntegrationBackend, PassDesc, PassKind};
use crate::particle::DEFAULT_MATERIAL;
use crate::passes::{clear_grid, grid_forces, reseed};

use forces::{compute_vorticity, PostForces};
use transfer::G2pParams;

/// Solid wall thickness in cells.
const BOUNDARY_LAYERS: usize = 1;

pub struct FlipBackend {
    passes: Vec<PassDesc>,
    g2p: G2pParams,
    acceleration: Vec3,
    pressure_iters: u32,
    pressure_tolerance: f32,
    relaxation: f32,
    warm_start: bool,
}

impl FlipBackend {
    pub fn new(opts: &SimulationOptions, limits: &DeviceLimits) -> Self {
        let flip = &opts.flip;
        let vorticity = flip.vorticity > 0.0;

        let mut passes = vec![
            PassDesc::new(PassKind::GridClear, limits),
            PassDesc::new(PassKind::P2gFlip, limits),
            PassDesc::new(PassKind::GridForces, limits),
            PassDesc::new(PassKind::PressureSolve, limits),
        ];
        let mut g2p = PassDesc::new(PassKind::G2pFlip, limits);
        if vorticity {
            passes.push(PassDesc::new(PassKind::Vorticity, limits));
            g2p = g2p.reading(Binding::GridVorticity);
        }
        passes.push(g2p);
        passes.push(PassDesc::new(PassKind::Reseed, limits));

        Self {
            passes,
            g2p: G2pParams {
                pic_flip: flip.pic_flip,
                apic: flip.apic,
                post: PostForces {
                    vorticity: flip.vorticity.max(0.0),
                    viscosity: flip.viscosity.max(0.0),
                    surface_tension: flip.surface_tension.max(0.0),
                    cohesion: flip.cohesion.max(0.0),
                },
                cfl_limit: opts.time.cfl_limit,
            },
            acceleration: opts.forces.acceleration(),
            pressure_iters: flip.pressure_iters,
            pressure_tolerance: flip.pressure_tolerance,
            relaxation: flip.relaxation,
            warm_start: flip.warm_start,
        }
    }
}

impl IntegrationBackend for FlipBackend {
    fn mode(&self) -> Mode {
        Mode::Flip
    }

    fn passes(&self) -> &[PassDesc] {
        &self.passes
    }

    fn execute(&self, kind: PassKind, frame: &mut Frame<'_>) {
        match kind {
            PassKind::GridClear => clear_grid(frame.grid, self.warm_start),
            PassKind::P2gFlip => transfer::p2g(frame.particles, frame.grid, self.g2p.apic),
            PassKind::GridForces => {
                grid_forces(frame.grid, frame.dt, self.acceleration, BOUNDARY_LAYERS)
            }
            PassKind::PressureSolve => {
                let report = pressure::solve(frame.grid, self.pressure_iters, self.relaxation);
                frame.stats.pressure_residual = Some(report.residual);
                frame.stats.pressure_converged = Some(report.converged(self.pressure_tolerance));
            }
            PassKind::Vorticity => compute_vorticity(frame.grid),
            PassKind::G2pFlip => transfer::g2p(frame.particles, frame.grid, &self.g2p, frame.dt),
            PassKind::Reseed => frame.stats.reseeded += reseed(frame.particles, frame.reseed_point),
            other => debug_assert!(false, "{other:?} is not a FLIP pass"),
        }
    }

    fn particle_mass(&self) -> f32 {
        1.0
    }

    fn initial_material(&self) -> Vec4 {
        DEFAULT_MATERIAL
    }
}
