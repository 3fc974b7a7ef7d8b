//! Data-described pass lists and the per-step orchestration.

use glam::{Vec3, Vec4};
use log::debug;
use thiserror::Error;

use crate::buffers::BufferBundle;
use crate::compute::{clamp_workgroup_size, dispatch_size, DeviceLimits, DispatchSize};
use crate::config::{Mode, SimulationOptions, TimeOptions};
use crate::contact::ContactResolver;
use crate::emitter::{integrate_lifetime, Emitter};
use crate::flip::FlipBackend;
use crate::grid::GridBuffers;
use crate::mpm::MpmBackend;
use crate::particle::ParticleBuffers;
use crate::stats::StepStats;

const PARTICLE_WORKGROUP: u32 = 128;
const CELL_WORKGROUP: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    GridClear,
    P2gFlip,
    GridForces,
    PressureSolve,
    Vorticity,
    G2pFlip,
    StressUpdate,
    P2gMpm,
    GridVelocityClamp,
    G2pMpm,
    PlasticityProjection,
    Reseed,
}

/// What a pass iterates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Particles,
    Cells,
}

/// Storage a pass reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    ParticlePosition,
    ParticleVelocity,
    ParticleAffine,
    ParticleDeformation,
    ParticleStress,
    ParticleMass,
    ParticleMaterial,
    GridVelocity,
    GridOldVelocity,
    GridMass,
    GridPressure,
    GridDivergence,
    GridFlags,
    GridVorticity,
}

impl Binding {
    pub fn is_grid(self) -> bool {
        matches!(
            self,
            Binding::GridVelocity
                | Binding::GridOldVelocity
                | Binding::GridMass
                | Binding::GridPressure
                | Binding::GridDivergence
                | Binding::GridFlags
                | Binding::GridVorticity
        )
    }
}

impl PassKind {
    pub fn domain(self) -> Domain {
        match self {
            PassKind::GridClear
            | PassKind::GridForces
            | PassKind::PressureSolve
            | PassKind::Vorticity
            | PassKind::GridVelocityClamp => Domain::Cells,
            _ => Domain::Particles,
        }
    }

    fn bindings(self) -> (&'static [Binding], &'static [Binding]) {
        use Binding::*;
        match self {
            PassKind::GridClear => (&[], &[GridMass, GridVelocity, GridPressure]),
            PassKind::P2gFlip => (
                &[ParticlePosition, ParticleVelocity, ParticleAffine, ParticleMass],
                &[GridMass, GridVelocity],
            ),
            PassKind::GridForces => (
                &[GridMass, GridVelocity],
                &[GridVelocity, GridOldVelocity, GridFlags],
            ),
            PassKind::PressureSolve => (
                &[GridVelocity, GridFlags, GridPressure],
                &[GridDivergence, GridPressure, GridVelocity],
            ),
            PassKind::Vorticity => (&[GridVelocity, GridFlags], &[GridVorticity]),
            PassKind::G2pFlip => (
                &[ParticlePosition, ParticleVelocity, GridVelocity, GridOldVelocity, GridMass],
                &[ParticlePosition, ParticleVelocity, ParticleAffine],
            ),
            PassKind::StressUpdate => (
                &[ParticleDeformation, ParticleMaterial],
                &[ParticleStress],
            ),
            PassKind::P2gMpm => (
                &[
                    ParticlePosition,
                    ParticleVelocity,
                    ParticleAffine,
                    ParticleMass,
                    ParticleStress,
                ],
                &[GridMass, GridVelocity],
            ),
            PassKind::GridVelocityClamp => (&[GridVelocity], &[GridVelocity]),
            PassKind::G2pMpm => (
                &[ParticlePosition, ParticleDeformation, GridVelocity],
                &[
                    ParticlePosition,
                    ParticleVelocity,
                    ParticleAffine,
                    ParticleDeformation,
                ],
            ),
            PassKind::PlasticityProjection => (
                &[ParticleDeformation, ParticleMaterial],
                &[ParticleDeformation, ParticleMaterial],
            ),
            PassKind::Reseed => (
                &[ParticlePosition],
                &[ParticlePosition, ParticleVelocity, ParticleAffine],
            ),
        }
    }
}

/// One compute pass: what it runs over, its workgroup size and the
/// storage it touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassDesc {
    pub kind: PassKind,
    pub domain: Domain,
    pub workgroup_size: u32,
    pub reads: Vec<Binding>,
    pub writes: Vec<Binding>,
}

impl PassDesc {
    pub fn new(kind: PassKind, limits: &DeviceLimits) -> Self {
        let domain = kind.domain();
        let requested = match domain {
            Domain::Particles => PARTICLE_WORKGROUP,
            Domain::Cells => CELL_WORKGROUP,
        };
        let (reads, writes) = kind.bindings();
        Self {
            kind,
            domain,
            workgroup_size: clamp_workgroup_size(requested, limits),
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        }
    }

    pub fn reading(mut self, binding: Binding) -> Self {
        if !self.reads.contains(&binding) {
            self.reads.push(binding);
        }
        self
    }

    pub fn dispatch(&self, particles: usize, cells: usize, limits: &DeviceLimits) -> DispatchSize {
        let items = match self.domain {
            Domain::Particles => particles,
            Domain::Cells => cells,
        };
        dispatch_size(items, self.workgroup_size, limits)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PassOrderError {
    #[error("pass list is empty")]
    Empty,
    #[error("first pass must clear the grid, found {0:?}")]
    FirstPassNotClear(PassKind),
    #[error("{pass:?} reads {binding:?} before any pass writes it")]
    UnproducedRead { pass: PassKind, binding: Binding },
}

/// Verify the first pass clears the grid and every grid binding is written
/// before it is read.
pub fn check_pass_order(passes: &[PassDesc]) -> Result<(), PassOrderError> {
    let first = passes.first().ok_or(PassOrderError::Empty)?;
    if first.kind != PassKind::GridClear {
        return Err(PassOrderError::FirstPassNotClear(first.kind));
    }
    let mut produced: Vec<Binding> = Vec::new();
    for pass in passes {
        if let Some(&binding) = pass
            .reads
            .iter()
            .find(|b| b.is_grid() && !produced.contains(b))
        {
            return Err(PassOrderError::UnproducedRead {
                pass: pass.kind,
                binding,
            });
        }
        produced.extend(pass.writes.iter().copied());
    }
    Ok(())
}

/// Mutable view of the storage one pass operates on.
pub struct Frame<'a> {
    pub particles: &'a mut ParticleBuffers,
    pub grid: &'a mut GridBuffers,
    /// Substep length.
    pub dt: f32,
    /// Where fallen particles are returned.
    pub reseed_point: Vec3,
    pub stats: &'a mut StepStats,
}

/// An integration strategy: a fixed pass list plus the kernels behind it.
pub trait IntegrationBackend: Send + Sync {
    fn mode(&self) -> Mode;

    fn passes(&self) -> &[PassDesc];

    fn execute(&self, kind: PassKind, frame: &mut Frame<'_>);

    /// Mass of a freshly spawned particle.
    fn particle_mass(&self) -> f32;

    /// Material vector of a freshly spawned particle.
    fn initial_material(&self) -> Vec4;
}

/// Build the backend selected by `opts.mode`.
pub fn build_backend(
    opts: &SimulationOptions,
    limits: &DeviceLimits,
) -> Box<dyn IntegrationBackend> {
    let backend: Box<dyn IntegrationBackend> = match opts.mode {
        Mode::Flip => Box::new(FlipBackend::new(opts, limits)),
        Mode::Mpm => Box::new(MpmBackend::new(opts, limits)),
    };
    debug!(
        "{:?} passes: {:?}",
        backend.mode(),
        backend.passes().iter().map(|p| p.kind).collect::<Vec<_>>()
    );
    backend
}

/// Runs one timestep: emit, backend passes, contacts, lifetime, per substep.
pub struct SimulationGraph {
    backend: Box<dyn IntegrationBackend>,
    contacts: ContactResolver,
    emitter: Emitter,
    time: TimeOptions,
    limits: DeviceLimits,
}

impl SimulationGraph {
    pub fn new(opts: &SimulationOptions, limits: DeviceLimits) -> Self {
        let backend = build_backend(opts, &limits);
        debug_assert_eq!(check_pass_order(backend.passes()), Ok(()));
        let emitter = Emitter::new(&opts.emit, backend.particle_mass(), backend.initial_material());
        Self {
            contacts: ContactResolver::new(&opts.colliders, &opts.xpbd),
            emitter,
            time: opts.time.clone(),
            limits,
            backend,
        }
    }

    /// Rebuild backend and resolver from a new snapshot. The emitter keeps
    /// its random stream unless the seed changed.
    pub fn reconfigure(&mut self, opts: &SimulationOptions) {
        self.backend = build_backend(opts, &self.limits);
        self.contacts = ContactResolver::new(&opts.colliders, &opts.xpbd);
        self.emitter.reconfigure(
            &opts.emit,
            self.backend.particle_mass(),
            self.backend.initial_material(),
        );
        self.time = opts.time.clone();
    }

    pub fn passes(&self) -> &[PassDesc] {
        self.backend.passes()
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    pub fn step(&mut self, bundle: &mut BufferBundle, dt: f32) -> StepStats {
        let mut stats = StepStats::default();
        if !(dt > 0.0) {
            stats.alive = bundle.particles.alive();
            return stats;
        }
        let dt = dt.min(self.time.dt_max);
        let substeps = self.time.substeps.max(1);
        let sub_dt = dt / substeps as f32;
        stats.dt = dt;
        stats.substeps = substeps;
        let reseed_point = self.emitter.center();

        for _ in 0..substeps {
            stats.spawned += self.emitter.spawn(&mut bundle.particles, sub_dt);

            let mut frame = Frame {
                particles: &mut bundle.particles,
                grid: &mut bundle.grid,
                dt: sub_dt,
                reseed_point,
                stats: &mut stats,
            };
            for pass in self.backend.passes() {
                let groups = pass
                    .dispatch(frame.particles.alive(), frame.grid.cell_count(), &self.limits)
                    .workgroups();
                self.backend.execute(pass.kind, &mut frame);
                frame.stats.workgroups += groups;
                frame.stats.passes += 1;
            }

            stats.contacts += self
                .contacts
                .resolve_iterations(&mut bundle.particles, sub_dt);
            stats.removed += integrate_lifetime(&mut bundle.particles, sub_dt);
        }
        stats.alive = bundle.particles.alive();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_default;

    #[test]
    fn test_builtin_pass_lists_are_ordered() {
        let limits = DeviceLimits::default();
        let mut opts = create_default();
        for vorticity in [0.0, 0.5] {
            opts.flip.vorticity = vorticity;
            let flip = FlipBackend::new(&opts, &limits);
            assert_eq!(check_pass_order(flip.passes()), Ok(()));
        }
        opts.mode = Mode::Mpm;
        let mpm = MpmBackend::new(&opts, &limits);
        assert_eq!(check_pass_order(mpm.passes()), Ok(()));
    }

    #[test]
    fn test_order_check_rejects_bad_lists() {
        let limits = DeviceLimits::default();
        assert_eq!(check_pass_order(&[]), Err(PassOrderError::Empty));

        let no_clear = [PassDesc::new(PassKind::P2gFlip, &limits)];
        assert_eq!(
            check_pass_order(&no_clear),
            Err(PassOrderError::FirstPassNotClear(PassKind::P2gFlip))
        );

        let early_g2p = [
            PassDesc::new(PassKind::GridClear, &limits),
            PassDesc::new(PassKind::G2pFlip, &limits),
        ];
        assert_eq!(
            check_pass_order(&early_g2p),
            Err(PassOrderError::UnproducedRead {
                pass: PassKind::G2pFlip,
                binding: Binding::GridOldVelocity
            })
        );
    }

    #[test]
    fn test_workgroup_clamped_by_device() {
        let limits = DeviceLimits {
            max_compute_workgroup_size_x: 32,
            ..Default::default()
        };
        let pass = PassDesc::new(PassKind::P2gMpm, &limits);
        assert_eq!(pass.workgroup_size, 32);
        assert_eq!(pass.dispatch(100, 0, &limits).x, 4);
    }

    #[test]
    fn test_dt_clamped_and_split() {
        let opts = create_default();
        let mut graph = SimulationGraph::new(&opts, DeviceLimits::default());
        let mut bundle = crate::buffers::allocate(&crate::compute::HostDevice::new(), &opts).unwrap();
        let stats = graph.step(&mut bundle, 1.0);
        assert_eq!(stats.dt, opts.time.dt_max);
        assert_eq!(stats.substeps, opts.time.substeps);
        assert_eq!(stats.passes, graph.passes().len() * opts.time.substeps as usize);
        assert!(stats.spawned > 0);
    }
}
