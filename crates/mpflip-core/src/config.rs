//! Simulation options, defaults and validation.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::contact::Collider;
use crate::error::ConfigError;

/// Integration backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Flip,
    Mpm,
}

/// MPM constitutive model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MpmModel {
    /// Fixed corotated elasticity, no plasticity.
    Elastic,
    NeoHookean,
    /// Granular: Hencky StVK with Drucker-Prager return mapping.
    DruckerPrager,
    /// Bingham-style viscoplastic flow above the yield stress.
    Viscoplastic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitShape {
    Sphere,
    Box,
}

/// Render hint for the host's point renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Uniform,
    Velocity,
    Life,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridOptions {
    pub resolution: [u32; 3],
    /// Cell edge length in world units.
    pub dx: f32,
    /// World position of the minimum corner of cell (0, 0, 0).
    pub origin: [f32; 3],
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            resolution: [24, 24, 24],
            dx: 0.125,
            origin: [-1.5, -0.25, -1.5],
        }
    }
}

impl GridOptions {
    /// Total cells, or `None` when the product overflows `usize`.
    pub fn cell_count(&self) -> Option<usize> {
        self.resolution
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n as usize))
    }

    pub fn origin_vec(&self) -> Vec3 {
        Vec3::from_array(self.origin)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeOptions {
    pub substeps: u32,
    /// Fraction of a cell a particle may travel per substep.
    pub cfl_limit: f32,
    /// Frame dt is clamped to this before substepping.
    pub dt_max: f32,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            substeps: 2,
            cfl_limit: 1.0,
            dt_max: 1.0 / 30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForceOptions {
    pub gravity: [f32; 3],
    pub wind: [f32; 3],
}

impl Default for ForceOptions {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81, 0.0],
            wind: [0.0, 0.0, 0.0],
        }
    }
}

impl ForceOptions {
    /// Uniform body acceleration applied on the grid.
    pub fn acceleration(&self) -> Vec3 {
        Vec3::from_array(self.gravity) + Vec3::from_array(self.wind)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlipOptions {
    /// 0 = pure PIC, 1 = pure FLIP.
    pub pic_flip: f32,
    pub apic: bool,
    pub pressure_iters: u32,
    pub pressure_tolerance: f32,
    pub relaxation: f32,
    pub warm_start: bool,
    pub vorticity: f32,
    pub viscosity: f32,
    pub surface_tension: f32,
    pub cohesion: f32,
}

impl Default for FlipOptions {
    fn default() -> Self {
        Self {
            pic_flip: 0.95,
            apic: false,
            pressure_iters: 12,
            pressure_tolerance: 1.0e-3,
            relaxation: 0.8,
            warm_start: false,
            vorticity: 0.0,
            viscosity: 0.05,
            surface_tension: 0.0,
            cohesion: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MpmOptions {
    pub model: MpmModel,
    pub youngs_modulus: f32,
    pub poisson_ratio: f32,
    pub yield_stress: f32,
    pub hardening: f32,
    /// Degrees.
    pub friction_angle: f32,
    pub cohesion: f32,
    pub viscosity: f32,
    pub density: f32,
    pub apic_blend: f32,
    pub grid_speed_limit: f32,
}

impl Default for MpmOptions {
    fn default() -> Self {
        Self {
            model: MpmModel::Elastic,
            youngs_modulus: 5.0e4,
            poisson_ratio: 0.3,
            yield_stress: 200.0,
            hardening: 0.0,
            friction_angle: 30.0,
            cohesion: 0.0,
            viscosity: 5.0,
            density: 1000.0,
            apic_blend: 1.0,
            grid_speed_limit: 20.0,
        }
    }
}

impl MpmOptions {
    /// Lame parameters (lambda, mu) from Young's modulus and Poisson's ratio.
    pub fn lame(&self) -> (f32, f32) {
        let e = self.youngs_modulus;
        let nu = self.poisson_ratio;
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let mu = e / (2.0 * (1.0 + nu));
        (lambda, mu)
    }
}

/// Per-kind XPBD compliance (inverse stiffness). Zero is a hard contact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Compliance {
    pub plane: f32,
    pub sphere: f32,
    #[serde(rename = "box")]
    pub aabb: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XpbdOptions {
    pub iters: u32,
    pub compliance: Compliance,
}

impl Default for XpbdOptions {
    fn default() -> Self {
        Self {
            iters: 2,
            compliance: Compliance::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmitOptions {
    pub enabled: bool,
    /// Particles per second.
    pub rate: f32,
    pub shape: EmitShape,
    pub center: [f32; 3],
    /// Sphere radius.
    pub radius: f32,
    /// Box full extents.
    pub size: [f32; 3],
    pub direction: [f32; 3],
    pub speed: f32,
    pub speed_jitter: f32,
    /// Lifetime range in seconds.
    pub life: [f32; 2],
    pub seed: u64,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 2000.0,
            shape: EmitShape::Sphere,
            center: [0.0, 1.6, 0.0],
            radius: 0.2,
            size: [0.4, 0.4, 0.4],
            direction: [0.0, -1.0, 0.0],
            speed: 1.0,
            speed_jitter: 0.25,
            life: [4.0, 8.0],
            seed: 0x5eed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    pub point_size: f32,
    pub color_mode: ColorMode,
    pub color: [f32; 3],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            point_size: 2.0,
            color_mode: ColorMode::Velocity,
            color: [0.35, 0.6, 1.0],
        }
    }
}

/// Complete, immutable simulation configuration snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationOptions {
    pub mode: Mode,
    pub max_particles: u32,
    pub grid: GridOptions,
    pub time: TimeOptions,
    pub forces: ForceOptions,
    pub flip: FlipOptions,
    pub mpm: MpmOptions,
    pub xpbd: XpbdOptions,
    pub emit: EmitOptions,
    pub render: RenderOptions,
    pub colliders: Vec<Collider>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Flip,
            max_particles: 32_768,
            grid: GridOptions::default(),
            time: TimeOptions::default(),
            forces: ForceOptions::default(),
            flip: FlipOptions::default(),
            mpm: MpmOptions::default(),
            xpbd: XpbdOptions::default(),
            emit: EmitOptions::default(),
            render: RenderOptions::default(),
            colliders: vec![Collider::ground(0.0)],
        }
    }
}

impl SimulationOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(self)
    }

    /// Mass assigned to a freshly spawned particle by the active backend.
    pub fn particle_mass(&self) -> f32 {
        match self.mode {
            Mode::Flip => 1.0,
            Mode::Mpm => self.mpm.density * self.particle_volume(),
        }
    }

    /// Rest volume of an MPM particle: a half-cell cube.
    pub fn particle_volume(&self) -> f32 {
        (self.grid.dx * 0.5).powi(3)
    }

    /// True when switching from `self` to `other` needs fresh buffers.
    pub fn needs_realloc(&self, other: &SimulationOptions) -> bool {
        self.mode != other.mode
            || self.max_particles != other.max_particles
            || self.grid != other.grid
    }
}

/// Fully-populated default configuration.
pub fn create_default() -> SimulationOptions {
    SimulationOptions::default()
}

/// Check an options snapshot. Pure: never mutates `opts`.
///
/// Comparisons are written so that NaN fails them.
pub fn validate(opts: &SimulationOptions) -> Result<(), ConfigError> {
    if opts.max_particles == 0 {
        return Err(ConfigError::MaxParticles);
    }
    if opts.grid.resolution.contains(&0) {
        return Err(ConfigError::GridResolution(opts.grid.resolution));
    }
    if !(opts.grid.dx > 0.0) {
        return Err(ConfigError::CellSize(opts.grid.dx));
    }
    if opts.time.substeps < 1 {
        return Err(ConfigError::Substeps);
    }
    if !(opts.time.dt_max > 0.0) {
        return Err(ConfigError::DtMax(opts.time.dt_max));
    }
    if !(opts.time.cfl_limit > 0.0 && opts.time.cfl_limit.is_finite()) {
        return Err(ConfigError::CflLimit(opts.time.cfl_limit));
    }

    match opts.mode {
        Mode::Flip => {
            if opts.flip.pressure_iters < 1 {
                return Err(ConfigError::PressureIters);
            }
            if !(0.0..=1.0).contains(&opts.flip.pic_flip) {
                return Err(ConfigError::PicFlip(opts.flip.pic_flip));
            }
        }
        Mode::Mpm => {
            if !(opts.mpm.youngs_modulus > 0.0) {
                return Err(ConfigError::YoungsModulus(opts.mpm.youngs_modulus));
            }
            if !(0.0..0.5).contains(&opts.mpm.poisson_ratio) {
                return Err(ConfigError::PoissonRatio(opts.mpm.poisson_ratio));
            }
            if !(opts.mpm.grid_speed_limit > 0.0) {
                return Err(ConfigError::GridSpeedLimit(opts.mpm.grid_speed_limit));
            }
        }
    }

    for (index, collider) in opts.colliders.iter().enumerate() {
        for (field, value) in [
            ("friction", collider.friction),
            ("restitution", collider.restitution),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ColliderCoefficient {
                    index,
                    field,
                    value,
                });
            }
        }
        if !(collider.thickness >= 0.0) {
            return Err(ConfigError::ColliderThickness {
                index,
                value: collider.thickness,
            });
        }
    }

    if !(opts.emit.rate >= 0.0 && opts.emit.rate.is_finite()) {
        return Err(ConfigError::EmitRate(opts.emit.rate));
    }
    let [lo, hi] = opts.emit.life;
    if !(lo > 0.0 && hi >= lo) {
        return Err(ConfigError::EmitLife(opts.emit.life));
    }

    Ok(())
}
