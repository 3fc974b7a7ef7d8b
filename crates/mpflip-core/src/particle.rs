//! Structure-of-arrays particle storage with a live prefix.

use glam::{Mat3, Vec3, Vec4};

use crate::buffers::try_filled;
use crate::error::ResourceError;

/// Material vector of a fresh particle: friction coefficient, stiffness
/// scale, plastic strain, plastic volume ratio.
pub const DEFAULT_MATERIAL: Vec4 = Vec4::new(0.0, 1.0, 0.0, 1.0);

/// Initial state for one spawned particle.
#[derive(Clone, Copy, Debug)]
pub struct ParticleInit {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f32,
    pub life: f32,
    pub material: Vec4,
}

/// SoA particle storage.
///
/// Slots `[0, alive)` hold live particles, `[alive, capacity)` are free.
/// The arrays never grow or move; only slot contents change.
#[derive(Debug)]
pub struct ParticleBuffers {
    pub position: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    /// APIC affine velocity matrix C.
    pub affine: Vec<Mat3>,
    /// MPM deformation gradient F.
    pub deformation: Vec<Mat3>,
    /// Kirchhoff stress scratch (MPM).
    pub stress: Vec<Mat3>,
    pub mass: Vec<f32>,
    pub material: Vec<Vec4>,
    /// Remaining life in seconds; <= 0 means dead.
    pub life: Vec<f32>,
    alive: usize,
}

impl ParticleBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            position: vec![Vec3::ZERO; capacity],
            velocity: vec![Vec3::ZERO; capacity],
            affine: vec![Mat3::ZERO; capacity],
            deformation: vec![Mat3::IDENTITY; capacity],
            stress: vec![Mat3::ZERO; capacity],
            mass: vec![0.0; capacity],
            material: vec![DEFAULT_MATERIAL; capacity],
            life: vec![0.0; capacity],
            alive: 0,
        }
    }

    pub(crate) fn try_new(capacity: usize) -> Result<Self, ResourceError> {
        Ok(Self {
            position: try_filled("particle.position", capacity, Vec3::ZERO)?,
            velocity: try_filled("particle.velocity", capacity, Vec3::ZERO)?,
            affine: try_filled("particle.affine", capacity, Mat3::ZERO)?,
            deformation: try_filled("particle.deformation", capacity, Mat3::IDENTITY)?,
            stress: try_filled("particle.stress", capacity, Mat3::ZERO)?,
            mass: try_filled("particle.mass", capacity, 0.0)?,
            material: try_filled("particle.material", capacity, DEFAULT_MATERIAL)?,
            life: try_filled("particle.life", capacity, 0.0)?,
            alive: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    pub fn alive(&self) -> usize {
        self.alive
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.alive
    }

    /// Write `init` into the first free slot. Returns the slot, or `None`
    /// when the buffers are full.
    pub fn spawn(&mut self, init: &ParticleInit) -> Option<usize> {
        if self.alive >= self.capacity() {
            return None;
        }
        let slot = self.alive;
        self.position[slot] = init.position;
        self.velocity[slot] = init.velocity;
        self.affine[slot] = Mat3::ZERO;
        self.deformation[slot] = Mat3::IDENTITY;
        self.stress[slot] = Mat3::ZERO;
        self.mass[slot] = init.mass;
        self.material[slot] = init.material;
        self.life[slot] = init.life;
        self.alive += 1;
        Some(slot)
    }

    /// Overwrite `slot` with the last live particle and shrink the live range.
    pub fn swap_remove(&mut self, slot: usize) {
        debug_assert!(slot < self.alive);
        let last = self.alive - 1;
        if slot != last {
            self.position[slot] = self.position[last];
            self.velocity[slot] = self.velocity[last];
            self.affine[slot] = self.affine[last];
            self.deformation[slot] = self.deformation[last];
            self.stress[slot] = self.stress[last];
            self.mass[slot] = self.mass[last];
            self.material[slot] = self.material[last];
            self.life[slot] = self.life[last];
        }
        self.life[last] = 0.0;
        self.alive = last;
    }

    /// Drop the whole population. Slot contents are left for reuse.
    pub fn clear(&mut self) {
        self.alive = 0;
    }

    pub fn total_mass(&self) -> f32 {
        self.mass[..self.alive].iter().sum()
    }

    /// Live slots whose life is still positive.
    pub fn count_living(&self) -> usize {
        self.life[..self.alive].iter().filter(|&&l| l > 0.0).count()
    }
}
