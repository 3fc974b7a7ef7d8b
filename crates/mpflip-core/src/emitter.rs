//! Rate-based particle emission and lifetime aging.

use std::f32::consts::TAU;

use glam::{Vec3, Vec4};
use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::{EmitOptions, EmitShape};
use crate::particle::{ParticleBuffers, ParticleInit};

/// Continuous-rate particle source.
///
/// Emission is fractional: `rate * dt` accumulates and whole particles are
/// released into the first free slots.
#[derive(Clone, Debug)]
pub struct Emitter {
    opts: EmitOptions,
    mass: f32,
    material: Vec4,
    accumulator: f32,
    rng: StdRng,
}

impl Emitter {
    /// `mass` and `material` are the backend's per-particle initial values.
    pub fn new(opts: &EmitOptions, mass: f32, material: Vec4) -> Self {
        Self {
            opts: opts.clone(),
            mass,
            material,
            accumulator: 0.0,
            rng: StdRng::seed_from_u64(opts.seed),
        }
    }

    /// Swap in new settings between steps. The random stream and the
    /// fractional remainder carry over unless the seed changed.
    pub fn reconfigure(&mut self, opts: &EmitOptions, mass: f32, material: Vec4) {
        if opts.seed != self.opts.seed {
            self.rng = StdRng::seed_from_u64(opts.seed);
            self.accumulator = 0.0;
        }
        self.opts = opts.clone();
        self.mass = mass;
        self.material = material;
    }

    pub fn center(&self) -> Vec3 {
        Vec3::from_array(self.opts.center)
    }

    /// Fraction of a particle carried to the next call.
    pub fn pending(&self) -> f32 {
        self.accumulator
    }

    /// Emit this step's particles. Returns how many were written.
    pub fn spawn(&mut self, particles: &mut ParticleBuffers, dt: f32) -> usize {
        if !self.opts.enabled || !(dt > 0.0) {
            return 0;
        }
        self.accumulator += self.opts.rate * dt;
        let wanted = self.accumulator.floor();
        self.accumulator -= wanted;
        let wanted = wanted as usize;

        let count = wanted.min(particles.free());
        if count < wanted {
            warn!(
                "emitter clamped by capacity: {} requested, {} free of {}",
                wanted,
                particles.free(),
                particles.capacity()
            );
        }

        for _ in 0..count {
            let init = self.sample();
            particles.spawn(&init);
        }
        count
    }

    fn sample(&mut self) -> ParticleInit {
        let center = self.center();
        let position = match self.opts.shape {
            EmitShape::Sphere => {
                let z: f32 = self.rng.random_range(-1.0..=1.0);
                let phi = self.rng.random::<f32>() * TAU;
                let ring = (1.0 - z * z).max(0.0).sqrt();
                let dir = Vec3::new(ring * phi.cos(), z, ring * phi.sin());
                let r = self.opts.radius * self.rng.random::<f32>().cbrt();
                center + dir * r
            }
            EmitShape::Box => {
                let jitter = Vec3::new(
                    self.rng.random::<f32>() - 0.5,
                    self.rng.random::<f32>() - 0.5,
                    self.rng.random::<f32>() - 0.5,
                );
                center + jitter * Vec3::from_array(self.opts.size)
            }
        };

        let direction = Vec3::from_array(self.opts.direction).normalize_or_zero();
        let speed =
            self.opts.speed + self.opts.speed_jitter * (2.0 * self.rng.random::<f32>() - 1.0);
        let [lo, hi] = self.opts.life;
        let life = lo + (hi - lo) * self.rng.random::<f32>();

        ParticleInit {
            position,
            velocity: direction * speed,
            mass: self.mass,
            life,
            material: self.material,
        }
    }
}

/// Age every live particle by `dt` and compact out the dead by
/// swap-with-last. Returns the number removed.
pub fn integrate_lifetime(particles: &mut ParticleBuffers, dt: f32) -> usize {
    let mut removed = 0;
    let mut i = 0;
    while i < particles.alive() {
        particles.life[i] -= dt;
        if particles.life[i] <= 0.0 {
            // The particle swapped into `i` has not aged yet; revisit `i`.
            particles.swap_remove(i);
            removed += 1;
        } else {
            i += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::DEFAULT_MATERIAL;

    fn emit(rate: f32, shape: EmitShape) -> EmitOptions {
        EmitOptions {
            rate,
            shape,
            ..Default::default()
        }
    }

    #[test]
    fn test_fractional_accumulation() {
        let mut particles = ParticleBuffers::new(100);
        let mut emitter = Emitter::new(&emit(4.0, EmitShape::Sphere), 1.0, DEFAULT_MATERIAL);
        let mut total = 0;
        for _ in 0..10 {
            total += emitter.spawn(&mut particles, 0.125);
        }
        assert_eq!(total, 5);
        assert!(emitter.pending() < 1.0);
    }

    #[test]
    fn test_clamped_to_capacity_and_excess_dropped() {
        let mut particles = ParticleBuffers::new(10);
        let mut emitter = Emitter::new(&emit(10_000.0, EmitShape::Box), 1.0, DEFAULT_MATERIAL);
        assert_eq!(emitter.spawn(&mut particles, 0.1), 10);
        assert_eq!(particles.alive(), 10);
        assert!(emitter.pending() < 1.0);
        assert_eq!(emitter.spawn(&mut particles, 0.1), 0);
    }

    #[test]
    fn test_sphere_samples_inside_radius() {
        let opts = emit(1000.0, EmitShape::Sphere);
        let mut particles = ParticleBuffers::new(1000);
        let mut emitter = Emitter::new(&opts, 1.0, DEFAULT_MATERIAL);
        emitter.spawn(&mut particles, 1.0);
        let center = Vec3::from_array(opts.center);
        for i in 0..particles.alive() {
            let d = (particles.position[i] - center).length();
            assert!(d <= opts.radius + 1e-5, "particle {i} at distance {d}");
            let life = particles.life[i];
            assert!(life >= opts.life[0] && life <= opts.life[1]);
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let opts = emit(100.0, EmitShape::Sphere);
        let mut a = ParticleBuffers::new(64);
        let mut b = ParticleBuffers::new(64);
        Emitter::new(&opts, 1.0, DEFAULT_MATERIAL).spawn(&mut a, 0.5);
        Emitter::new(&opts, 1.0, DEFAULT_MATERIAL).spawn(&mut b, 0.5);
        assert_eq!(a.position[..a.alive()], b.position[..b.alive()]);
    }

    #[test]
    fn test_lifetime_compaction() {
        let mut particles = ParticleBuffers::new(8);
        for (i, life) in [0.05, 1.0, 0.05, 0.05, 2.0].into_iter().enumerate() {
            particles.spawn(&ParticleInit {
                position: Vec3::splat(i as f32),
                velocity: Vec3::ZERO,
                mass: 1.0,
                life,
                material: DEFAULT_MATERIAL,
            });
        }
        let removed = integrate_lifetime(&mut particles, 0.1);
        assert_eq!(removed, 3);
        assert_eq!(particles.alive(), 2);
        assert_eq!(particles.count_living(), particles.alive());
        for i in 0..2 {
            assert!((particles.life[i] - 0.9).abs() < 1e-6 || (particles.life[i] - 1.9).abs() < 1e-6);
        }
    }
}
