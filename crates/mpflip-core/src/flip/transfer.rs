//! FLIP particle-to-grid and grid-to-particle transfers.

use glam::{Mat3, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::forces::PostForces;
use crate::grid::GridBuffers;
use crate::particle::ParticleBuffers;
use crate::passes::scatter_to_grid;

/// Particle to grid: each particle deposits its mass and momentum into the
/// cell that contains it. With `apic` the affine term `C * (center - x)`
/// is added to the deposited velocity.
pub fn p2g(particles: &ParticleBuffers, grid: &mut GridBuffers, apic: bool) {
    let geo = grid.geometry();
    scatter_to_grid(grid, particles.alive(), |p, acc| {
        let x = particles.position[p];
        let c = geo.cell_of(x);
        let m = particles.mass[p];
        let mut v = particles.velocity[p];
        if apic {
            v += particles.affine[p] * (geo.cell_center(c) - x);
        }
        acc[geo.index(c)] += (v * m).extend(m);
    });
}

#[derive(Clone, Copy, Debug)]
pub struct G2pParams {
    /// 0 = PIC, 1 = FLIP.
    pub pic_flip: f32,
    pub apic: bool,
    pub post: PostForces,
    pub cfl_limit: f32,
}

/// Grid to particle: PIC/FLIP blend from the containing cell, optional APIC
/// matrix, post forces, CFL speed clamp, then advection.
pub fn g2p(particles: &mut ParticleBuffers, grid: &GridBuffers, params: &G2pParams, dt: f32) {
    let n = particles.alive();
    let max_speed = params.cfl_limit * grid.dx() / dt;

    let update = |p: usize| -> (Vec3, Vec3, Mat3) {
        let x = particles.position[p];
        let c = grid.cell_of(x);
        let idx = grid.index(c);

        let v_grid = grid.velocity(idx);
        let v_old = grid.old_velocity(idx);
        let v_flip = particles.velocity[p] + (v_grid - v_old);
        let mut v = v_grid.lerp(v_flip, params.pic_flip);

        let affine = if params.apic {
            grid.velocity_gradient(c)
        } else {
            Mat3::ZERO
        };

        v = params.post.apply(v, grid, c, dt);
        if !v.is_finite() {
            v = Vec3::ZERO;
        }
        v = v.clamp_length_max(max_speed);
        (x + v * dt, v, affine)
    };

    #[cfg(feature = "parallel")]
    let results: Vec<(Vec3, Vec3, Mat3)> = (0..n).into_par_iter().map(update).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Vec3, Vec3, Mat3)> = (0..n).map(update).collect();

    for (p, (x, v, affine)) in results.into_iter().enumerate() {
        particles.position[p] = x;
        particles.velocity[p] = v;
        particles.affine[p] = affine;
    }
}
