//! MLS-MPM transfers over the 3x3x3 quadratic B-spline stencil.

use glam::{Mat3, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::grid::{GridBuffers, GridGeometry};
use crate::math::outer;
use crate::particle::ParticleBuffers;
use crate::passes::scatter_to_grid;

/// Quadratic B-spline weights of the three nodes around a particle.
///
/// `fx` is the particle's offset from the first node, in cells, in
/// `[0.5, 1.5)`.
#[inline]
pub fn quadratic_weights(fx: f32) -> [f32; 3] {
    [
        0.5 * (1.5 - fx) * (1.5 - fx),
        0.75 - (fx - 1.0) * (fx - 1.0),
        0.5 * (fx - 0.5) * (fx - 0.5),
    ]
}

/// 3x3x3 interpolation stencil of one particle.
#[derive(Clone, Copy, Debug)]
pub struct Stencil {
    /// Node coordinates per axis, clamped into the grid.
    pub nodes: [[usize; 3]; 3],
    /// Weights per axis, `weights[axis][offset]`.
    pub weights: [[f32; 3]; 3],
}

impl Stencil {
    pub fn new(geo: &GridGeometry, x: Vec3) -> Self {
        // Cell centres sit at integer coordinates in this frame.
        let xp = (x - geo.origin) / geo.dx - Vec3::splat(0.5);
        let mut nodes = [[0usize; 3]; 3];
        let mut weights = [[0.0f32; 3]; 3];
        for axis in 0..3 {
            let n = geo.resolution[axis];
            let coord = if xp[axis].is_finite() { xp[axis] } else { 0.0 };
            let base = (coord - 0.5).floor();
            let fx = (coord - base).clamp(0.5, 1.5);
            weights[axis] = quadratic_weights(fx);
            let first = (base as i64).clamp(0, (n as i64 - 3).max(0)) as usize;
            for o in 0..3 {
                nodes[axis][o] = (first + o).min(n - 1);
            }
        }
        Self { nodes, weights }
    }

    /// Visit all 27 nodes with their flat index, weight and cell centre.
    #[inline]
    pub fn for_each(&self, geo: &GridGeometry, mut f: impl FnMut(usize, f32, Vec3)) {
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    let c = [self.nodes[0][i], self.nodes[1][j], self.nodes[2][k]];
                    let w = self.weights[0][i] * self.weights[1][j] * self.weights[2][k];
                    f(geo.index(c), w, geo.cell_center(c));
                }
            }
        }
    }
}

/// MLS-MPM particle to grid. Deposits `w * m` mass and
/// `w * (m v + (m C - dt V (4/dx^2) tau) (x_i - x_p))` momentum.
pub fn p2g(particles: &ParticleBuffers, grid: &mut GridBuffers, volume: f32, dt: f32) {
    let geo = grid.geometry();
    let stress_scale = -dt * volume * 4.0 / (geo.dx * geo.dx);
    scatter_to_grid(grid, particles.alive(), |p, acc| {
        let x = particles.position[p];
        let m = particles.mass[p];
        let momentum = particles.velocity[p] * m;
        let affine = particles.affine[p] * m + particles.stress[p] * stress_scale;
        Stencil::new(&geo, x).for_each(&geo, |idx, w, node| {
            let dpos = node - x;
            acc[idx] += ((momentum + affine * dpos) * w).extend(w * m);
        });
    });
}

/// MLS-MPM grid to particle: velocity, velocity gradient, APIC matrix,
/// deformation update and advection.
pub fn g2p(particles: &mut ParticleBuffers, grid: &GridBuffers, apic_blend: f32, dt: f32) {
    let geo = grid.geometry();
    let n = particles.alive();
    let grad_scale = 4.0 / (geo.dx * geo.dx);

    let update = |p: usize| -> (Vec3, Vec3, Mat3, Mat3) {
        let x = particles.position[p];
        let mut v = Vec3::ZERO;
        let mut b = Mat3::ZERO;
        Stencil::new(&geo, x).for_each(&geo, |idx, w, node| {
            let vi = grid.velocity(idx);
            v += vi * w;
            b += outer(vi * w, node - x);
        });
        let gradient = b * grad_scale;
        let f = (Mat3::IDENTITY + gradient * dt) * particles.deformation[p];
        (x + v * dt, v, gradient * apic_blend, f)
    };

    #[cfg(feature = "parallel")]
    let results: Vec<(Vec3, Vec3, Mat3, Mat3)> = (0..n).into_par_iter().map(update).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Vec3, Vec3, Mat3, Mat3)> = (0..n).map(update).collect();

    for (p, (x, v, affine, f)) in results.into_iter().enumerate() {
        particles.position[p] = x;
        particles.velocity[p] = v;
        particles.affine[p] = affine;
        particles.deformation[p] = f;
    }
}
