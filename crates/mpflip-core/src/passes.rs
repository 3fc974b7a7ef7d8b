//! Grid and particle kernels shared by the FLIP and MPM pass lists.

use glam::{Vec3, Vec4};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::grid::{GridBuffers, CELL_AIR, CELL_FLUID, CELL_SOLID};
use crate::math::safe_recip;
use crate::particle::ParticleBuffers;

/// Particles below this height are returned to the emitter.
pub const RESEED_FLOOR: f32 = -10.0;

/// Zero every accumulation target. Never skipped.
pub fn clear_grid(grid: &mut GridBuffers, keep_pressure: bool) {
    grid.clear(keep_pressure);
}

/// Sum per-particle `(momentum, mass)` contributions into grid cells.
///
/// `deposit(p, acc)` adds particle `p`'s contributions into `acc`, indexed
/// by flat cell index. With the `parallel` feature each worker fills a
/// private partial grid and the partials are summed.
pub fn scatter_to_grid<F>(grid: &mut GridBuffers, particles: usize, deposit: F)
where
    F: Fn(usize, &mut [Vec4]) + Sync + Send,
{
    let cells = grid.cell_count();

    #[cfg(feature = "parallel")]
    let acc = (0..particles)
        .into_par_iter()
        .fold(
            || vec![Vec4::ZERO; cells],
            |mut acc, p| {
                deposit(p, &mut acc);
                acc
            },
        )
        .reduce(
            || vec![Vec4::ZERO; cells],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );

    #[cfg(not(feature = "parallel"))]
    let acc = {
        let mut acc = vec![Vec4::ZERO; cells];
        for p in 0..particles {
            deposit(p, &mut acc);
        }
        acc
    };

    for (idx, a) in acc.into_iter().enumerate() {
        grid.u[idx] += a.x;
        grid.v[idx] += a.y;
        grid.w[idx] += a.z;
        grid.mass[idx] += a.w;
    }
}

/// Turn accumulated momentum into velocity, snapshot it, apply body
/// acceleration, classify cells and close the domain walls.
///
/// Must run only after every P2G contribution of the step is in.
/// `boundary_layers` cells along each face are `SOLID` and cannot carry
/// velocity out of the domain.
pub fn grid_forces(grid: &mut GridBuffers, dt: f32, accel: Vec3, boundary_layers: usize) {
    let [nx, ny, nz] = grid.resolution();
    for idx in 0..grid.cell_count() {
        let m = grid.mass[idx];
        let inv_m = safe_recip(m);
        let mut vel = grid.velocity(idx) * inv_m;
        grid.u0[idx] = vel.x;
        grid.v0[idx] = vel.y;
        grid.w0[idx] = vel.z;

        let c = grid.coords(idx);
        let solid = grid.is_boundary(c, boundary_layers);
        grid.flags[idx] = if solid {
            CELL_SOLID
        } else if m > 0.0 {
            CELL_FLUID
        } else {
            CELL_AIR
        };

        if m > 0.0 {
            vel += accel * dt;
        }
        if solid {
            let n = [nx, ny, nz];
            for a in 0..3 {
                if c[a] < boundary_layers && vel[a] < 0.0 {
                    vel[a] = 0.0;
                }
                if c[a] + boundary_layers >= n[a] && vel[a] > 0.0 {
                    vel[a] = 0.0;
                }
            }
        }
        grid.set_velocity(idx, vel);
    }
}

/// Cap grid speed at `max_speed`, keeping direction.
pub fn clamp_grid_velocity(grid: &mut GridBuffers, max_speed: f32) {
    for idx in 0..grid.cell_count() {
        let vel = grid.velocity(idx);
        if !vel.is_finite() {
            grid.set_velocity(idx, Vec3::ZERO);
        } else if vel.length_squared() > max_speed * max_speed {
            grid.set_velocity(idx, vel.clamp_length_max(max_speed));
        }
    }
}

/// Return fallen particles to `point` with zero velocity. Nothing is
/// culled here. Returns the number moved.
pub fn reseed(particles: &mut ParticleBuffers, point: Vec3) -> usize {
    let n = particles.alive();
    let mut moved = 0;
    for i in 0..n {
        let y = particles.position[i].y;
        if y < RESEED_FLOOR || y.is_nan() {
            particles.position[i] = point;
            particles.velocity[i] = Vec3::ZERO;
            particles.affine[i] = glam::Mat3::ZERO;
            moved += 1;
        }
    }
    moved
}
