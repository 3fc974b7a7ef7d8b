//! Extra fluid forces applied during FLIP G2P, driven by grid vorticity
//! and the sampled cell state.

use glam::Vec3;

use crate::grid::{GridBuffers, CELL_FLUID};

/// Curl of the grid velocity on fluid cells, written to `grid.vorticity`.
pub fn compute_vorticity(grid: &mut GridBuffers) {
    for idx in 0..grid.cell_count() {
        grid.vorticity[idx] = if grid.flags[idx] == CELL_FLUID {
            let g = grid.velocity_gradient(grid.coords(idx));
            Vec3::new(
                g.y_axis.z - g.z_axis.y,
                g.z_axis.x - g.x_axis.z,
                g.x_axis.y - g.y_axis.x,
            )
        } else {
            Vec3::ZERO
        };
    }
}

/// Linear per-particle forces applied after the grid sample in FLIP G2P.
///
/// All zero leaves the velocity untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PostForces {
    /// Vorticity confinement strength.
    pub vorticity: f32,
    pub viscosity: f32,
    pub surface_tension: f32,
    pub cohesion: f32,
}

impl PostForces {
    pub fn apply(&self, mut v: Vec3, grid: &GridBuffers, c: [usize; 3], dt: f32) -> Vec3 {
        if self.vorticity > 0.0 {
            let omega = grid.vorticity[grid.index(c)];
            let inv = 0.5 / grid.dx();
            let mag = |axis: usize, step: isize| {
                grid.neighbor(c, axis, step)
                    .map_or(0.0, |n| grid.vorticity[n].length())
            };
            let eta = Vec3::new(
                (mag(0, 1) - mag(0, -1)) * inv,
                (mag(1, 1) - mag(1, -1)) * inv,
                (mag(2, 1) - mag(2, -1)) * inv,
            );
            let n = eta.normalize_or_zero();
            v += n.cross(omega) * (self.vorticity * dt);
        }
        if self.viscosity > 0.0 {
            v *= (-self.viscosity * dt).exp();
        }
        if self.surface_tension > 0.0 {
            v /= 1.0 + self.surface_tension * dt;
        }
        if self.cohesion > 0.0 {
            let toward_mass = grid.mass_gradient(c).normalize_or_zero();
            v += toward_mass * (self.cohesion * dt);
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOptions;

    fn grid() -> GridBuffers {
        GridBuffers::new(&GridOptions {
            resolution: [5, 5, 5],
            dx: 1.0,
            origin: [0.0; 3],
        })
    }

    #[test]
    fn test_rigid_rotation_has_uniform_curl() {
        let mut g = grid();
        for idx in 0..g.cell_count() {
            let p = g.cell_center(g.coords(idx));
            // v = omega x r with omega = (0, 0, 1)
            g.set_velocity(idx, Vec3::new(-p.y, p.x, 0.0));
            g.flags[idx] = CELL_FLUID;
        }
        compute_vorticity(&mut g);
        let center = g.index([2, 2, 2]);
        assert!((g.vorticity[center] - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_damping_terms() {
        let g = grid();
        let v = Vec3::new(1.0, 0.0, 0.0);
        let visc = PostForces {
            viscosity: 2.0,
            ..Default::default()
        };
        let out = visc.apply(v, &g, [2, 2, 2], 0.1);
        assert!((out.x - (-0.2f32).exp()).abs() < 1e-6);

        let tension = PostForces {
            surface_tension: 1.0,
            ..Default::default()
        };
        let out = tension.apply(v, &g, [2, 2, 2], 0.25);
        assert!((out.x - 0.8).abs() < 1e-6);

        assert_eq!(PostForces::default().apply(v, &g, [2, 2, 2], 0.1), v);
    }

    #[test]
    fn test_cohesion_pulls_toward_mass() {
        let mut g = grid();
        let heavy = g.index([3, 2, 2]);
        g.mass[heavy] = 4.0;
        let pull = PostForces {
            cohesion: 1.0,
            ..Default::default()
        };
        let out = pull.apply(Vec3::ZERO, &g, [2, 2, 2], 0.1);
        assert!(out.x > 0.0 && out.y.abs() < 1e-6);
    }
}
