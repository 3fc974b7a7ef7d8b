//! Jacobi-style pressure relaxation on the collocated grid.
//!
//! Each iteration measures divergence, relaxes pressure toward
//! `-divergence` and subtracts the scaled pressure gradient. The gradient
//! scale `dx^2 / 3` keeps every iteration from increasing the divergence
//! norm when `relaxation = 1`.

use crate::grid::{GridBuffers, CELL_FLUID};
use crate::math::mix;

/// Outcome of a fixed-iteration solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressureReport {
    /// RMS divergence over fluid cells before the first iteration.
    pub initial_residual: f32,
    /// RMS divergence after the last iteration.
    pub residual: f32,
    pub iterations: u32,
}

impl PressureReport {
    pub fn converged(&self, tolerance: f32) -> bool {
        self.residual <= tolerance
    }
}

#[inline]
fn component(grid: &GridBuffers, axis: usize, idx: usize) -> f32 {
    match axis {
        0 => grid.u[idx],
        1 => grid.v[idx],
        _ => grid.w[idx],
    }
}

#[inline]
fn component_mut(grid: &mut GridBuffers, axis: usize) -> &mut [f32] {
    match axis {
        0 => &mut grid.u,
        1 => &mut grid.v,
        _ => &mut grid.w,
    }
}

/// Central-difference divergence on fluid cells, zero elsewhere. Velocity
/// outside the grid counts as zero. Returns the RMS over fluid cells.
pub fn compute_divergence(grid: &mut GridBuffers) -> f32 {
    let inv = 0.5 / grid.dx();
    let mut sum_sq = 0.0f64;
    let mut fluid = 0usize;
    for idx in 0..grid.cell_count() {
        if grid.flags[idx] != CELL_FLUID {
            grid.divergence[idx] = 0.0;
            continue;
        }
        let c = grid.coords(idx);
        let mut div = 0.0;
        for axis in 0..3 {
            let hi = grid.neighbor(c, axis, 1).map_or(0.0, |n| component(grid, axis, n));
            let lo = grid.neighbor(c, axis, -1).map_or(0.0, |n| component(grid, axis, n));
            div += (hi - lo) * inv;
        }
        grid.divergence[idx] = div;
        sum_sq += (div as f64) * (div as f64);
        fluid += 1;
    }
    if fluid == 0 {
        0.0
    } else {
        (sum_sq / fluid as f64).sqrt() as f32
    }
}

/// `pressure = mix(pressure, -divergence, relaxation)` on fluid cells,
/// zero elsewhere.
pub fn relax_pressure(grid: &mut GridBuffers, relaxation: f32) {
    for idx in 0..grid.cell_count() {
        grid.pressure[idx] = if grid.flags[idx] == CELL_FLUID {
            mix(grid.pressure[idx], -grid.divergence[idx], relaxation)
        } else {
            0.0
        };
    }
}

/// Subtract `dx^2 / 3` times the central-difference pressure gradient from
/// fluid-cell velocities.
pub fn apply_pressure_gradient(grid: &mut GridBuffers) {
    let dx = grid.dx();
    let scale = dx * dx / 3.0 * (0.5 / dx);
    for axis in 0..3 {
        for idx in 0..grid.cell_count() {
            if grid.flags[idx] != CELL_FLUID {
                continue;
            }
            let c = grid.coords(idx);
            let hi = grid.neighbor(c, axis, 1).map_or(0.0, |n| grid.pressure[n]);
            let lo = grid.neighbor(c, axis, -1).map_or(0.0, |n| grid.pressure[n]);
            component_mut(grid, axis)[idx] += scale * (lo - hi);
        }
    }
}

/// One relaxation iteration. Returns the RMS divergence measured at its start.
pub fn iterate(grid: &mut GridBuffers, relaxation: f32) -> f32 {
    let residual = compute_divergence(grid);
    relax_pressure(grid, relaxation);
    apply_pressure_gradient(grid);
    residual
}

/// Run exactly `iterations` relaxation iterations. No early exit.
pub fn solve(grid: &mut GridBuffers, iterations: u32, relaxation: f32) -> PressureReport {
    let mut initial_residual = None;
    for _ in 0..iterations {
        let r = iterate(grid, relaxation);
        initial_residual.get_or_insert(r);
    }
    let residual = compute_divergence(grid);
    PressureReport {
        initial_residual: initial_residual.unwrap_or(residual),
        residual,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOptions;
    use glam::Vec3;

    fn divergent_grid() -> GridBuffers {
        let mut g = GridBuffers::new(&GridOptions {
            resolution: [10, 10, 10],
            dx: 0.1,
            origin: [0.0; 3],
        });
        let center = Vec3::splat(0.5);
        for idx in 0..g.cell_count() {
            let c = g.coords(idx);
            if g.is_boundary(c, 1) {
                continue;
            }
            g.flags[idx] = CELL_FLUID;
            let r = g.cell_center(c) - center;
            g.set_velocity(idx, r * 2.0);
        }
        g
    }

    #[test]
    fn test_radial_field_is_divergent() {
        let mut g = divergent_grid();
        assert!(compute_divergence(&mut g) > 1.0);
    }

    #[test]
    fn test_divergence_non_increasing_with_full_relaxation() {
        let mut g = divergent_grid();
        let mut prev = compute_divergence(&mut g);
        for i in 0..20 {
            iterate(&mut g, 1.0);
            let now = compute_divergence(&mut g);
            assert!(now <= prev * (1.0 + 1e-4), "iteration {i}: {now} > {prev}");
            prev = now;
        }
    }

    #[test]
    fn test_solve_reduces_residual() {
        let mut g = divergent_grid();
        let report = solve(&mut g, 12, 0.8);
        assert!(report.residual < report.initial_residual);
        assert_eq!(report.iterations, 12);
        assert!(!report.converged(0.0));
    }

    #[test]
    fn test_non_fluid_cells_hold_zero_pressure() {
        let mut g = divergent_grid();
        solve(&mut g, 4, 1.0);
        for idx in 0..g.cell_count() {
            if g.flags[idx] != CELL_FLUID {
                assert_eq!(g.pressure[idx], 0.0);
            }
        }
    }
}
