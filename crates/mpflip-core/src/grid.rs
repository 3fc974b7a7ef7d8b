//! Collocated Eulerian grid storage and cell geometry.

use glam::{Mat3, Vec3};

use crate::buffers::try_filled;
use crate::config::GridOptions;
use crate::error::ResourceError;

pub const CELL_AIR: u32 = 0;
pub const CELL_FLUID: u32 = 1;
pub const CELL_SOLID: u32 = 2;

/// Shape and placement of the grid, detached from its storage so kernels
/// can map positions to cells while the fields are borrowed mutably.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridGeometry {
    pub resolution: [usize; 3],
    pub dx: f32,
    pub origin: Vec3,
}

impl GridGeometry {
    pub fn new(opts: &GridOptions) -> Self {
        Self {
            resolution: opts.resolution.map(|r| r as usize),
            dx: opts.dx,
            origin: opts.origin_vec(),
        }
    }

    #[inline]
    pub fn index(&self, [i, j, k]: [usize; 3]) -> usize {
        let [nx, ny, _] = self.resolution;
        i + nx * (j + ny * k)
    }

    #[inline]
    pub fn coords(&self, idx: usize) -> [usize; 3] {
        let [nx, ny, _] = self.resolution;
        [idx % nx, (idx / nx) % ny, idx / (nx * ny)]
    }

    /// `floor((p - origin) / dx)` clamped into the grid.
    #[inline]
    pub fn cell_of(&self, p: Vec3) -> [usize; 3] {
        let g = ((p - self.origin) / self.dx).floor();
        let clamp = |x: f32, n: usize| {
            if x.is_nan() {
                0
            } else {
                (x.max(0.0) as usize).min(n - 1)
            }
        };
        [
            clamp(g.x, self.resolution[0]),
            clamp(g.y, self.resolution[1]),
            clamp(g.z, self.resolution[2]),
        ]
    }

    #[inline]
    pub fn cell_center(&self, [i, j, k]: [usize; 3]) -> Vec3 {
        self.origin + (Vec3::new(i as f32, j as f32, k as f32) + 0.5) * self.dx
    }

    /// Whether the cell lies within `layers` cells of any grid face.
    #[inline]
    pub fn is_boundary(&self, c: [usize; 3], layers: usize) -> bool {
        (0..3).any(|a| c[a] < layers || c[a] + layers >= self.resolution[a])
    }

    /// Neighbour `c` offset by `step` along `axis`, or `None` past the edge.
    #[inline]
    pub fn neighbor(&self, c: [usize; 3], axis: usize, step: isize) -> Option<usize> {
        let moved = c[axis] as isize + step;
        if moved < 0 || moved >= self.resolution[axis] as isize {
            return None;
        }
        let mut n = c;
        n[axis] = moved as usize;
        Some(self.index(n))
    }
}

/// Collocated Eulerian grid, one value per cell per field.
///
/// Flat index is `i + nx * (j + ny * k)`.
#[derive(Debug)]
pub struct GridBuffers {
    pub u: Vec<f32>,
    pub v: Vec<f32>,
    pub w: Vec<f32>,
    /// Velocity after normalisation, before body forces.
    pub u0: Vec<f32>,
    pub v0: Vec<f32>,
    pub w0: Vec<f32>,
    pub mass: Vec<f32>,
    pub pressure: Vec<f32>,
    pub divergence: Vec<f32>,
    pub flags: Vec<u32>,
    pub vorticity: Vec<Vec3>,
    geometry: GridGeometry,
}

impl GridBuffers {
    /// Panics if the cell count overflows `usize`; [`crate::buffers::allocate`]
    /// is the fallible path.
    pub fn new(opts: &GridOptions) -> Self {
        let n = opts.cell_count().unwrap_or(usize::MAX);
        Self {
            u: vec![0.0; n],
            v: vec![0.0; n],
            w: vec![0.0; n],
            u0: vec![0.0; n],
            v0: vec![0.0; n],
            w0: vec![0.0; n],
            mass: vec![0.0; n],
            pressure: vec![0.0; n],
            divergence: vec![0.0; n],
            flags: vec![CELL_AIR; n],
            vorticity: vec![Vec3::ZERO; n],
            geometry: GridGeometry::new(opts),
        }
    }

    pub(crate) fn try_new(opts: &GridOptions) -> Result<Self, ResourceError> {
        let n = opts
            .cell_count()
            .ok_or(ResourceError::AllocationFailed("grid"))?;
        Ok(Self {
            u: try_filled("grid.u", n, 0.0)?,
            v: try_filled("grid.v", n, 0.0)?,
            w: try_filled("grid.w", n, 0.0)?,
            u0: try_filled("grid.u0", n, 0.0)?,
            v0: try_filled("grid.v0", n, 0.0)?,
            w0: try_filled("grid.w0", n, 0.0)?,
            mass: try_filled("grid.mass", n, 0.0)?,
            pressure: try_filled("grid.pressure", n, 0.0)?,
            divergence: try_filled("grid.divergence", n, 0.0)?,
            flags: try_filled("grid.flags", n, CELL_AIR)?,
            vorticity: try_filled("grid.vorticity", n, Vec3::ZERO)?,
            geometry: GridGeometry::new(opts),
        })
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn resolution(&self) -> [usize; 3] {
        self.geometry.resolution
    }

    pub fn dx(&self) -> f32 {
        self.geometry.dx
    }

    pub fn origin(&self) -> Vec3 {
        self.geometry.origin
    }

    pub fn cell_count(&self) -> usize {
        self.mass.len()
    }

    #[inline]
    pub fn index(&self, c: [usize; 3]) -> usize {
        self.geometry.index(c)
    }

    #[inline]
    pub fn coords(&self, idx: usize) -> [usize; 3] {
        self.geometry.coords(idx)
    }

    #[inline]
    pub fn cell_of(&self, p: Vec3) -> [usize; 3] {
        self.geometry.cell_of(p)
    }

    #[inline]
    pub fn cell_center(&self, c: [usize; 3]) -> Vec3 {
        self.geometry.cell_center(c)
    }

    #[inline]
    pub fn velocity(&self, idx: usize) -> Vec3 {
        Vec3::new(self.u[idx], self.v[idx], self.w[idx])
    }

    #[inline]
    pub fn old_velocity(&self, idx: usize) -> Vec3 {
        Vec3::new(self.u0[idx], self.v0[idx], self.w0[idx])
    }

    #[inline]
    pub fn set_velocity(&mut self, idx: usize, vel: Vec3) {
        self.u[idx] = vel.x;
        self.v[idx] = vel.y;
        self.w[idx] = vel.z;
    }

    #[inline]
    pub fn is_boundary(&self, c: [usize; 3], layers: usize) -> bool {
        self.geometry.is_boundary(c, layers)
    }

    #[inline]
    pub fn neighbor(&self, c: [usize; 3], axis: usize, step: isize) -> Option<usize> {
        self.geometry.neighbor(c, axis, step)
    }

    /// Central-difference velocity gradient at a cell, column `a` holding
    /// `dv/dx_a`. Velocity outside the grid is zero.
    pub fn velocity_gradient(&self, c: [usize; 3]) -> Mat3 {
        let inv = 0.5 / self.geometry.dx;
        let diff = |axis: usize| {
            let hi = self.neighbor(c, axis, 1).map_or(Vec3::ZERO, |n| self.velocity(n));
            let lo = self.neighbor(c, axis, -1).map_or(Vec3::ZERO, |n| self.velocity(n));
            (hi - lo) * inv
        };
        Mat3::from_cols(diff(0), diff(1), diff(2))
    }

    /// Central-difference gradient of the mass field.
    pub fn mass_gradient(&self, c: [usize; 3]) -> Vec3 {
        let inv = 0.5 / self.geometry.dx;
        let diff = |axis: usize| {
            let hi = self.neighbor(c, axis, 1).map_or(0.0, |n| self.mass[n]);
            let lo = self.neighbor(c, axis, -1).map_or(0.0, |n| self.mass[n]);
            (hi - lo) * inv
        };
        Vec3::new(diff(0), diff(1), diff(2))
    }

    /// Zero every field; `pressure` survives when `keep_pressure`.
    pub fn clear(&mut self, keep_pressure: bool) {
        for field in [
            &mut self.u,
            &mut self.v,
            &mut self.w,
            &mut self.u0,
            &mut self.v0,
            &mut self.w0,
            &mut self.mass,
            &mut self.divergence,
        ] {
            field.fill(0.0);
        }
        if !keep_pressure {
            self.pressure.fill(0.0);
        }
        self.flags.fill(CELL_AIR);
        self.vorticity.fill(Vec3::ZERO);
    }

    pub fn total_mass(&self) -> f32 {
        self.mass.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridBuffers {
        GridBuffers::new(&GridOptions {
            resolution: [4, 5, 6],
            dx: 0.5,
            origin: [0.0, 0.0, 0.0],
        })
    }

    #[test]
    fn test_index_coords_round_trip() {
        let g = grid();
        for idx in [0, 7, 19, 119] {
            assert_eq!(g.index(g.coords(idx)), idx);
        }
        assert_eq!(g.index([1, 2, 3]), 1 + 4 * (2 + 5 * 3));
    }

    #[test]
    fn test_cell_of_clamps_outside_points() {
        let g = grid();
        assert_eq!(g.cell_of(Vec3::new(0.75, 0.25, 1.2)), [1, 0, 2]);
        assert_eq!(g.cell_of(Vec3::new(-3.0, 100.0, 2.9)), [0, 4, 5]);
        assert_eq!(g.cell_of(Vec3::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_clear_keeps_pressure_on_request() {
        let mut g = grid();
        g.pressure[3] = 2.0;
        g.mass[3] = 1.0;
        g.clear(true);
        assert_eq!(g.pressure[3], 2.0);
        assert_eq!(g.mass[3], 0.0);
        g.clear(false);
        assert_eq!(g.pressure[3], 0.0);
    }

    #[test]
    fn test_velocity_gradient_of_linear_field() {
        let mut g = grid();
        for idx in 0..g.cell_count() {
            let x = g.cell_center(g.coords(idx)).x;
            g.set_velocity(idx, Vec3::new(0.0, 2.0 * x, 0.0));
        }
        let grad = g.velocity_gradient([1, 2, 3]);
        assert!((grad.x_axis.y - 2.0).abs() < 1e-5);
        assert!(grad.y_axis.length() < 1e-5);
    }
}
