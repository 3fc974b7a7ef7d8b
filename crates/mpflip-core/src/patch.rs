//! Partial option patches and the deep merge.
//!
//! Every field is an `Option`; `None` keeps the target's value. Nested blocks
//! merge recursively, while arrays (vectors like `gravity`, and the whole
//! `colliders` list) are replaced as a unit.

use serde::{Deserialize, Serialize};

use crate::config::{
    ColorMode, Compliance, EmitOptions, EmitShape, FlipOptions, ForceOptions, GridOptions,
    Mode, MpmModel, MpmOptions, RenderOptions, SimulationOptions, TimeOptions, XpbdOptions,
};
use crate::contact::Collider;

#[inline]
fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridPatch {
    pub resolution: Option<[u32; 3]>,
    pub dx: Option<f32>,
    pub origin: Option<[f32; 3]>,
}

impl GridPatch {
    fn apply_to(&self, t: &mut GridOptions) {
        set(&mut t.resolution, &self.resolution);
        set(&mut t.dx, &self.dx);
        set(&mut t.origin, &self.origin);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimePatch {
    pub substeps: Option<u32>,
    pub cfl_limit: Option<f32>,
    pub dt_max: Option<f32>,
}

impl TimePatch {
    fn apply_to(&self, t: &mut TimeOptions) {
        set(&mut t.substeps, &self.substeps);
        set(&mut t.cfl_limit, &self.cfl_limit);
        set(&mut t.dt_max, &self.dt_max);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForcePatch {
    pub gravity: Option<[f32; 3]>,
    pub wind: Option<[f32; 3]>,
}

impl ForcePatch {
    fn apply_to(&self, t: &mut ForceOptions) {
        set(&mut t.gravity, &self.gravity);
        set(&mut t.wind, &self.wind);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlipPatch {
    pub pic_flip: Option<f32>,
    pub apic: Option<bool>,
    pub pressure_iters: Option<u32>,
    pub pressure_tolerance: Option<f32>,
    pub relaxation: Option<f32>,
    pub warm_start: Option<bool>,
    pub vorticity: Option<f32>,
    pub viscosity: Option<f32>,
    pub surface_tension: Option<f32>,
    pub cohesion: Option<f32>,
}

impl FlipPatch {
    fn apply_to(&self, t: &mut FlipOptions) {
        set(&mut t.pic_flip, &self.pic_flip);
        set(&mut t.apic, &self.apic);
        set(&mut t.pressure_iters, &self.pressure_iters);
        set(&mut t.pressure_tolerance, &self.pressure_tolerance);
        set(&mut t.relaxation, &self.relaxation);
        set(&mut t.warm_start, &self.warm_start);
        set(&mut t.vorticity, &self.vorticity);
        set(&mut t.viscosity, &self.viscosity);
        set(&mut t.surface_tension, &self.surface_tension);
        set(&mut t.cohesion, &self.cohesion);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MpmPatch {
    pub model: Option<MpmModel>,
    pub youngs_modulus: Option<f32>,
    pub poisson_ratio: Option<f32>,
    pub yield_stress: Option<f32>,
    pub hardening: Option<f32>,
    pub friction_angle: Option<f32>,
    pub cohesion: Option<f32>,
    pub viscosity: Option<f32>,
    pub density: Option<f32>,
    pub apic_blend: Option<f32>,
    pub grid_speed_limit: Option<f32>,
}

impl MpmPatch {
    fn apply_to(&self, t: &mut MpmOptions) {
        set(&mut t.model, &self.model);
        set(&mut t.youngs_modulus, &self.youngs_modulus);
        set(&mut t.poisson_ratio, &self.poisson_ratio);
        set(&mut t.yield_stress, &self.yield_stress);
        set(&mut t.hardening, &self.hardening);
        set(&mut t.friction_angle, &self.friction_angle);
        set(&mut t.cohesion, &self.cohesion);
        set(&mut t.viscosity, &self.viscosity);
        set(&mut t.density, &self.density);
        set(&mut t.apic_blend, &self.apic_blend);
        set(&mut t.grid_speed_limit, &self.grid_speed_limit);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompliancePatch {
    pub plane: Option<f32>,
    pub sphere: Option<f32>,
    #[serde(rename = "box")]
    pub aabb: Option<f32>,
}

impl CompliancePatch {
    fn apply_to(&self, t: &mut Compliance) {
        set(&mut t.plane, &self.plane);
        set(&mut t.sphere, &self.sphere);
        set(&mut t.aabb, &self.aabb);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XpbdPatch {
    pub iters: Option<u32>,
    pub compliance: Option<CompliancePatch>,
}

impl XpbdPatch {
    fn apply_to(&self, t: &mut XpbdOptions) {
        set(&mut t.iters, &self.iters);
        if let Some(c) = &self.compliance {
            c.apply_to(&mut t.compliance);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmitPatch {
    pub enabled: Option<bool>,
    pub rate: Option<f32>,
    pub shape: Option<EmitShape>,
    pub center: Option<[f32; 3]>,
    pub radius: Option<f32>,
    pub size: Option<[f32; 3]>,
    pub direction: Option<[f32; 3]>,
    pub speed: Option<f32>,
    pub speed_jitter: Option<f32>,
    pub life: Option<[f32; 2]>,
    pub seed: Option<u64>,
}

impl EmitPatch {
    fn apply_to(&self, t: &mut EmitOptions) {
        set(&mut t.enabled, &self.enabled);
        set(&mut t.rate, &self.rate);
        set(&mut t.shape, &self.shape);
        set(&mut t.center, &self.center);
        set(&mut t.radius, &self.radius);
        set(&mut t.size, &self.size);
        set(&mut t.direction, &self.direction);
        set(&mut t.speed, &self.speed);
        set(&mut t.speed_jitter, &self.speed_jitter);
        set(&mut t.life, &self.life);
        set(&mut t.seed, &self.seed);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderPatch {
    pub point_size: Option<f32>,
    pub color_mode: Option<ColorMode>,
    pub color: Option<[f32; 3]>,
}

impl RenderPatch {
    fn apply_to(&self, t: &mut RenderOptions) {
        set(&mut t.point_size, &self.point_size);
        set(&mut t.color_mode, &self.color_mode);
        set(&mut t.color, &self.color);
    }
}

/// Partial [`SimulationOptions`]. Deserializes from any subset of the
/// camelCase option tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptionsPatch {
    pub mode: Option<Mode>,
    pub max_particles: Option<u32>,
    pub grid: Option<GridPatch>,
    pub time: Option<TimePatch>,
    pub forces: Option<ForcePatch>,
    pub flip: Option<FlipPatch>,
    pub mpm: Option<MpmPatch>,
    pub xpbd: Option<XpbdPatch>,
    pub emit: Option<EmitPatch>,
    pub render: Option<RenderPatch>,
    pub colliders: Option<Vec<Collider>>,
}

impl OptionsPatch {
    /// Write every set field into `target`.
    pub fn apply_to(&self, target: &mut SimulationOptions) {
        set(&mut target.mode, &self.mode);
        set(&mut target.max_particles, &self.max_particles);
        if let Some(p) = &self.grid {
            p.apply_to(&mut target.grid);
        }
        if let Some(p) = &self.time {
            p.apply_to(&mut target.time);
        }
        if let Some(p) = &self.forces {
            p.apply_to(&mut target.forces);
        }
        if let Some(p) = &self.flip {
            p.apply_to(&mut target.flip);
        }
        if let Some(p) = &self.mpm {
            p.apply_to(&mut target.mpm);
        }
        if let Some(p) = &self.xpbd {
            p.apply_to(&mut target.xpbd);
        }
        if let Some(p) = &self.emit {
            p.apply_to(&mut target.emit);
        }
        if let Some(p) = &self.render {
            p.apply_to(&mut target.render);
        }
        set(&mut target.colliders, &self.colliders);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Deep-merge `patch` over `target`, producing a new snapshot.
pub fn merge(target: &SimulationOptions, patch: &OptionsPatch) -> SimulationOptions {
    let mut out = target.clone();
    patch.apply_to(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_default;

    #[test]
    fn test_empty_patch_is_identity() {
        let base = create_default();
        assert!(OptionsPatch::default().is_empty());
        assert_eq!(merge(&base, &OptionsPatch::default()), base);
    }

    #[test]
    fn test_nested_merge_keeps_siblings() {
        let base = create_default();
        let patch = OptionsPatch {
            flip: Some(FlipPatch {
                viscosity: Some(0.5),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(&base, &patch);
        assert_eq!(merged.flip.viscosity, 0.5);
        assert_eq!(merged.flip.pressure_iters, base.flip.pressure_iters);
        assert_eq!(merged.mpm, base.mpm);
    }

    #[test]
    fn test_colliders_replaced_wholesale() {
        let base = create_default();
        let patch = OptionsPatch {
            colliders: Some(Vec::new()),
            ..Default::default()
        };
        assert!(merge(&base, &patch).colliders.is_empty());
        assert_eq!(base.colliders.len(), 1);
    }
}
