//! Named material presets, expressed as option patches over the defaults.

use crate::config::{EmitShape, Mode, MpmModel, SimulationOptions};
use crate::error::UnknownPresetError;
use crate::patch::{merge, EmitPatch, FlipPatch, MpmPatch, OptionsPatch, RenderPatch, TimePatch};

/// Named partial configuration, applied by deep merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Splashy low-viscosity water.
    WaterFlip,
    /// Cohesive liquid sheet from a thin box emitter.
    SheetFlip,
    /// Elastic jelly cubes.
    JellyMpm,
    /// Granular Drucker-Prager sand.
    SandMpm,
    /// Viscoplastic slime.
    SlimeMpm,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::WaterFlip,
        Preset::SheetFlip,
        Preset::JellyMpm,
        Preset::SandMpm,
        Preset::SlimeMpm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::WaterFlip => "water_flip",
            Preset::SheetFlip => "sheet_flip",
            Preset::JellyMpm => "jelly_mpm",
            Preset::SandMpm => "sand_mpm",
            Preset::SlimeMpm => "slime_mpm",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, UnknownPresetError> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| UnknownPresetError(name.to_owned()))
    }

    pub fn patch(self) -> OptionsPatch {
        match self {
            Preset::WaterFlip => OptionsPatch {
                mode: Some(Mode::Flip),
                flip: Some(FlipPatch {
                    pic_flip: Some(0.97),
                    apic: Some(false),
                    pressure_iters: Some(16),
                    viscosity: Some(0.02),
                    vorticity: Some(0.15),
                    surface_tension: Some(0.0),
                    cohesion: Some(0.0),
                    ..Default::default()
                }),
                emit: Some(EmitPatch {
                    shape: Some(EmitShape::Sphere),
                    rate: Some(4000.0),
                    speed: Some(1.5),
                    direction: Some([0.3, -1.0, 0.0]),
                    ..Default::default()
                }),
                render: Some(RenderPatch {
                    color: Some([0.25, 0.55, 1.0]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Preset::SheetFlip => OptionsPatch {
                mode: Some(Mode::Flip),
                flip: Some(FlipPatch {
                    pic_flip: Some(0.9),
                    apic: Some(true),
                    viscosity: Some(0.1),
                    surface_tension: Some(0.5),
                    cohesion: Some(0.8),
                    ..Default::default()
                }),
                emit: Some(EmitPatch {
                    shape: Some(EmitShape::Box),
                    size: Some([1.2, 0.05, 0.3]),
                    direction: Some([1.0, 0.0, 0.0]),
                    speed: Some(2.0),
                    rate: Some(6000.0),
                    ..Default::default()
                }),
                render: Some(RenderPatch {
                    color: Some([0.55, 0.85, 0.95]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Preset::JellyMpm => OptionsPatch {
                mode: Some(Mode::Mpm),
                time: Some(TimePatch {
                    substeps: Some(4),
                    ..Default::default()
                }),
                mpm: Some(MpmPatch {
                    model: Some(MpmModel::Elastic),
                    youngs_modulus: Some(4.0e4),
                    poisson_ratio: Some(0.3),
                    density: Some(1000.0),
                    apic_blend: Some(1.0),
                    ..Default::default()
                }),
                emit: Some(EmitPatch {
                    shape: Some(EmitShape::Box),
                    size: Some([0.4, 0.4, 0.4]),
                    rate: Some(3000.0),
                    speed: Some(0.5),
                    speed_jitter: Some(0.0),
                    ..Default::default()
                }),
                render: Some(RenderPatch {
                    color: Some([0.95, 0.35, 0.55]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Preset::SandMpm => OptionsPatch {
                mode: Some(Mode::Mpm),
                time: Some(TimePatch {
                    substeps: Some(6),
                    ..Default::default()
                }),
                mpm: Some(MpmPatch {
                    model: Some(MpmModel::DruckerPrager),
                    youngs_modulus: Some(2.0e5),
                    poisson_ratio: Some(0.3),
                    friction_angle: Some(35.0),
                    hardening: Some(5.0),
                    cohesion: Some(0.0),
                    density: Some(1600.0),
                    ..Default::default()
                }),
                emit: Some(EmitPatch {
                    shape: Some(EmitShape::Sphere),
                    rate: Some(5000.0),
                    speed: Some(0.5),
                    ..Default::default()
                }),
                render: Some(RenderPatch {
                    color: Some([0.86, 0.72, 0.45]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Preset::SlimeMpm => OptionsPatch {
                mode: Some(Mode::Mpm),
                time: Some(TimePatch {
                    substeps: Some(4),
                    ..Default::default()
                }),
                mpm: Some(MpmPatch {
                    model: Some(MpmModel::Viscoplastic),
                    youngs_modulus: Some(2.0e4),
                    poisson_ratio: Some(0.35),
                    yield_stress: Some(150.0),
                    viscosity: Some(8.0),
                    density: Some(1100.0),
                    ..Default::default()
                }),
                emit: Some(EmitPatch {
                    shape: Some(EmitShape::Sphere),
                    rate: Some(3000.0),
                    speed: Some(0.8),
                    ..Default::default()
                }),
                render: Some(RenderPatch {
                    color: Some([0.45, 0.9, 0.35]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }
}

/// Names of every registered preset.
pub fn preset_names() -> impl Iterator<Item = &'static str> {
    Preset::ALL.into_iter().map(Preset::name)
}

/// Merge the named preset over `opts`.
pub fn apply_preset(
    opts: &SimulationOptions,
    name: &str,
) -> Result<SimulationOptions, UnknownPresetError> {
    let preset = Preset::from_name(name)?;
    Ok(merge(opts, &preset.patch()))
}
