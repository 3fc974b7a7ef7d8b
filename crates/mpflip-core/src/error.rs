//! Error types for configuration, presets and device resources.

use thiserror::Error;

/// Invalid simulation options, reported by `config::validate`.
///
/// Each variant carries the offending value. Options are never partially
/// applied when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("maxParticles must be positive")]
    MaxParticles,
    #[error("grid resolution must be positive on every axis, got {0:?}")]
    GridResolution([u32; 3]),
    #[error("grid cell size dx must be positive, got {0}")]
    CellSize(f32),
    #[error("substeps must be at least 1")]
    Substeps,
    #[error("dtMax must be positive, got {0}")]
    DtMax(f32),
    #[error("time.cflLimit must be positive and finite, got {0}")]
    CflLimit(f32),
    #[error("flip.pressureIters must be at least 1")]
    PressureIters,
    #[error("flip.picFlip must lie in [0, 1], got {0}")]
    PicFlip(f32),
    #[error("mpm.youngsModulus must be positive, got {0}")]
    YoungsModulus(f32),
    #[error("mpm.poissonRatio must lie in [0, 0.5), got {0}")]
    PoissonRatio(f32),
    #[error("mpm.gridSpeedLimit must be positive, got {0}")]
    GridSpeedLimit(f32),
    #[error("collider {index}: {field} must lie in [0, 1], got {value}")]
    ColliderCoefficient {
        index: usize,
        field: &'static str,
        value: f32,
    },
    #[error("collider {index}: thickness must be non-negative, got {value}")]
    ColliderThickness { index: usize, value: f32 },
    #[error("emit.rate must be finite and non-negative, got {0}")]
    EmitRate(f32),
    #[error("emit.life must be a positive range [min, max], got {0:?}")]
    EmitLife([f32; 2]),
}

/// Preset name not present in the preset table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown preset `{0}`")]
pub struct UnknownPresetError(pub String);

/// The compute device could not provide the requested resources.
///
/// Fatal to the construction or reallocation attempt that raised it; a
/// previously allocated bundle stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("device `{0}` cannot execute parallel dispatches")]
    NoDispatchSupport(String),
    #[error("buffer `{label}` needs {bytes} bytes, device limit is {limit}")]
    BufferTooLarge {
        label: &'static str,
        bytes: u64,
        limit: u64,
    },
    #[error("bundle needs {requested} bytes, only {available} of the device budget remain")]
    OutOfBudget { requested: u64, available: u64 },
    #[error("host allocation of buffer `{0}` failed")]
    AllocationFailed(&'static str),
}

/// Any error surfaced by the simulation facade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    UnknownPreset(#[from] UnknownPresetError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}
