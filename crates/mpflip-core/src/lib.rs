//! Hybrid FLIP/APIC and MLS-MPM particle simulation core.
//!
//! A [`ParticleSimulation`] owns one buffer bundle on a [`ComputeDevice`]
//! and advances it through a fixed list of data-described passes per
//! substep, followed by XPBD contact projection against analytic colliders
//! and lifetime compaction.

pub mod buffers;
pub mod compute;
pub mod config;
pub mod contact;
pub mod emitter;
pub mod error;
pub mod flip;
pub mod graph;
pub mod grid;
pub mod math;
pub mod mpm;
pub mod particle;
pub mod passes;
pub mod patch;
pub mod presets;
pub mod render;
pub mod simulation;
pub mod stats;

pub use compute::{ComputeDevice, DeviceLimits, HostDevice};
pub use config::{create_default, validate, Mode, MpmModel, SimulationOptions};
pub use contact::{Collider, ColliderShape, ContactResolver};
pub use error::{ConfigError, ResourceError, SimError, UnknownPresetError};
pub use patch::{merge, OptionsPatch};
pub use presets::{apply_preset, Preset};
pub use render::{pack_points, PointVertex};
pub use simulation::{ParticleSimulation, PointCloudHandle, SceneContainer};
pub use stats::{SimStats, StepStats};
