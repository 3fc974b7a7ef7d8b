//! Point-cloud vertex packing for the host renderer.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::config::{ColorMode, RenderOptions};
use crate::math::mix;
use crate::particle::ParticleBuffers;

/// Speed mapped to the hot end of the velocity ramp.
const VELOCITY_RAMP_SPEED: f32 = 4.0;

/// One rendered point: 32 bytes, matches the WGSL `PointVertex`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3], // 12 bytes
    pub size: f32,          //  4 bytes
    pub color: [f32; 4],    // 16 bytes
}

fn point_color(render: &RenderOptions, velocity: Vec3, life: f32, max_life: f32) -> [f32; 4] {
    let base = Vec3::from(render.color);
    match render.color_mode {
        ColorMode::Uniform => base.extend(1.0).to_array(),
        ColorMode::Velocity => {
            let t = (velocity.length() / VELOCITY_RAMP_SPEED).min(1.0);
            base.lerp(Vec3::ONE, t).extend(1.0).to_array()
        }
        ColorMode::Life => {
            let t = if max_life > 0.0 { (life / max_life).clamp(0.0, 1.0) } else { 1.0 };
            base.extend(mix(0.15, 1.0, t)).to_array()
        }
    }
}

/// Write one vertex per live particle into `out`, which is resized to the
/// particle capacity so the host can keep a stable buffer. Free slots get
/// zero-sized points.
pub fn pack_points(
    particles: &ParticleBuffers,
    render: &RenderOptions,
    max_life: f32,
    out: &mut Vec<PointVertex>,
) {
    out.resize(particles.capacity(), PointVertex::zeroed());
    let alive = particles.alive();
    for (p, vertex) in out.iter_mut().enumerate() {
        *vertex = if p < alive {
            PointVertex {
                position: particles.position[p].to_array(),
                size: render.point_size,
                color: point_color(render, particles.velocity[p], particles.life[p], max_life),
            }
        } else {
            PointVertex::zeroed()
        };
    }
}
