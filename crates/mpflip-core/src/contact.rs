//! Analytic colliders and their XPBD contact projection.

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::XpbdOptions;
use crate::particle::ParticleBuffers;

/// Analytic collider geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColliderShape {
    /// Half-space `dot(x, normal) + offset >= 0`.
    Plane { normal: [f32; 3], offset: f32 },
    Sphere { center: [f32; 3], radius: f32 },
    Box {
        center: [f32; 3],
        #[serde(rename = "halfExtents")]
        half_extents: [f32; 3],
    },
}

/// A static collider with its contact response coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collider {
    #[serde(flatten)]
    pub shape: ColliderShape,
    #[serde(default)]
    pub friction: f32,
    #[serde(default)]
    pub restitution: f32,
    #[serde(default)]
    pub thickness: f32,
}

impl Collider {
    fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            friction: 0.0,
            restitution: 0.0,
            thickness: 0.0,
        }
    }

    pub fn plane(normal: Vec3, offset: f32) -> Self {
        Self::new(ColliderShape::Plane {
            normal: normal.to_array(),
            offset,
        })
    }

    /// Floor plane at `y = height` with the default ground response.
    pub fn ground(height: f32) -> Self {
        Self::plane(Vec3::Y, -height)
            .with_friction(0.2)
            .with_restitution(0.1)
            .with_thickness(0.01)
    }

    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self::new(ColliderShape::Sphere {
            center: center.to_array(),
            radius,
        })
    }

    pub fn aabb(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(ColliderShape::Box {
            center: center.to_array(),
            half_extents: half_extents.to_array(),
        })
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_thickness(mut self, thickness: f32) -> Self {
        self.thickness = thickness;
        self
    }
}

#[derive(Clone, Copy, Debug)]
enum Geometry {
    Plane { normal: Vec3, offset: f32 },
    Sphere { center: Vec3, radius: f32 },
    Box { center: Vec3, half: Vec3 },
}

/// Collider in solver form: glam geometry, unit plane normal, compliance
/// resolved from its kind.
#[derive(Clone, Copy, Debug)]
struct SolverCollider {
    geometry: Geometry,
    friction: f32,
    restitution: f32,
    thickness: f32,
    compliance: f32,
}

impl SolverCollider {
    /// Penetration depth and outward contact normal at `x`. Positive depth
    /// means the particle is inside the collider's thickened surface.
    #[inline]
    fn penetration(&self, x: Vec3) -> (f32, Vec3) {
        match self.geometry {
            Geometry::Plane { normal, offset } => {
                (-(x.dot(normal) + offset - self.thickness), normal)
            }
            Geometry::Sphere { center, radius } => {
                let d = x - center;
                let dist = d.length();
                let normal = if dist > 1e-8 { d / dist } else { Vec3::Y };
                (radius + self.thickness - dist, normal)
            }
            Geometry::Box { center, half } => {
                let q = x - center;
                let clamped = q.clamp(-half, half);
                let outside = q - clamped;
                let dist = outside.length();
                if dist > 0.0 {
                    (self.thickness - dist, outside / dist)
                } else {
                    // Inside: exit through the nearest face.
                    let gap = half - q.abs();
                    let axis = if gap.x <= gap.y && gap.x <= gap.z {
                        0
                    } else if gap.y <= gap.z {
                        1
                    } else {
                        2
                    };
                    let mut normal = Vec3::ZERO;
                    normal[axis] = if q[axis] >= 0.0 { 1.0 } else { -1.0 };
                    (self.thickness + gap[axis], normal)
                }
            }
        }
    }

    /// Project one particle. Returns whether it was in contact.
    #[inline]
    fn project(&self, x: &mut Vec3, v: &mut Vec3, inv_dt2: f32) -> bool {
        let (depth, normal) = self.penetration(*x);
        if !(depth > 0.0) {
            return false;
        }
        *x += normal * (depth / (1.0 + self.compliance * inv_dt2));

        let vn = v.dot(normal);
        let vt = *v - normal * vn;
        *v = normal * vn + vt * (1.0 - self.friction);
        if vn < 0.0 {
            *v -= normal * ((1.0 + self.restitution) * vn);
        }
        true
    }
}

/// XPBD contact projection against a fixed collider list.
///
/// Colliders are processed in list order; later colliders see the
/// corrections made by earlier ones.
#[derive(Clone, Debug)]
pub struct ContactResolver {
    colliders: Vec<SolverCollider>,
    iters: u32,
}

impl ContactResolver {
    pub fn new(colliders: &[Collider], xpbd: &XpbdOptions) -> Self {
        let colliders = colliders
            .iter()
            .map(|c| {
                let (geometry, compliance) = match c.shape {
                    ColliderShape::Plane { normal, offset } => (
                        Geometry::Plane {
                            normal: Vec3::from_array(normal).normalize_or(Vec3::Y),
                            offset,
                        },
                        xpbd.compliance.plane,
                    ),
                    ColliderShape::Sphere { center, radius } => (
                        Geometry::Sphere {
                            center: Vec3::from_array(center),
                            radius,
                        },
                        xpbd.compliance.sphere,
                    ),
                    ColliderShape::Box {
                        center,
                        half_extents,
                    } => (
                        Geometry::Box {
                            center: Vec3::from_array(center),
                            half: Vec3::from_array(half_extents).abs(),
                        },
                        xpbd.compliance.aabb,
                    ),
                };
                SolverCollider {
                    geometry,
                    friction: c.friction,
                    restitution: c.restitution,
                    thickness: c.thickness,
                    compliance: compliance.max(0.0),
                }
            })
            .collect();
        Self {
            colliders,
            iters: xpbd.iters,
        }
    }

    /// One projection pass over all live particles. Returns the number of
    /// particle-collider contacts resolved.
    pub fn resolve(&self, particles: &mut ParticleBuffers, dt: f32) -> usize {
        if self.colliders.is_empty() || dt <= 0.0 {
            return 0;
        }
        let inv_dt2 = 1.0 / (dt * dt);
        let n = particles.alive();
        let colliders = &self.colliders;
        let project_one = |x: &mut Vec3, v: &mut Vec3| {
            let mut contacts = 0usize;
            for c in colliders {
                if c.project(x, v, inv_dt2) {
                    contacts += 1;
                }
            }
            contacts
        };

        #[cfg(feature = "parallel")]
        {
            particles.position[..n]
                .par_iter_mut()
                .zip(particles.velocity[..n].par_iter_mut())
                .map(|(x, v)| project_one(x, v))
                .sum()
        }

        #[cfg(not(feature = "parallel"))]
        {
            particles.position[..n]
                .iter_mut()
                .zip(particles.velocity[..n].iter_mut())
                .map(|(x, v)| project_one(x, v))
                .sum()
        }
    }

    /// Repeat [`resolve`](Self::resolve) `xpbd.iters` times.
    pub fn resolve_iterations(&self, particles: &mut ParticleBuffers, dt: f32) -> usize {
        (0..self.iters).map(|_| self.resolve(particles, dt)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Compliance;

    fn xpbd(plane_compliance: f32) -> XpbdOptions {
        XpbdOptions {
            iters: 1,
            compliance: Compliance {
                plane: plane_compliance,
                ..Default::default()
            },
        }
    }

    fn one_particle(x: Vec3, v: Vec3) -> ParticleBuffers {
        let mut p = ParticleBuffers::new(1);
        p.spawn(&crate::particle::ParticleInit {
            position: x,
            velocity: v,
            mass: 1.0,
            life: 1.0,
            material: crate::particle::DEFAULT_MATERIAL,
        });
        p
    }

    #[test]
    fn test_plane_pushes_out_and_reflects() {
        let plane = Collider::plane(Vec3::Y, 0.0).with_restitution(0.5);
        let resolver = ContactResolver::new(&[plane], &xpbd(0.0));
        let mut p = one_particle(Vec3::new(0.0, -0.2, 0.0), Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(resolver.resolve(&mut p, 0.01), 1);
        assert!(p.position[0].y >= -1e-6);
        assert!((p.velocity[0].y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_compliance_softens_push() {
        let plane = Collider::plane(Vec3::Y, 0.0);
        let resolver = ContactResolver::new(&[plane], &xpbd(1e-4));
        let mut p = one_particle(Vec3::new(0.0, -0.1, 0.0), Vec3::ZERO);
        resolver.resolve(&mut p, 0.01);
        // alpha / dt^2 = 1, so half the penetration is removed.
        assert!((p.position[0].y + 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_friction_damps_tangential_velocity() {
        let plane = Collider::plane(Vec3::Y, 0.0).with_friction(0.5);
        let resolver = ContactResolver::new(&[plane], &xpbd(0.0));
        let mut p = one_particle(Vec3::new(0.0, -0.01, 0.0), Vec3::new(2.0, 0.0, 0.0));
        resolver.resolve(&mut p, 0.01);
        assert!((p.velocity[0].x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_box_inside_exits_nearest_face() {
        let aabb = Collider::aabb(Vec3::ZERO, Vec3::splat(1.0));
        let resolver = ContactResolver::new(&[aabb], &xpbd(0.0));
        let mut p = one_particle(Vec3::new(0.1, 0.9, 0.0), Vec3::ZERO);
        resolver.resolve(&mut p, 0.01);
        assert!((p.position[0].y - 1.0).abs() < 1e-5);
        assert!((p.position[0].x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_surface_with_thickness() {
        let sphere = Collider::sphere(Vec3::ZERO, 0.5).with_thickness(0.1);
        let resolver = ContactResolver::new(&[sphere], &xpbd(0.0));
        let mut p = one_particle(Vec3::new(0.0, 0.0, 0.3), Vec3::ZERO);
        resolver.resolve(&mut p, 0.01);
        assert!((p.position[0].length() - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_collider_json_shape() {
        let json = r#"{"kind":"box","center":[0,1,0],"halfExtents":[1,2,3],"friction":0.3,"restitution":0.0,"thickness":0.0}"#;
        let c: Collider = serde_json::from_str(json).unwrap();
        assert_eq!(
            c.shape,
            ColliderShape::Box {
                center: [0.0, 1.0, 0.0],
                half_extents: [1.0, 2.0, 3.0]
            }
        );
        assert_eq!(c.friction, 0.3);
    }
}
