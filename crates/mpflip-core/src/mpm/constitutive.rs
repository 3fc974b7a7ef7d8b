//! Constitutive models: Kirchhoff stress from the deformation gradient and
//! the plastic return mappings.

use glam::{Mat3, Vec3, Vec4};

use crate::config::{MpmModel, MpmOptions};
use crate::math::{mat3_is_finite, polar_rotation, svd3};

/// Lower bound on singular values before taking logarithms.
const MIN_STRETCH: f32 = 1.0e-4;

/// Drucker-Prager cone coefficient for a friction angle in degrees.
pub fn drucker_prager_alpha(friction_angle_deg: f32) -> f32 {
    let s = friction_angle_deg.clamp(0.0, 89.9).to_radians().sin();
    (2.0f32 / 3.0).sqrt() * 2.0 * s / (3.0 - s)
}

#[inline]
fn ln_stretch(sigma: Vec3) -> Vec3 {
    Vec3::new(
        sigma.x.max(MIN_STRETCH).ln(),
        sigma.y.max(MIN_STRETCH).ln(),
        sigma.z.max(MIN_STRETCH).ln(),
    )
}

#[inline]
fn exp3(eps: Vec3) -> Vec3 {
    Vec3::new(eps.x.exp(), eps.y.exp(), eps.z.exp())
}

/// Result of a plastic projection on the Hencky strain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub strain: Vec3,
    /// Plastic strain increment added to the hardening state.
    pub delta_q: f32,
}

/// Project Hencky strain `eps` onto the Drucker-Prager cone with
/// coefficient `alpha`, apex shifted by `cohesion`. Expansion past the apex
/// goes to the tip.
pub fn project_drucker_prager(eps: Vec3, alpha: f32, cohesion: f32, lambda: f32, mu: f32) -> Projection {
    let tr = eps.x + eps.y + eps.z;
    let dev = eps - Vec3::splat(tr / 3.0);
    let dev_norm = dev.length();
    let tip = Vec3::splat(cohesion / 3.0);

    if tr >= cohesion || dev_norm <= 1.0e-12 {
        if tr >= cohesion {
            return Projection {
                strain: tip,
                delta_q: (eps - tip).length(),
            };
        }
        return Projection {
            strain: eps,
            delta_q: 0.0,
        };
    }

    let delta_gamma = dev_norm + (3.0 * lambda + 2.0 * mu) / (2.0 * mu) * (tr - cohesion) * alpha;
    if delta_gamma <= 0.0 {
        return Projection {
            strain: eps,
            delta_q: 0.0,
        };
    }
    Projection {
        strain: eps - dev * (delta_gamma / dev_norm),
        delta_q: delta_gamma,
    }
}

/// Bingham relaxation of the deviatoric Hencky strain: above yield the
/// deviator shrinks by `dt * (2 mu |dev| - yield) / viscosity`, never past
/// the yield surface. The trace is untouched.
pub fn project_viscoplastic(eps: Vec3, mu: f32, yield_stress: f32, viscosity: f32, dt: f32) -> Projection {
    let tr = eps.x + eps.y + eps.z;
    let dev = eps - Vec3::splat(tr / 3.0);
    let dev_norm = dev.length();
    let stress = 2.0 * mu * dev_norm;
    if stress <= yield_stress || dev_norm <= 1.0e-12 {
        return Projection {
            strain: eps,
            delta_q: 0.0,
        };
    }
    let floor = yield_stress.max(0.0) / (2.0 * mu);
    let relaxed = if viscosity > 0.0 {
        (dev_norm - dt * (stress - yield_stress) / viscosity).max(floor)
    } else {
        floor
    };
    Projection {
        strain: Vec3::splat(tr / 3.0) + dev * (relaxed / dev_norm),
        delta_q: dev_norm - relaxed,
    }
}

/// Stress and plasticity parameters for the selected model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constitutive {
    pub model: MpmModel,
    pub lambda: f32,
    pub mu: f32,
    pub yield_stress: f32,
    pub hardening: f32,
    pub friction_angle: f32,
    pub cohesion: f32,
    pub viscosity: f32,
}

impl Constitutive {
    pub fn new(mpm: &MpmOptions) -> Self {
        let (lambda, mu) = mpm.lame();
        Self {
            model: mpm.model,
            lambda,
            mu,
            yield_stress: mpm.yield_stress,
            hardening: mpm.hardening,
            friction_angle: mpm.friction_angle,
            cohesion: mpm.cohesion,
            viscosity: mpm.viscosity,
        }
    }

    /// Material vector for a fresh particle.
    pub fn initial_material(&self) -> Vec4 {
        Vec4::new(drucker_prager_alpha(self.friction_angle), 1.0, 0.0, 1.0)
    }

    /// Kirchhoff stress `tau` for deformation gradient `f`. Degenerate input
    /// gives zero stress.
    pub fn kirchhoff_stress(&self, f: Mat3, material: Vec4) -> Mat3 {
        if !mat3_is_finite(&f) {
            return Mat3::ZERO;
        }
        let lambda = self.lambda * material.y;
        let mu = self.mu * material.y;
        let tau = match self.model {
            MpmModel::Elastic | MpmModel::Viscoplastic => {
                let j = f.determinant();
                let r = polar_rotation(f);
                (f - r) * f.transpose() * (2.0 * mu) + Mat3::from_diagonal(Vec3::splat(lambda * (j - 1.0) * j))
            }
            MpmModel::NeoHookean => {
                let j = f.determinant().max(MIN_STRETCH);
                (f * f.transpose() - Mat3::IDENTITY) * mu + Mat3::from_diagonal(Vec3::splat(lambda * j.ln()))
            }
            MpmModel::DruckerPrager => {
                let svd = svd3(f);
                let eps = ln_stretch(svd.sigma);
                let tr = eps.x + eps.y + eps.z;
                let principal = eps * (2.0 * mu) + Vec3::splat(lambda * tr);
                svd.u * Mat3::from_diagonal(principal) * svd.u.transpose()
            }
        };
        if mat3_is_finite(&tau) {
            tau
        } else {
            Mat3::ZERO
        }
    }

    /// Return-map `f` for plastic models, updating hardening state in
    /// `material`. Elastic models return `f` unchanged.
    pub fn project(&self, f: Mat3, material: &mut Vec4, dt: f32) -> Mat3 {
        if !mat3_is_finite(&f) {
            return Mat3::IDENTITY;
        }
        match self.model {
            MpmModel::Elastic | MpmModel::NeoHookean => f,
            MpmModel::DruckerPrager => {
                let svd = svd3(f);
                let eps = ln_stretch(svd.sigma);
                let angle = self.friction_angle + self.hardening * material.z;
                let alpha = drucker_prager_alpha(angle);
                let mu = self.mu * material.y;
                let lambda = self.lambda * material.y;
                let out = project_drucker_prager(eps, alpha, self.cohesion, lambda, mu);

                let tr_before = eps.x + eps.y + eps.z;
                let tr_after = out.strain.x + out.strain.y + out.strain.z;
                material.x = alpha;
                material.z += out.delta_q;
                material.w *= (tr_before - tr_after).exp();
                self.finish(svd.recompose(exp3(out.strain)))
            }
            MpmModel::Viscoplastic => {
                let svd = svd3(f);
                let eps = ln_stretch(svd.sigma);
                let mu = self.mu * material.y;
                let out = project_viscoplastic(eps, mu, self.yield_stress, self.viscosity, dt);
                material.z += out.delta_q;
                self.finish(svd.recompose(exp3(out.strain)))
            }
        }
    }

    #[inline]
    fn finish(&self, f: Mat3) -> Mat3 {
        if mat3_is_finite(&f) {
            f
        } else {
            Mat3::IDENTITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(model: MpmModel) -> Constitutive {
        Constitutive::new(&MpmOptions {
            model,
            ..Default::default()
        })
    }

    #[test]
    fn test_rest_state_is_stress_free() {
        for m in [
            MpmModel::Elastic,
            MpmModel::NeoHookean,
            MpmModel::DruckerPrager,
            MpmModel::Viscoplastic,
        ] {
            let c = model(m);
            let tau = c.kirchhoff_stress(Mat3::IDENTITY, c.initial_material());
            assert!(tau.abs_diff_eq(Mat3::ZERO, 1e-3), "{m:?}: {tau:?}");
        }
    }

    #[test]
    fn test_compression_gives_negative_pressure_stress() {
        let c = model(MpmModel::NeoHookean);
        let tau = c.kirchhoff_stress(Mat3::from_diagonal(Vec3::splat(0.9)), c.initial_material());
        assert!(tau.x_axis.x < 0.0);
    }

    #[test]
    fn test_expansion_maps_to_cone_tip() {
        let out = project_drucker_prager(Vec3::new(0.1, 0.05, 0.02), 0.5, 0.0, 1.0e4, 1.0e4);
        assert_eq!(out.strain, Vec3::ZERO);
        assert!(out.delta_q > 0.0);
    }

    #[test]
    fn test_compression_inside_cone_untouched() {
        let eps = Vec3::new(-0.1, -0.1, -0.1);
        let out = project_drucker_prager(eps, 0.5, 0.0, 1.0e4, 1.0e4);
        assert_eq!(out.strain, eps);
        assert_eq!(out.delta_q, 0.0);
    }

    #[test]
    fn test_shear_projected_onto_cone_surface() {
        let (lambda, mu, alpha) = (1.0e4, 1.0e4, 0.4);
        let eps = Vec3::new(0.2, -0.25, 0.0);
        let out = project_drucker_prager(eps, alpha, 0.0, lambda, mu);
        let tr = out.strain.x + out.strain.y + out.strain.z;
        let dev = (out.strain - Vec3::splat(tr / 3.0)).length();
        let yield_fn = dev + (3.0 * lambda + 2.0 * mu) / (2.0 * mu) * tr * alpha;
        assert!(yield_fn.abs() < 1e-4, "yield function {yield_fn}");
    }

    #[test]
    fn test_viscoplastic_preserves_volume_and_stays_above_yield() {
        let (mu, yield_stress) = (1000.0, 100.0);
        let eps = Vec3::new(0.3, -0.2, -0.1);
        let out = project_viscoplastic(eps, mu, yield_stress, 1.0e-3, 0.1);
        let tr_before = eps.x + eps.y + eps.z;
        let tr_after = out.strain.x + out.strain.y + out.strain.z;
        assert!((tr_before - tr_after).abs() < 1e-6);
        let dev = (out.strain - Vec3::splat(tr_after / 3.0)).length();
        assert!((2.0 * mu * dev - yield_stress).abs() < 1e-2);
    }

    #[test]
    fn test_singular_gradient_is_guarded() {
        let c = model(MpmModel::DruckerPrager);
        let mut material = c.initial_material();
        let f = c.project(Mat3::ZERO, &mut material, 0.01);
        assert!(mat3_is_finite(&f));
        let tau = c.kirchhoff_stress(Mat3::ZERO, material);
        assert!(mat3_is_finite(&tau));
        let nan = Mat3::from_diagonal(Vec3::new(f32::NAN, 1.0, 1.0));
        assert_eq!(c.project(nan, &mut material, 0.01), Mat3::IDENTITY);
    }
}
