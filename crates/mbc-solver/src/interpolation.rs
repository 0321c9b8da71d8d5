//! Deformation-dependent interpolation matrices of the mixed beam theory.
//!
//! All functions take the natural coordinate ξ ∈ [0, 1] and the basic
//! deformation `v = [elongation, θz_I, θz_J, θy_I, θy_J, twist]`.
//!
//! * `nd1` interpolates section forces from the basic forces. With
//!   second-order effects the moments pick up `N·w(ξ)` where `w` is the
//!   Hermite transverse displacement implied by the end rotations.
//! * `nd2` is the derivative of `nd1·q` with respect to `v` at fixed `q`.
//! * `nld_hat` is the derivative of the target section deformation `d̂(v)`
//!   with respect to `v`. Bending rows follow the interdependent
//!   shear-bending interpolation governed by the softening factor Ω
//!   (Ω = 0 recovers Euler-Bernoulli); the axial row carries the bowing
//!   term ½(w'²) when second-order effects are on.

use nalgebra::{Matrix2x6, Matrix4x6, Vector2, Vector4, Vector6};

/// Hermite transverse displacement per unit length for unit end rotations.
pub fn transverse_shape(xi: f64) -> [f64; 2] {
    [xi - 2.0 * xi * xi + xi.powi(3), xi.powi(3) - xi * xi]
}

/// Slope of the Hermite transverse displacement for unit end rotations.
///
/// These are the shape-derivative coefficients that also map end rotations
/// to interface slip.
pub fn slope_coefficients(xi: f64) -> [f64; 2] {
    [1.0 - 4.0 * xi + 3.0 * xi * xi, 3.0 * xi * xi - 2.0 * xi]
}

/// Curvature per unit rotation times `L`, for the interdependent
/// shear-bending interpolation with softening factor `omega`.
pub fn curvature_coefficients(xi: f64, omega: f64) -> [f64; 2] {
    let c = (6.0 * xi - 3.0) / (1.0 + omega);
    [c - 1.0, c + 1.0]
}

/// Constant shear strain per unit end rotation.
pub fn shear_coefficient(omega: f64) -> f64 {
    -omega / (2.0 * (1.0 + omega))
}

/// Stress-resultant-weighted strain products accumulated over the points of
/// one bending plane.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OmegaProducts {
    /// Σ w·M·κ
    pub moment_curvature: f64,
    /// Σ w·κ²
    pub curvature_squared: f64,
    /// Σ w·V·γ
    pub shear_strain: f64,
    /// Σ w·γ²
    pub strain_squared: f64,
}

impl OmegaProducts {
    pub fn add(&mut self, weight: f64, moment: f64, curvature: f64, shear: f64, strain: f64) {
        self.moment_curvature += weight * moment * curvature;
        self.curvature_squared += weight * curvature * curvature;
        self.shear_strain += weight * shear * strain;
        self.strain_squared += weight * strain * strain;
    }
}

/// Softening factor Ω = 12·EI/(GA·L²) from secant rigidities
/// `EI = ΣwMκ / Σwκ²` and `GA = ΣwVγ / Σwγ²`.
///
/// Returns `(Ω, zeroed)`. Ω is zero (and `zeroed` true) when either ratio
/// has a factor at or below `zero_tolerance`, or when a secant rigidity is
/// negative.
pub fn softening_factor(products: &OmegaProducts, length: f64, zero_tolerance: f64) -> (f64, bool) {
    let factors = [
        products.moment_curvature,
        products.curvature_squared,
        products.shear_strain,
        products.strain_squared,
    ];
    if factors.iter().any(|f| f.abs() <= zero_tolerance) {
        return (0.0, true);
    }
    let ei = products.moment_curvature / products.curvature_squared;
    let ga = products.shear_strain / products.strain_squared;
    let omega = 12.0 * ei / (ga * length * length);
    if omega.is_finite() && omega > 0.0 {
        (omega, false)
    } else {
        (0.0, true)
    }
}

/// Interpolation of one element of length `length`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub length: f64,
    pub second_order: bool,
}

impl Interpolation {
    pub fn new(length: f64, second_order: bool) -> Self {
        Self {
            length,
            second_order,
        }
    }

    /// Transverse displacements `(w_y, w_z)` of the two bending planes.
    pub fn transverse_displacements(&self, xi: f64, v: &Vector6<f64>) -> (f64, f64) {
        let [h1, h2] = transverse_shape(xi);
        let l = self.length;
        (l * (h1 * v[1] + h2 * v[2]), l * (h1 * v[3] + h2 * v[4]))
    }

    /// Slopes `(w_y', w_z')` of the two bending planes.
    pub fn slopes(&self, xi: f64, v: &Vector6<f64>) -> (f64, f64) {
        let [a1, a2] = slope_coefficients(xi);
        (a1 * v[1] + a2 * v[2], a1 * v[3] + a2 * v[4])
    }

    /// Force interpolation matrix `Nd1` (4x6).
    pub fn nd1(&self, xi: f64, v: &Vector6<f64>) -> Matrix4x6<f64> {
        let mut n = Matrix4x6::zeros();
        n[(0, 0)] = 1.0;
        n[(1, 1)] = xi - 1.0;
        n[(1, 2)] = xi;
        n[(2, 3)] = xi - 1.0;
        n[(2, 4)] = xi;
        n[(3, 5)] = 1.0;
        if self.second_order {
            let (wy, wz) = self.transverse_displacements(xi, v);
            n[(1, 0)] = wy;
            n[(2, 0)] = wz;
        }
        n
    }

    /// `∂(Nd1·q)/∂v` at fixed basic forces; only the axial force enters.
    pub fn nd2(&self, xi: f64, axial: f64) -> Matrix4x6<f64> {
        let mut n = Matrix4x6::zeros();
        if self.second_order {
            let [h1, h2] = transverse_shape(xi);
            let nl = axial * self.length;
            n[(1, 1)] = nl * h1;
            n[(1, 2)] = nl * h2;
            n[(2, 3)] = nl * h1;
            n[(2, 4)] = nl * h2;
        }
        n
    }

    /// Kinematic interpolation `∂d̂/∂v` (4x6).
    pub fn nld_hat(&self, xi: f64, v: &Vector6<f64>, omega_z: f64, omega_y: f64) -> Matrix4x6<f64> {
        let l = self.length;
        let [cz1, cz2] = curvature_coefficients(xi, omega_z);
        let [cy1, cy2] = curvature_coefficients(xi, omega_y);

        let mut g = Matrix4x6::zeros();
        g[(0, 0)] = 1.0 / l;
        g[(1, 1)] = cz1 / l;
        g[(1, 2)] = cz2 / l;
        g[(2, 3)] = cy1 / l;
        g[(2, 4)] = cy2 / l;
        g[(3, 5)] = 1.0 / l;
        if self.second_order {
            let [a1, a2] = slope_coefficients(xi);
            let (sy, sz) = self.slopes(xi, v);
            g[(0, 1)] = sy * a1;
            g[(0, 2)] = sy * a2;
            g[(0, 3)] = sz * a1;
            g[(0, 4)] = sz * a2;
        }
        g
    }

    /// Target section deformation `d̂(v)`.
    pub fn target_deformation(&self, xi: f64, v: &Vector6<f64>, omega_z: f64, omega_y: f64) -> Vector4<f64> {
        let l = self.length;
        let [cz1, cz2] = curvature_coefficients(xi, omega_z);
        let [cy1, cy2] = curvature_coefficients(xi, omega_y);
        let mut axial = v[0] / l;
        if self.second_order {
            let (sy, sz) = self.slopes(xi, v);
            axial += 0.5 * (sy * sy + sz * sz);
        }
        Vector4::new(
            axial,
            (cz1 * v[1] + cz2 * v[2]) / l,
            (cy1 * v[3] + cy2 * v[4]) / l,
            v[5] / l,
        )
    }

    /// Shear strain interpolation `[γy, γz] = S·v` (2x6).
    pub fn shear_interpolation(&self, omega_z: f64, omega_y: f64) -> Matrix2x6<f64> {
        let gz = shear_coefficient(omega_z);
        let gy = shear_coefficient(omega_y);
        let mut s = Matrix2x6::zeros();
        s[(0, 1)] = gz;
        s[(0, 2)] = gz;
        s[(1, 3)] = gy;
        s[(1, 4)] = gy;
        s
    }

    pub fn shear_strains(&self, v: &Vector6<f64>, omega_z: f64, omega_y: f64) -> Vector2<f64> {
        self.shear_interpolation(omega_z, omega_y) * v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{IntegrationRule, IntegrationScheme};

    #[test]
    fn euler_bernoulli_curvature_limits() {
        assert_eq!(curvature_coefficients(0.0, 0.0), [-4.0, -2.0]);
        assert_eq!(curvature_coefficients(1.0, 0.0), [2.0, 4.0]);
        assert_eq!(shear_coefficient(0.0), 0.0);
    }

    #[test]
    fn compatibility_matrix_is_identity_for_linear_geometry() {
        // G = L Σ w Nd1ᵀ·Nld_hat
        let l = 7.0;
        let interp = Interpolation::new(l, false);
        let scheme = IntegrationScheme::new(IntegrationRule::GaussLobatto, 3, l).unwrap();
        let v = Vector6::zeros();
        let mut g = nalgebra::Matrix6::zeros();
        for p in scheme.points() {
            g += l * p.weight * interp.nd1(p.xi, &v).transpose() * interp.nld_hat(p.xi, &v, 0.0, 0.0);
        }
        assert!((g - nalgebra::Matrix6::identity()).amax() < 1e-13);
    }

    #[test]
    fn bowing_and_p_delta_terms_cancel_in_compatibility() {
        let l = 5.0;
        let interp = Interpolation::new(l, true);
        let scheme = IntegrationScheme::new(IntegrationRule::GaussLobatto, 6, l).unwrap();
        let v = Vector6::new(0.01, 0.02, -0.03, 0.01, 0.015, 0.0);
        let mut g = nalgebra::Matrix6::zeros();
        for p in scheme.points() {
            g += l * p.weight * interp.nd1(p.xi, &v).transpose() * interp.nld_hat(p.xi, &v, 0.0, 0.0);
        }
        assert!((g - nalgebra::Matrix6::identity()).amax() < 1e-12);
    }

    #[test]
    fn nld_hat_is_derivative_of_target() {
        let interp = Interpolation::new(3.0, true);
        let v = Vector6::new(0.01, 0.05, -0.02, 0.03, 0.01, 0.004);
        let xi = 0.3;
        let g = interp.nld_hat(xi, &v, 0.2, 0.1);
        let h = 1e-7;
        for j in 0..6 {
            let mut vp = v;
            vp[j] += h;
            let fd = (interp.target_deformation(xi, &vp, 0.2, 0.1) - interp.target_deformation(xi, &v, 0.2, 0.1)) / h;
            for i in 0..4 {
                assert!((fd[i] - g[(i, j)]).abs() < 1e-6, "({i},{j})");
            }
        }
    }

    #[test]
    fn nd2_is_derivative_of_force_interpolation() {
        let interp = Interpolation::new(4.0, true);
        let v = Vector6::new(0.0, 0.02, 0.01, -0.01, 0.03, 0.0);
        let q = Vector6::new(-50.0, 3.0, -2.0, 1.0, 4.0, 0.5);
        let xi = 0.6;
        let nd2 = interp.nd2(xi, q[0]);
        let h = 1e-7;
        for j in 0..6 {
            let mut vp = v;
            vp[j] += h;
            let fd = (interp.nd1(xi, &vp) * q - interp.nd1(xi, &v) * q) / h;
            for i in 0..4 {
                assert!((fd[i] - nd2[(i, j)]).abs() < 1e-5, "({i},{j})");
            }
        }
    }

    #[test]
    fn omega_is_zero_when_a_product_vanishes() {
        let products = OmegaProducts {
            moment_curvature: 0.0,
            curvature_squared: 1e-6,
            shear_strain: 1.0,
            strain_squared: 1e-6,
        };
        assert_eq!(softening_factor(&products, 2.0, 1e-30), (0.0, true));

        let mut products = OmegaProducts::default();
        products.add(1.0, 100.0, 1e-3, 0.0, 0.0);
        assert_eq!(softening_factor(&products, 2.0, 1e-30), (0.0, true));
    }

    #[test]
    fn omega_from_elastic_products() {
        let (ei, ga, l) = (2.0e4, 5.0e5, 3.0);
        let mut products = OmegaProducts::default();
        for (w, kappa, gamma) in [(0.3, 1e-3, 2e-4), (0.7, -4e-4, 2e-4)] {
            products.add(w, ei * kappa, kappa, ga * gamma, gamma);
        }
        let (omega, zeroed) = softening_factor(&products, l, 1e-30);
        assert!(!zeroed);
        assert!((omega - 12.0 * ei / (ga * l * l)).abs() < 1e-12);
    }
}
