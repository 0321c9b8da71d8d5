//! Integration schemes along the element axis.
//!
//! Points are expressed in the natural coordinate ξ ∈ [0, 1] measured from
//! end I, with weights normalised so that Σ wᵢ = 1. Section integrals along
//! the element are therefore `L · Σ wᵢ f(ξᵢ)`.
//!
//! ```
//! use mbc_solver::integration::{IntegrationRule, IntegrationScheme};
//!
//! let scheme = IntegrationScheme::new(IntegrationRule::GaussLobatto, 5, 100.0).unwrap();
//! let total: f64 = scheme.points().iter().map(|p| p.weight).sum();
//! assert!((total - 1.0).abs() < 1e-14);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on integration points per element.
pub const MAX_INTEGRATION_POINTS: usize = 10;

const NEWTON_TOLERANCE: f64 = 1e-14;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Quadrature family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationRule {
    /// Includes both element ends; exact for degree 2N-3.
    #[default]
    GaussLobatto,
    /// Interior points only; exact for degree 2N-1.
    GaussLegendre,
}

/// A single integration point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint {
    /// Natural coordinate ξ ∈ [0, 1]
    pub xi: f64,
    /// Normalised weight
    pub weight: f64,
}

/// Immutable set of integration points for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationScheme {
    rule: IntegrationRule,
    length: f64,
    points: Vec<IntegrationPoint>,
}

impl IntegrationScheme {
    /// Build an `n`-point scheme for an element of the given length.
    pub fn new(rule: IntegrationRule, n: usize, length: f64) -> Result<Self> {
        if !(length.is_finite() && length > 0.0) {
            return Err(Error::Geometry(format!(
                "integration scheme needs a positive length, got {length}"
            )));
        }
        let min = match rule {
            IntegrationRule::GaussLobatto => 2,
            IntegrationRule::GaussLegendre => 1,
        };
        if n < min || n > MAX_INTEGRATION_POINTS {
            return Err(Error::Config(format!(
                "{rule:?} supports {min}..={MAX_INTEGRATION_POINTS} points, got {n}"
            )));
        }

        let pairs = match rule {
            IntegrationRule::GaussLegendre => gauss_legendre(n)?,
            IntegrationRule::GaussLobatto => gauss_lobatto(n)?,
        };

        let mut points: Vec<IntegrationPoint> = pairs
            .into_iter()
            .map(|(x, w)| IntegrationPoint {
                xi: (0.5 * (1.0 + x)).clamp(0.0, 1.0),
                weight: 0.5 * w,
            })
            .collect();
        points.sort_by(|a, b| a.xi.total_cmp(&b.xi));

        Ok(Self {
            rule,
            length,
            points,
        })
    }

    pub fn rule(&self) -> IntegrationRule {
        self.rule
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[IntegrationPoint] {
        &self.points
    }

    /// Physical position of each point measured from end I.
    pub fn positions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.xi * self.length).collect()
    }
}

/// Legendre polynomials P_n(x) and P_{n-1}(x) by the three-term recurrence.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * p - (kf - 1.0) * p_prev) / kf;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

/// Gauss-Legendre nodes and weights on [-1, 1].
fn gauss_legendre(n: usize) -> Result<Vec<(f64, f64)>> {
    let nf = n as f64;
    let mut out = Vec::with_capacity(n);
    for i in 1..=n {
        let mut x = (std::f64::consts::PI * (i as f64 - 0.25) / (nf + 0.5)).cos();
        let mut converged = false;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, p_prev) = legendre(n, x);
            let dp = nf * (x * p - p_prev) / (x * x - 1.0);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < NEWTON_TOLERANCE {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(Error::Config(format!("Gauss-Legendre node {i} of {n} did not converge")));
        }
        let (p, p_prev) = legendre(n, x);
        let dp = nf * (x * p - p_prev) / (x * x - 1.0);
        out.push((x, 2.0 / ((1.0 - x * x) * dp * dp)));
    }
    Ok(out)
}

/// Gauss-Lobatto nodes and weights on [-1, 1].
fn gauss_lobatto(n: usize) -> Result<Vec<(f64, f64)>> {
    let order = n - 1;
    let nf = n as f64;
    let of = order as f64;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut x = (std::f64::consts::PI * i as f64 / of).cos();
        if i > 0 && i < order {
            let mut converged = false;
            for _ in 0..NEWTON_MAX_ITERATIONS {
                let (p, p_prev) = legendre(order, x);
                let dx = (x * p - p_prev) / (nf * p);
                x -= dx;
                if dx.abs() < NEWTON_TOLERANCE {
                    converged = true;
                    break;
                }
            }
            if !converged {
                return Err(Error::Config(format!("Gauss-Lobatto node {i} of {n} did not converge")));
            }
        }
        let (p, _) = legendre(order, x);
        out.push((x, 2.0 / (of * nf * p * p)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate(scheme: &IntegrationScheme, f: impl Fn(f64) -> f64) -> f64 {
        scheme.points().iter().map(|p| p.weight * f(p.xi)).sum()
    }

    #[test]
    fn weights_sum_to_one_and_points_in_range() {
        for rule in [IntegrationRule::GaussLobatto, IntegrationRule::GaussLegendre] {
            let min = if rule == IntegrationRule::GaussLobatto { 2 } else { 1 };
            for n in min..=MAX_INTEGRATION_POINTS {
                let scheme = IntegrationScheme::new(rule, n, 3.0).unwrap();
                assert_eq!(scheme.num_points(), n);
                let total: f64 = scheme.points().iter().map(|p| p.weight).sum();
                assert!((total - 1.0).abs() < 1e-13, "{rule:?} n={n} sum={total}");
                for p in scheme.points() {
                    assert!((0.0..=1.0).contains(&p.xi));
                    assert!(p.weight > 0.0);
                }
            }
        }
    }

    #[test]
    fn lobatto_includes_ends() {
        let scheme = IntegrationScheme::new(IntegrationRule::GaussLobatto, 4, 1.0).unwrap();
        let pts = scheme.points();
        assert!(pts[0].xi.abs() < 1e-15);
        assert!((pts[3].xi - 1.0).abs() < 1e-15);
        // classic 4-point weights on [-1,1]: 1/6, 5/6
        assert!((pts[0].weight - 1.0 / 12.0).abs() < 1e-14);
        assert!((pts[1].weight - 5.0 / 12.0).abs() < 1e-14);
    }

    #[test]
    fn legendre_two_points_match_closed_form() {
        let scheme = IntegrationScheme::new(IntegrationRule::GaussLegendre, 2, 1.0).unwrap();
        let p = 0.5 * (1.0 - 1.0 / 3.0_f64.sqrt());
        assert!((scheme.points()[0].xi - p).abs() < 1e-14);
        assert!((scheme.points()[0].weight - 0.5).abs() < 1e-14);
    }

    #[test]
    fn polynomial_exactness() {
        // ∫0^1 ξ^k dξ = 1/(k+1)
        let lobatto = IntegrationScheme::new(IntegrationRule::GaussLobatto, 5, 1.0).unwrap();
        for k in 0..=7 {
            let value = integrate(&lobatto, |x| x.powi(k));
            assert!((value - 1.0 / (k as f64 + 1.0)).abs() < 1e-13, "k={k}");
        }
        let legendre = IntegrationScheme::new(IntegrationRule::GaussLegendre, 3, 1.0).unwrap();
        for k in 0..=5 {
            let value = integrate(&legendre, |x| x.powi(k));
            assert!((value - 1.0 / (k as f64 + 1.0)).abs() < 1e-13, "k={k}");
        }
    }

    #[test]
    fn rejects_invalid_requests() {
        assert!(IntegrationScheme::new(IntegrationRule::GaussLobatto, 1, 1.0).is_err());
        assert!(IntegrationScheme::new(IntegrationRule::GaussLegendre, 11, 1.0).is_err());
        assert!(matches!(
            IntegrationScheme::new(IntegrationRule::GaussLegendre, 3, 0.0),
            Err(Error::Geometry(_))
        ));
    }
}
