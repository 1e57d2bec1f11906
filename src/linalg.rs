//! 2×2 linear algebra for covariance-like matrices.
//!
//! Everything here is closed form. Nothing guards against singular input: [`Mat2::inverse`] of a
//! matrix with zero determinant yields `inf`/`NaN` entries, and callers are expected to keep
//! covariances positive-definite by construction (e.g. by adding a small diagonal term).

use std::ops::{Add, Mul};

/// Below this magnitude the off-diagonal entry is treated as zero when resolving eigenvectors.
const OFF_DIAGONAL_EPS: f64 = 1e-12;

/// A row-major 2×2 matrix `[[xx, xy], [yx, yy]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mat2 {
    pub xx: f64,
    pub xy: f64,
    pub yx: f64,
    pub yy: f64,
}

impl Mat2 {
    pub const ZERO: Mat2 = Mat2::diagonal(0.0, 0.0);
    pub const IDENTITY: Mat2 = Mat2::diagonal(1.0, 1.0);

    pub const fn new(xx: f64, xy: f64, yx: f64, yy: f64) -> Self {
        Self { xx, xy, yx, yy }
    }

    /// Symmetric matrix `[[xx, xy], [xy, yy]]`.
    pub const fn symmetric(xx: f64, xy: f64, yy: f64) -> Self {
        Self::new(xx, xy, xy, yy)
    }

    pub const fn diagonal(xx: f64, yy: f64) -> Self {
        Self::new(xx, 0.0, 0.0, yy)
    }

    pub fn scale(self, s: f64) -> Self {
        Self::new(self.xx * s, self.xy * s, self.yx * s, self.yy * s)
    }

    pub fn add_diagonal(self, d: f64) -> Self {
        Self::new(self.xx + d, self.xy, self.yx, self.yy + d)
    }

    pub fn det(&self) -> f64 {
        self.xx * self.yy - self.xy * self.yx
    }

    pub fn trace(&self) -> f64 {
        self.xx + self.yy
    }

    /// Inverse via the adjugate. No singularity check.
    pub fn inverse(&self) -> Self {
        let inv_det = 1.0 / self.det();
        Self::new(
            self.yy * inv_det,
            -self.xy * inv_det,
            -self.yx * inv_det,
            self.xx * inv_det,
        )
    }

    pub fn mul_vec(&self, v: [f64; 2]) -> [f64; 2] {
        [
            self.xx * v[0] + self.xy * v[1],
            self.yx * v[0] + self.yy * v[1],
        ]
    }

    /// `vᵀ M v`.
    pub fn quad_form(&self, v: [f64; 2]) -> f64 {
        let mv = self.mul_vec(v);
        v[0] * mv[0] + v[1] * mv[1]
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        (self.xy - self.yx).abs() <= tol
    }
}

impl Mul for Mat2 {
    type Output = Mat2;

    fn mul(self, rhs: Mat2) -> Mat2 {
        Mat2::new(
            self.xx * rhs.xx + self.xy * rhs.yx,
            self.xx * rhs.xy + self.xy * rhs.yy,
            self.yx * rhs.xx + self.yy * rhs.yx,
            self.yx * rhs.xy + self.yy * rhs.yy,
        )
    }
}

impl Add for Mat2 {
    type Output = Mat2;

    fn add(self, rhs: Mat2) -> Mat2 {
        Mat2::new(
            self.xx + rhs.xx,
            self.xy + rhs.xy,
            self.yx + rhs.yx,
            self.yy + rhs.yy,
        )
    }
}

/// Principal axes of a 2-D covariance ellipse.
///
/// Each axis is stored as a vector whose direction is the eigenvector and whose length is
/// `sqrt(eigenvalue)`, so that `Σ = major·majorᵀ + minor·minorᵀ`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EllipseAxes {
    pub major: [f64; 2],
    pub minor: [f64; 2],
}

impl EllipseAxes {
    pub fn major_len(&self) -> f64 {
        self.major[0].hypot(self.major[1])
    }

    pub fn minor_len(&self) -> f64 {
        self.minor[0].hypot(self.minor[1])
    }

    /// Map a standard-normal pair `(g0, g1)` to an offset with covariance `Σ`.
    pub fn transform(&self, g0: f64, g1: f64) -> [f64; 2] {
        [
            self.major[0] * g0 + self.minor[0] * g1,
            self.major[1] * g0 + self.minor[1] * g1,
        ]
    }
}

/// Closed-form eigendecomposition of a symmetric 2×2 covariance.
///
/// Eigenvalues are `tr/2 ± sqrt(((xx - yy)/2)² + xy·yx)`, the trace/determinant quadratic with the
/// discriminant clamped at zero.
/// When the off-diagonal entry is (numerically) zero the eigenvectors are taken axis-aligned,
/// which also covers the isotropic case.
pub fn covariance_to_axes(cov: &Mat2) -> EllipseAxes {
    let half_tr = 0.5 * cov.trace();
    // half_tr² - det, expanded so large near-isotropic matrices do not cancel.
    let half_diff = 0.5 * (cov.xx - cov.yy);
    let disc = (half_diff * half_diff + cov.xy * cov.yx).max(0.0).sqrt();
    let l_major = half_tr + disc;
    let l_minor = half_tr - disc;

    let b = cov.xy;
    let dir = if b.abs() > OFF_DIAGONAL_EPS * (cov.xx.abs() + cov.yy.abs()).max(1.0) {
        let v = [l_major - cov.yy, b];
        let n = v[0].hypot(v[1]);
        [v[0] / n, v[1] / n]
    } else if cov.xx >= cov.yy {
        [1.0, 0.0]
    } else {
        [0.0, 1.0]
    };

    let a_major = l_major.max(0.0).sqrt();
    let a_minor = l_minor.max(0.0).sqrt();
    EllipseAxes {
        major: [dir[0] * a_major, dir[1] * a_major],
        minor: [-dir[1] * a_minor, dir[0] * a_minor],
    }
}

/// Inverse of [`covariance_to_axes`]: `Σ = major·majorᵀ + minor·minorᵀ`.
pub fn axes_to_covariance(axes: &EllipseAxes) -> Mat2 {
    let [ax, ay] = axes.major;
    let [bx, by] = axes.minor;
    Mat2::symmetric(ax * ax + bx * bx, ax * ay + bx * by, ay * ay + by * by)
}
