use std::ops::Mul;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{EPSILON, SMALL_ANGLE_THRESHOLD};
use crate::error::{EdfError, Result};

/// Quaternion stored real part first, `[w, x, y, z]`.
///
/// Rotations are carried as unit quaternions. `new` does not normalize, so
/// intermediate sums (`q + dq`) can be formed and then passed through
/// [`Quaternion::try_normalize`], which is where degeneracy is detected.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PartialEq for Quaternion {
    fn eq(&self, other: &Self) -> bool {
        (self.w - other.w).abs() < EPSILON
            && (self.x - other.x).abs() < EPSILON
            && (self.y - other.y).abs() < EPSILON
            && (self.z - other.z).abs() < EPSILON
    }
}

impl Quaternion {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Identity quaternion (1, 0, 0, 0).
    pub const fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Normalize to unit length.
    ///
    /// Fails with `DegenerateQuaternion` when the norm is zero (below
    /// `EPSILON`) or not finite.
    pub fn try_normalize(self) -> Result<Self> {
        let norm = self.norm();
        if !norm.is_finite() || norm < EPSILON {
            return Err(EdfError::DegenerateQuaternion { norm });
        }
        Ok(Self {
            w: self.w / norm,
            x: self.x / norm,
            y: self.y / norm,
            z: self.z / norm,
        })
    }

    /// 4D dot product.
    pub fn dot(self, other: Self) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn conjugate(self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Geodesic rotation angle between two unit quaternions. Range: [0, π].
    /// Uses abs(dot) to handle antipodal equivalence.
    pub fn angular_distance(self, other: Self) -> f64 {
        let d = self.dot(other).abs().clamp(-1.0, 1.0);
        2.0 * d.acos()
    }

    /// Rotate a vector: `q v q*` for a unit quaternion.
    pub fn rotate(self, v: [f64; 3]) -> [f64; 3] {
        // t = 2 (u × v); v' = v + w t + u × t
        let u = [self.x, self.y, self.z];
        let t = cross(u, v).map(|c| 2.0 * c);
        let ut = cross(u, t);
        [
            v[0] + self.w * t[0] + ut[0],
            v[1] + self.w * t[1] + ut[1],
            v[2] + self.w * t[2] + ut[2],
        ]
    }

    /// Exponential map from a rotation vector (axis × angle) to a unit quaternion.
    pub fn from_scaled_axis(omega: [f64; 3]) -> Self {
        let theta_sq = dot3(omega, omega);
        if theta_sq < SMALL_ANGLE_THRESHOLD {
            let q = Self {
                w: 1.0,
                x: omega[0] / 2.0,
                y: omega[1] / 2.0,
                z: omega[2] / 2.0,
            };
            let n = q.norm();
            return Self {
                w: q.w / n,
                x: q.x / n,
                y: q.y / n,
                z: q.z / n,
            };
        }
        let theta = theta_sq.sqrt();
        let s = (theta / 2.0).sin() / theta;
        Self {
            w: (theta / 2.0).cos(),
            x: omega[0] * s,
            y: omega[1] * s,
            z: omega[2] * s,
        }
    }

    /// Logarithm map of a unit quaternion to a rotation vector.
    /// Picks the hemisphere with `w >= 0`, so the angle lies in [0, π].
    pub fn to_scaled_axis(self) -> [f64; 3] {
        let q = if self.w < 0.0 { -self } else { self };
        let v = [q.x, q.y, q.z];
        let sin_half = dot3(v, v).sqrt();
        if sin_half * sin_half < SMALL_ANGLE_THRESHOLD {
            return v.map(|c| 2.0 * c);
        }
        let theta = 2.0 * sin_half.atan2(q.w);
        v.map(|c| c * theta / sin_half)
    }

    /// Uniform random quaternion on S³ using Shoemake's method.
    pub fn random(rng: &mut impl Rng) -> Self {
        let s1: f64 = rng.random();
        let t1 = std::f64::consts::TAU * rng.random::<f64>();
        let t2 = std::f64::consts::TAU * rng.random::<f64>();

        let r1 = (1.0 - s1).sqrt();
        let r2 = s1.sqrt();

        Self {
            w: r1 * t1.sin(),
            x: r1 * t1.cos(),
            y: r2 * t2.sin(),
            z: r2 * t2.cos(),
        }
    }

    /// Convert to [w, x, y, z] array for serialization.
    pub fn to_array(self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }

    /// Create from [w, x, y, z] array, without normalizing.
    pub fn from_array(arr: [f64; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }
}

impl std::ops::Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            w: -self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

/// Hamilton product (quaternion multiplication).
impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }
}

pub(crate) fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
