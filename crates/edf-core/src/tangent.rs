//! Tangent-space pose updates.
//!
//! A step produces an angular increment `da ∈ so(3)` and a linear increment
//! `dx ∈ R³`, both expressed in the pose's local frame. The update strategy
//! maps them back onto SE(3).

use serde::{Deserialize, Serialize};

use crate::constants::{Q_FACTOR, Q_INDICES, SMALL_ANGLE_THRESHOLD};
use crate::error::Result;
use crate::pose::Pose;
use crate::quaternion::{Quaternion, cross, dot3};

/// How a tangent increment is applied to a pose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
    /// `q' = normalize(q + L(q)·da)`, `x' = x + q·dx`.
    /// First-order linearization of the exponential map.
    #[default]
    FirstOrder,
    /// Exact SE(3) exponential, right-composed onto the pose.
    Exponential,
}

/// Linear map `L(q): R³ → R⁴` from a body-frame rotation increment to a
/// quaternion increment, built from the constant gather/scale tables.
pub fn tangent_matrix(q: Quaternion) -> [[f64; 3]; 4] {
    let qa = q.to_array();
    let mut l = [[0.0; 3]; 4];
    for (i, row) in l.iter_mut().enumerate() {
        for (j, entry) in row.iter_mut().enumerate() {
            *entry = qa[Q_INDICES[i][j]] * Q_FACTOR[i][j];
        }
    }
    l
}

/// `dq = L(q)·da`.
pub fn quaternion_increment(q: Quaternion, da: [f64; 3]) -> Quaternion {
    let l = tangent_matrix(q);
    let row = |i: usize| dot3(l[i], da);
    Quaternion::new(row(0), row(1), row(2), row(3))
}

impl UpdateStrategy {
    /// Advance a single pose by a local-frame increment.
    pub fn apply(self, pose: &Pose, da: [f64; 3], dx: [f64; 3]) -> Result<Pose> {
        if da == [0.0; 3] && dx == [0.0; 3] {
            return Ok(*pose);
        }
        match self {
            UpdateStrategy::FirstOrder => first_order_update(pose, da, dx),
            UpdateStrategy::Exponential => exponential_update(pose, da, dx),
        }
    }
}

fn first_order_update(pose: &Pose, da: [f64; 3], dx: [f64; 3]) -> Result<Pose> {
    let q = pose.rotation;
    let dq = quaternion_increment(q, da);
    let q_next = Quaternion::new(q.w + dq.w, q.x + dq.x, q.y + dq.y, q.z + dq.z).try_normalize()?;
    Ok(Pose {
        rotation: q_next,
        translation: add3(pose.translation, q.rotate(dx)),
    })
}

fn exponential_update(pose: &Pose, da: [f64; 3], dx: [f64; 3]) -> Result<Pose> {
    let q = pose.rotation;
    let delta_rot = Quaternion::from_scaled_axis(da);
    let delta_trans = left_jacobian_apply(da, dx);
    Ok(Pose {
        rotation: (q * delta_rot).try_normalize()?,
        translation: add3(pose.translation, q.rotate(delta_trans)),
    })
}

/// `V(ω)·v` with `V = I + (1 - cos θ)/θ² [ω]× + (θ - sin θ)/θ³ [ω]×²`.
fn left_jacobian_apply(omega: [f64; 3], v: [f64; 3]) -> [f64; 3] {
    let theta_sq = dot3(omega, omega);
    let wv = cross(omega, v);
    if theta_sq <= SMALL_ANGLE_THRESHOLD {
        return add3(v, wv.map(|c| 0.5 * c));
    }
    let theta = theta_sq.sqrt();
    let a = (1.0 - theta.cos()) / theta_sq;
    let b = (theta - theta.sin()) / (theta_sq * theta);
    let wwv = cross(omega, wv);
    [
        v[0] + a * wv[0] + b * wwv[0],
        v[1] + a * wv[1] + b * wwv[1],
        v[2] + a * wv[2] + b * wwv[2],
    ]
}

pub(crate) fn add3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::error::EdfError;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn test_tangent_matrix_is_half_right_product() {
        let mut rng = rng();
        for _ in 0..20 {
            let q = Quaternion::random(&mut rng);
            let omega = [0.3, -0.8, 1.5];
            let dq = quaternion_increment(q, omega);
            let expected = q * Quaternion::new(0.0, omega[0] / 2.0, omega[1] / 2.0, omega[2] / 2.0);
            assert_abs_diff_eq!(dq.w, expected.w, epsilon = 1e-12);
            assert_abs_diff_eq!(dq.x, expected.x, epsilon = 1e-12);
            assert_abs_diff_eq!(dq.y, expected.y, epsilon = 1e-12);
            assert_abs_diff_eq!(dq.z, expected.z, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tangent_matrix_at_identity() {
        let l = tangent_matrix(Quaternion::identity());
        assert_eq!(l[0], [0.0, 0.0, 0.0]);
        assert_eq!(l[1], [0.5, 0.0, 0.0]);
        assert_eq!(l[2], [0.0, 0.5, 0.0]);
        assert_eq!(l[3], [0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_zero_increment_is_noop() {
        let mut rng = rng();
        let pose = Pose::new(Quaternion::random(&mut rng), [1.0, -2.0, 0.5]).unwrap();
        for strategy in [UpdateStrategy::FirstOrder, UpdateStrategy::Exponential] {
            let next = strategy.apply(&pose, [0.0; 3], [0.0; 3]).unwrap();
            assert_eq!(next.to_array(), pose.to_array());
        }
    }

    #[test]
    fn test_translation_is_rotated_into_world_frame() {
        let q = Quaternion::from_scaled_axis([0.0, 0.0, std::f64::consts::FRAC_PI_2]);
        let pose = Pose::new(q, [0.0; 3]).unwrap();
        let next = UpdateStrategy::FirstOrder
            .apply(&pose, [0.0; 3], [1.0, 0.0, 0.0])
            .unwrap();
        assert_abs_diff_eq!(next.translation[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(next.translation[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_strategies_agree_to_first_order() {
        let mut rng = rng();
        let pose = Pose::new(Quaternion::random(&mut rng), [0.0; 3]).unwrap();
        let da = [1e-4, -2e-4, 3e-4];
        let dx = [1e-3, 0.0, -1e-3];
        let a = UpdateStrategy::FirstOrder.apply(&pose, da, dx).unwrap();
        let b = UpdateStrategy::Exponential.apply(&pose, da, dx).unwrap();
        assert!(a.rotation.angular_distance(b.rotation) < 1e-7);
        for i in 0..3 {
            assert_abs_diff_eq!(a.translation[i], b.translation[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_exponential_is_exact_for_large_rotations() {
        let pose = Pose::identity();
        let next = UpdateStrategy::Exponential
            .apply(&pose, [0.0, 0.0, std::f64::consts::PI], [0.0; 3])
            .unwrap();
        let angle = pose.rotation.angular_distance(next.rotation);
        assert_abs_diff_eq!(angle, std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn test_exponential_screw_motion() {
        // Half turn about z while moving along x traces a half circle:
        // V·[π, 0, 0] = [0, 2, 0] for ω = [0, 0, π].
        let pose = Pose::identity();
        let next = UpdateStrategy::Exponential
            .apply(&pose, [0.0, 0.0, std::f64::consts::PI], [std::f64::consts::PI, 0.0, 0.0])
            .unwrap();
        assert_abs_diff_eq!(next.translation[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(next.translation[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_finite_increment_is_degenerate() {
        let err = UpdateStrategy::FirstOrder
            .apply(&Pose::identity(), [f64::NAN, 0.0, 0.0], [0.0; 3])
            .unwrap_err();
        assert!(matches!(err, EdfError::DegenerateQuaternion { .. }));
    }

    #[test]
    fn test_strategy_serde_names() {
        let s = serde_json::to_string(&UpdateStrategy::Exponential).unwrap();
        assert_eq!(s, "\"exponential\"");
        let parsed: UpdateStrategy = serde_json::from_str("\"first-order\"").unwrap();
        assert_eq!(parsed, UpdateStrategy::FirstOrder);
    }
}
