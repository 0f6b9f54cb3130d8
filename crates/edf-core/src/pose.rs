//! SE(3) poses and pose batches.
//!
//! A pose packs as `[qw, qx, qy, qz, x, y, z]`. A batch is a plain
//! `Vec<Pose>`; poses in a batch never interact.

use serde::{Deserialize, Serialize};

use crate::constants::UNIT_NORM_TOLERANCE;
use crate::error::{EdfError, Result};
use crate::quaternion::Quaternion;

/// Number of scalars in a packed pose record.
pub const POSE_DIM: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Quaternion,
    pub translation: [f64; 3],
}

impl Pose {
    pub const fn identity() -> Self {
        Self {
            rotation: Quaternion::identity(),
            translation: [0.0; 3],
        }
    }

    /// Build a pose, normalizing the rotation.
    pub fn new(rotation: Quaternion, translation: [f64; 3]) -> Result<Self> {
        Ok(Self {
            rotation: rotation.try_normalize()?,
            translation,
        })
    }

    pub fn from_array(arr: [f64; POSE_DIM]) -> Result<Self> {
        Self::new(
            Quaternion::from_array([arr[0], arr[1], arr[2], arr[3]]),
            [arr[4], arr[5], arr[6]],
        )
    }

    pub fn to_array(&self) -> [f64; POSE_DIM] {
        let [w, x, y, z] = self.rotation.to_array();
        let t = self.translation;
        [w, x, y, z, t[0], t[1], t[2]]
    }

    /// Narrow to the single-precision record handed to score models.
    /// Rounds to nearest; values beyond `f32::MAX` become infinite.
    pub fn to_f32_array(&self) -> [f32; POSE_DIM] {
        self.to_array().map(|v| v as f32)
    }

    pub fn is_unit(&self) -> bool {
        (self.rotation.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Parse a flat `[qw, qx, qy, qz, x, y, z, qw, ...]` buffer into poses.
pub fn poses_from_flat(data: &[f64]) -> Result<Vec<Pose>> {
    if data.len() % POSE_DIM != 0 {
        return Err(EdfError::ShapeMismatch(format!(
            "pose buffer length {} is not a multiple of {POSE_DIM}",
            data.len()
        )));
    }
    data.chunks_exact(POSE_DIM)
        .map(|chunk| {
            let mut arr = [0.0; POSE_DIM];
            arr.copy_from_slice(chunk);
            Pose::from_array(arr)
        })
        .collect()
}

/// Parse a flat buffer of 3-vectors (scores, displacements).
pub fn vec3s_from_flat(data: &[f64]) -> Result<Vec<[f64; 3]>> {
    if data.len() % 3 != 0 {
        return Err(EdfError::ShapeMismatch(format!(
            "vector buffer length {} is not a multiple of 3",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

/// Pack a batch into the single-precision layout used at the model boundary.
pub fn to_f32_records(poses: &[Pose]) -> Vec<[f32; POSE_DIM]> {
    poses.iter().map(Pose::to_f32_array).collect()
}
