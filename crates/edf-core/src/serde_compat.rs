//! JSON wire format for trajectories.
//!
//! Field names are camelCase. Poses are `[qw, qx, qy, qz, x, y, z]` arrays in
//! the same flat step-major order the sampler produces.

use serde::{Deserialize, Serialize};

use crate::error::{EdfError, Result};
use crate::integrator::Trajectory;
use crate::pose::{POSE_DIM, Pose};

pub const CURRENT_VERSION: &str = "1";

#[derive(Serialize, Deserialize, Debug)]
pub struct WireTrajectory {
    pub version: String,
    #[serde(rename = "batchSize")]
    pub batch_size: usize,
    /// Number of snapshots, including the seed batch.
    #[serde(default)]
    pub snapshots: usize,
    pub poses: Vec<[f64; POSE_DIM]>,
}

impl WireTrajectory {
    pub fn from_trajectory(traj: &Trajectory) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            batch_size: traj.batch_size(),
            snapshots: traj.num_snapshots(),
            poses: traj.as_flat().iter().map(Pose::to_array).collect(),
        }
    }

    pub fn into_trajectory(self) -> Result<Trajectory> {
        let poses = self
            .poses
            .into_iter()
            .map(Pose::from_array)
            .collect::<Result<Vec<_>>>()?;
        let traj = Trajectory::from_flat(self.batch_size, poses)?;
        if self.snapshots != 0 && self.snapshots != traj.num_snapshots() {
            return Err(EdfError::ShapeMismatch(format!(
                "header declares {} snapshots, poses hold {}",
                self.snapshots,
                traj.num_snapshots()
            )));
        }
        Ok(traj)
    }
}

pub fn export_trajectory_json(traj: &Trajectory) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&WireTrajectory::from_trajectory(traj))
}

/// Parse the JSON envelope. Shape checks happen in
/// [`WireTrajectory::into_trajectory`].
pub fn import_trajectory_json(json: &str) -> serde_json::Result<WireTrajectory> {
    serde_json::from_str(json)
}
