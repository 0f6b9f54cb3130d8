//! SE(3) score diffusion engine.
//!
//! Samples rigid-body poses (unit quaternion + translation) by integrating a
//! reverse-time diffusion driven by a learned score field, and evaluates the
//! denoising score-matching loss used to train that field. The score network
//! itself is supplied by the host through [`ScoreModel`].
//!
//! No I/O: file formats and configuration live in `edf-io`.

pub mod constants;
pub mod error;
pub mod integrator;
pub mod loss;
pub mod pose;
pub mod quaternion;
pub mod reference;
pub mod schedule;
pub mod score;
pub mod serde_compat;
pub mod tangent;

pub use constants::{EPSILON, Q_FACTOR, Q_INDICES, UNIT_NORM_TOLERANCE};
pub use error::{EdfError, Result};
pub use integrator::{SampleOptions, Sampler, SamplingRun, Trajectory};
pub use loss::{
    ContextBundle, LossEngine, STATISTIC_KEYS, ScoreGradient, TrainLoss, TrainStatistics,
};
pub use pose::{POSE_DIM, Pose, poses_from_flat, vec3s_from_flat};
pub use quaternion::Quaternion;
pub use reference::{FnScore, HarmonicWell, ZeroScore};
pub use schedule::{DiffusionSchedule, DiffusionStage};
pub use score::{GradMode, ScoreModel, ScorePair, ScoreScaling};
pub use serde_compat::{
    CURRENT_VERSION, WireTrajectory, export_trajectory_json, import_trajectory_json,
};
pub use tangent::{UpdateStrategy, quaternion_increment, tangent_matrix};
