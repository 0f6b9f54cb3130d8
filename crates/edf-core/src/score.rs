//! The score-model seam.
//!
//! The network that predicts scores, and the feature pipeline that turns
//! point clouds into contexts, live outside this crate. Engines here only
//! see them through [`ScoreModel`].

use serde::{Deserialize, Serialize};

use crate::error::{EdfError, Result};
use crate::pose::POSE_DIM;

/// Whether the host should retain computation history for differentiation.
///
/// Scores must not depend on the mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradMode {
    Inference,
    Training,
}

/// Fixed multipliers the model was trained with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreScaling {
    ang_mult: f64,
    lin_mult: f64,
}

impl ScoreScaling {
    pub fn new(ang_mult: f64, lin_mult: f64) -> Result<Self> {
        let valid = |m: f64| m.is_finite() && m > 0.0;
        if !valid(ang_mult) || !valid(lin_mult) {
            return Err(EdfError::InvalidScaling { ang_mult, lin_mult });
        }
        Ok(Self { ang_mult, lin_mult })
    }

    pub fn unit() -> Self {
        Self {
            ang_mult: 1.0,
            lin_mult: 1.0,
        }
    }

    pub fn ang_mult(&self) -> f64 {
        self.ang_mult
    }

    pub fn lin_mult(&self) -> f64 {
        self.lin_mult
    }
}

/// Per-pose `(angular, linear)` tangent-space scores, in model precision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorePair {
    pub angular: Vec<[f32; 3]>,
    pub linear: Vec<[f32; 3]>,
}

impl ScorePair {
    pub fn zeros(n: usize) -> Self {
        Self {
            angular: vec![[0.0; 3]; n],
            linear: vec![[0.0; 3]; n],
        }
    }

    pub fn len(&self) -> usize {
        self.angular.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angular.is_empty()
    }

    /// Check that both channels hold exactly `n` rows.
    pub fn expect_len(&self, n: usize) -> Result<()> {
        if self.angular.len() != n || self.linear.len() != n {
            return Err(EdfError::ShapeMismatch(format!(
                "score model returned {} angular and {} linear rows for a batch of {n}",
                self.angular.len(),
                self.linear.len()
            )));
        }
        Ok(())
    }

    pub fn is_finite(&self) -> bool {
        self.angular
            .iter()
            .chain(&self.linear)
            .all(|v| v.iter().all(|c| c.is_finite()))
    }
}

/// A score network together with the feature pipeline that feeds it.
pub trait ScoreModel {
    /// Raw point set handed to the feature pipeline.
    type Points;
    /// One scale of the multiscale key (scene) context.
    type KeyContext;
    /// Query (gripper/object) context.
    type QueryContext;

    fn scaling(&self) -> ScoreScaling;

    fn key_context_multiscale(&self, points: &Self::Points) -> Result<Vec<Self::KeyContext>>;

    fn query_context(&self, points: &Self::Points) -> Result<Self::QueryContext>;

    /// Predict scores for `poses` (packed `[qw, qx, qy, qz, x, y, z]`) at the
    /// per-pose `time` values. Must accept any batch length.
    fn score(
        &self,
        poses: &[[f32; POSE_DIM]],
        key: &[Self::KeyContext],
        query: &Self::QueryContext,
        time: &[f32],
        mode: GradMode,
    ) -> Result<ScorePair>;
}
