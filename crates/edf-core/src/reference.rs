//! Analytic score models with unit contexts.
//!
//! Useful for exercising the engines without a trained network: `ZeroScore`
//! isolates the noise path, `HarmonicWell` gives a drift with a known fixed
//! point, and `FnScore` wraps a closure.

use crate::error::{EdfError, Result};
use crate::pose::{POSE_DIM, Pose};
use crate::quaternion::Quaternion;
use crate::score::{GradMode, ScoreModel, ScorePair, ScoreScaling};

/// Always predicts zero scores.
#[derive(Clone, Copy, Debug)]
pub struct ZeroScore {
    pub scaling: ScoreScaling,
}

impl Default for ZeroScore {
    fn default() -> Self {
        Self {
            scaling: ScoreScaling::unit(),
        }
    }
}

impl ScoreModel for ZeroScore {
    type Points = ();
    type KeyContext = ();
    type QueryContext = ();

    fn scaling(&self) -> ScoreScaling {
        self.scaling
    }

    fn key_context_multiscale(&self, _points: &()) -> Result<Vec<()>> {
        Ok(vec![()])
    }

    fn query_context(&self, _points: &()) -> Result<()> {
        Ok(())
    }

    fn score(
        &self,
        poses: &[[f32; POSE_DIM]],
        _key: &[()],
        _query: &(),
        _time: &[f32],
        _mode: GradMode,
    ) -> Result<ScorePair> {
        Ok(ScorePair::zeros(poses.len()))
    }
}

/// Quadratic potential around a target pose.
///
/// The angular score is `ang_stiffness · log(q⁻¹ q*)` and the linear score
/// is `lin_stiffness · q⁻¹(x* − x)`, both in the pose's local frame, the
/// frame the integrator applies increments in.
#[derive(Clone, Copy, Debug)]
pub struct HarmonicWell {
    pub target: Pose,
    pub ang_stiffness: f64,
    pub lin_stiffness: f64,
    pub scaling: ScoreScaling,
}

impl HarmonicWell {
    pub fn new(target: Pose, ang_stiffness: f64, lin_stiffness: f64) -> Self {
        Self {
            target,
            ang_stiffness,
            lin_stiffness,
            scaling: ScoreScaling::unit(),
        }
    }

    pub fn with_scaling(mut self, scaling: ScoreScaling) -> Self {
        self.scaling = scaling;
        self
    }

    fn score_one(&self, record: &[f32; POSE_DIM]) -> Result<([f32; 3], [f32; 3])> {
        let pose = Pose::from_array(record.map(f64::from))?;
        let q_inv = pose.rotation.conjugate();
        let rel: Quaternion = q_inv * self.target.rotation;
        let ang = rel.to_scaled_axis().map(|c| (self.ang_stiffness * c) as f32);
        let err = [
            self.target.translation[0] - pose.translation[0],
            self.target.translation[1] - pose.translation[1],
            self.target.translation[2] - pose.translation[2],
        ];
        let lin = q_inv.rotate(err).map(|c| (self.lin_stiffness * c) as f32);
        Ok((ang, lin))
    }
}

impl ScoreModel for HarmonicWell {
    type Points = ();
    type KeyContext = ();
    type QueryContext = ();

    fn scaling(&self) -> ScoreScaling {
        self.scaling
    }

    fn key_context_multiscale(&self, _points: &()) -> Result<Vec<()>> {
        Ok(vec![()])
    }

    fn query_context(&self, _points: &()) -> Result<()> {
        Ok(())
    }

    fn score(
        &self,
        poses: &[[f32; POSE_DIM]],
        _key: &[()],
        _query: &(),
        time: &[f32],
        _mode: GradMode,
    ) -> Result<ScorePair> {
        if time.len() != poses.len() {
            return Err(EdfError::ShapeMismatch(format!(
                "{} time values for {} poses",
                time.len(),
                poses.len()
            )));
        }
        let mut out = ScorePair {
            angular: Vec::with_capacity(poses.len()),
            linear: Vec::with_capacity(poses.len()),
        };
        for record in poses {
            let (ang, lin) = self.score_one(record)?;
            out.angular.push(ang);
            out.linear.push(lin);
        }
        Ok(out)
    }
}

/// Score model backed by a closure over `(poses, time)`.
pub struct FnScore<F> {
    f: F,
    scaling: ScoreScaling,
}

impl<F> FnScore<F>
where
    F: Fn(&[[f32; POSE_DIM]], &[f32]) -> Result<ScorePair>,
{
    pub fn new(scaling: ScoreScaling, f: F) -> Self {
        Self { f, scaling }
    }
}

impl<F> ScoreModel for FnScore<F>
where
    F: Fn(&[[f32; POSE_DIM]], &[f32]) -> Result<ScorePair>,
{
    type Points = ();
    type KeyContext = ();
    type QueryContext = ();

    fn scaling(&self) -> ScoreScaling {
        self.scaling
    }

    fn key_context_multiscale(&self, _points: &()) -> Result<Vec<()>> {
        Ok(vec![()])
    }

    fn query_context(&self, _points: &()) -> Result<()> {
        Ok(())
    }

    fn score(
        &self,
        poses: &[[f32; POSE_DIM]],
        _key: &[()],
        _query: &(),
        time: &[f32],
        _mode: GradMode,
    ) -> Result<ScorePair> {
        (self.f)(poses, time)
    }
}
