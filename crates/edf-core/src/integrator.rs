//! Reverse-time sampling over SE(3).
//!
//! Each step asks the score model for `(angular, linear)` scores at the
//! current batch, adds Gaussian noise scaled by `sqrt(dt · t · temperature)`,
//! and advances every pose with the configured [`UpdateStrategy`]:
//!
//! ```text
//! ang_disp = (ang_score · dt/2 + ang_noise) · ang_mult
//! lin_disp = (lin_score · dt/2 + lin_noise) · lin_mult
//! ```
//!
//! The working batch is kept in `f64`. At the model boundary it is narrowed
//! to `f32` with `as` casts (round to nearest, ties to even; overflow becomes
//! infinite and is caught as divergence on the way back). Scores widen back
//! to `f64` exactly.
//!
//! The result keeps the flat snapshot layout: `(1 + Σ n_steps) · N` poses,
//! step-major, batch-minor. [`Trajectory`] only adds views over it.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{EdfError, Result};
use crate::pose::{Pose, to_f32_records};
use crate::schedule::DiffusionSchedule;
use crate::score::{GradMode, ScoreModel, ScoreScaling};
use crate::tangent::UpdateStrategy;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleOptions {
    pub ang_noise_mult: f64,
    pub lin_noise_mult: f64,
    pub temperature: f64,
    /// Scale both noise channels by an extra `sqrt(t)`.
    pub linear_noise_schedule: bool,
    pub strategy: UpdateStrategy,
    /// Append the final batch a second time after the last step.
    pub repeat_final_snapshot: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            ang_noise_mult: 1.0,
            lin_noise_mult: 1.0,
            temperature: 1.0,
            linear_noise_schedule: false,
            strategy: UpdateStrategy::FirstOrder,
            repeat_final_snapshot: false,
        }
    }
}

impl SampleOptions {
    /// Deterministic drift only: both noise multipliers zeroed.
    pub fn noiseless() -> Self {
        Self {
            ang_noise_mult: 0.0,
            lin_noise_mult: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ang_noise_mult", self.ang_noise_mult),
            ("lin_noise_mult", self.lin_noise_mult),
            ("temperature", self.temperature),
        ] {
            if !value.is_finite() {
                return Err(EdfError::InvalidOptions(format!("{name} is not finite ({value})")));
            }
        }
        if self.temperature < 0.0 {
            return Err(EdfError::InvalidOptions(format!(
                "temperature is negative ({})",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Flattened sampling output: snapshot `k` occupies
/// `poses[k * batch_size .. (k + 1) * batch_size]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    batch_size: usize,
    snapshots: usize,
    poses: Vec<Pose>,
}

impl Trajectory {
    pub fn from_flat(batch_size: usize, poses: Vec<Pose>) -> Result<Self> {
        let snapshots = match batch_size {
            0 if poses.is_empty() => 0,
            0 => {
                return Err(EdfError::ShapeMismatch(format!(
                    "{} poses for a batch size of 0",
                    poses.len()
                )));
            }
            n if poses.len() % n != 0 => {
                return Err(EdfError::ShapeMismatch(format!(
                    "{} poses is not a whole number of batches of {n}",
                    poses.len()
                )));
            }
            n => poses.len() / n,
        };
        Ok(Self {
            batch_size,
            snapshots,
            poses,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of pose records (not snapshots).
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn num_snapshots(&self) -> usize {
        self.snapshots
    }

    pub fn as_flat(&self) -> &[Pose] {
        &self.poses
    }

    pub fn snapshot(&self, index: usize) -> Option<&[Pose]> {
        if index >= self.snapshots {
            return None;
        }
        let start = index * self.batch_size;
        Some(&self.poses[start..start + self.batch_size])
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &[Pose]> + '_ {
        (0..self.snapshots).filter_map(|i| self.snapshot(i))
    }

    pub fn initial_poses(&self) -> &[Pose] {
        self.snapshot(0).unwrap_or(&[])
    }

    pub fn final_poses(&self) -> &[Pose] {
        self.snapshots
            .checked_sub(1)
            .and_then(|last| self.snapshot(last))
            .unwrap_or(&[])
    }
}

/// Reverse-time sampler bound to a score model.
pub struct Sampler<'m, M: ScoreModel> {
    model: &'m M,
    scaling: ScoreScaling,
    options: SampleOptions,
}

impl<'m, M: ScoreModel> Sampler<'m, M> {
    pub fn new(model: &'m M, options: SampleOptions) -> Result<Self> {
        options.validate()?;
        let s = model.scaling();
        let scaling = ScoreScaling::new(s.ang_mult(), s.lin_mult())?;
        Ok(Self {
            model,
            scaling,
            options,
        })
    }

    pub fn options(&self) -> &SampleOptions {
        &self.options
    }

    /// Begin a run that the caller drives one step at a time.
    pub fn start<'a, R: Rng>(
        &'a self,
        seed: &[Pose],
        key: &'a [M::KeyContext],
        query: &'a M::QueryContext,
        schedule: &DiffusionSchedule,
        rng: R,
    ) -> Result<SamplingRun<'a, 'm, M, R>> {
        let current = seed
            .iter()
            .enumerate()
            .map(|(i, seed)| {
                let pose = Pose::new(seed.rotation, seed.translation)?;
                if !pose.is_finite() {
                    return Err(EdfError::NumericalDivergence(format!(
                        "seed pose {i} has a non-finite translation"
                    )));
                }
                Ok(pose)
            })
            .collect::<Result<Vec<_>>>()?;

        let steps: Vec<(usize, f64, f64)> = schedule.steps().collect();
        let extra = usize::from(self.options.repeat_final_snapshot);
        let mut poses = Vec::with_capacity((1 + steps.len() + extra) * current.len());
        poses.extend_from_slice(&current);

        Ok(SamplingRun {
            sampler: self,
            key,
            query,
            steps,
            cursor: 0,
            stage: None,
            current,
            poses,
            rng,
        })
    }

    /// Run every stage of `schedule` from `seed` and return the flattened
    /// trajectory.
    pub fn sample<R: Rng>(
        &self,
        seed: &[Pose],
        key: &[M::KeyContext],
        query: &M::QueryContext,
        schedule: &DiffusionSchedule,
        rng: &mut R,
    ) -> Result<Trajectory> {
        self.start(seed, key, query, schedule, rng)?.finish()
    }
}

/// In-progress sampling run. Stopping early is done by not calling
/// [`SamplingRun::step`] again.
pub struct SamplingRun<'a, 'm, M: ScoreModel, R> {
    sampler: &'a Sampler<'m, M>,
    key: &'a [M::KeyContext],
    query: &'a M::QueryContext,
    steps: Vec<(usize, f64, f64)>,
    cursor: usize,
    stage: Option<usize>,
    current: Vec<Pose>,
    poses: Vec<Pose>,
    rng: R,
}

impl<M: ScoreModel, R: Rng> SamplingRun<'_, '_, M, R> {
    pub fn current(&self) -> &[Pose] {
        &self.current
    }

    pub fn completed_steps(&self) -> usize {
        self.cursor
    }

    pub fn remaining_steps(&self) -> usize {
        self.steps.len() - self.cursor
    }

    /// Advance one diffusion step. Returns `None` once the schedule is
    /// exhausted.
    pub fn step(&mut self) -> Result<Option<&[Pose]>> {
        let Some(&(stage, t, dt)) = self.steps.get(self.cursor) else {
            return Ok(None);
        };
        if self.stage != Some(stage) {
            self.stage = Some(stage);
            tracing::debug!(stage, t, dt, batch = self.current.len(), "entering diffusion stage");
        }
        self.advance(t, dt)?;
        self.cursor += 1;
        self.poses.extend_from_slice(&self.current);
        tracing::trace!(step = self.cursor, t, "diffusion step");
        Ok(Some(&self.current))
    }

    /// Run the remaining steps and return the trajectory.
    pub fn finish(mut self) -> Result<Trajectory> {
        while self.step()?.is_some() {}
        if self.sampler.options.repeat_final_snapshot {
            self.poses.extend_from_slice(&self.current);
        }
        Trajectory::from_flat(self.current.len(), self.poses)
    }

    fn advance(&mut self, t: f64, dt: f64) -> Result<()> {
        let opts = self.sampler.options;
        let scaling = self.sampler.scaling;
        let n = self.current.len();
        let step = self.cursor;

        let records = to_f32_records(&self.current);
        let time = vec![t as f32; n];
        let scores =
            self.sampler
                .model
                .score(&records, self.key, self.query, &time, GradMode::Inference)?;
        scores.expect_len(n)?;
        if !scores.is_finite() {
            return Err(EdfError::NumericalDivergence(format!(
                "non-finite score at step {step} (t = {t})"
            )));
        }

        let mut noise_scale = (dt * t * opts.temperature).sqrt();
        if opts.linear_noise_schedule {
            noise_scale *= t.sqrt();
        }
        if !noise_scale.is_finite() {
            return Err(EdfError::NumericalDivergence(format!(
                "noise scale is not finite at step {step} (t = {t}, dt = {dt})"
            )));
        }
        let ang_noise_scale = opts.ang_noise_mult * noise_scale;
        let lin_noise_scale = opts.lin_noise_mult * noise_scale;

        let ang_noise = draw_noise(&mut self.rng, n);
        let lin_noise = draw_noise(&mut self.rng, n);

        for (i, pose) in self.current.iter_mut().enumerate() {
            let da = displacement(
                scores.angular[i],
                ang_noise[i],
                dt,
                ang_noise_scale,
                scaling.ang_mult(),
            );
            let dx = displacement(
                scores.linear[i],
                lin_noise[i],
                dt,
                lin_noise_scale,
                scaling.lin_mult(),
            );
            if !da.iter().chain(&dx).all(|v| v.is_finite()) {
                return Err(EdfError::NumericalDivergence(format!(
                    "non-finite displacement for pose {i} at step {step}"
                )));
            }
            *pose = opts.strategy.apply(pose, da, dx)?;
        }
        Ok(())
    }
}

fn draw_noise<R: Rng>(rng: &mut R, n: usize) -> Vec<[f64; 3]> {
    (0..n)
        .map(|_| {
            [
                rng.sample(StandardNormal),
                rng.sample(StandardNormal),
                rng.sample(StandardNormal),
            ]
        })
        .collect()
}

fn displacement(
    score: [f32; 3],
    noise: [f64; 3],
    dt: f64,
    noise_scale: f64,
    mult: f64,
) -> [f64; 3] {
    [0, 1, 2].map(|k| (f64::from(score[k]) * dt / 2.0 + noise_scale * noise[k]) * mult)
}
