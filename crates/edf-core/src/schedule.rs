//! Multi-stage annealing schedules.

use serde::{Deserialize, Serialize};

use crate::error::{EdfError, Result};

/// One annealing stage: `n_steps` evenly spaced times from `t_start` to
/// `t_end` (inclusive), each integrated with the fixed step size `dt`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffusionStage {
    pub t_start: f64,
    pub t_end: f64,
    pub n_steps: usize,
    pub dt: f64,
}

impl DiffusionStage {
    /// Evenly spaced times over `[t_start, t_end]`.
    /// A single-step stage runs at `t_start` only.
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        let n = self.n_steps;
        (0..n).map(move |i| {
            if n == 1 {
                self.t_start
            } else if i == n - 1 {
                self.t_end
            } else {
                self.t_start + (self.t_end - self.t_start) * (i as f64 / (n - 1) as f64)
            }
        })
    }

    fn validate(&self, stage: usize) -> Result<()> {
        let invalid = |reason: String| EdfError::InvalidSchedule { stage, reason };
        for (name, value) in [("t_start", self.t_start), ("t_end", self.t_end), ("dt", self.dt)] {
            if !value.is_finite() {
                return Err(invalid(format!("{name} is not finite ({value})")));
            }
            if value < 0.0 {
                return Err(invalid(format!("{name} is negative ({value})")));
            }
        }
        Ok(())
    }
}

/// Ordered list of stages. Immutable once built; deserializing validates
/// like [`DiffusionSchedule::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule")]
pub struct DiffusionSchedule {
    stages: Vec<DiffusionStage>,
}

#[derive(Deserialize)]
struct RawSchedule {
    stages: Vec<DiffusionStage>,
}

impl TryFrom<RawSchedule> for DiffusionSchedule {
    type Error = EdfError;

    fn try_from(raw: RawSchedule) -> Result<Self> {
        Self::new(raw.stages)
    }
}

impl DiffusionSchedule {
    pub fn new(stages: Vec<DiffusionStage>) -> Result<Self> {
        for (i, stage) in stages.iter().enumerate() {
            stage.validate(i)?;
        }
        Ok(Self { stages })
    }

    /// Build from the parallel-list form: `(t_start, t_end)` pairs, step
    /// counts, and step sizes. All three lists must have the same length.
    pub fn from_parts(ranges: &[(f64, f64)], n_steps: &[usize], dts: &[f64]) -> Result<Self> {
        if ranges.len() != n_steps.len() || ranges.len() != dts.len() {
            return Err(EdfError::ScheduleMismatch {
                stages: ranges.len(),
                n_steps: n_steps.len(),
                dts: dts.len(),
            });
        }
        let stages = ranges
            .iter()
            .zip(n_steps)
            .zip(dts)
            .map(|((&(t_start, t_end), &n_steps), &dt)| DiffusionStage {
                t_start,
                t_end,
                n_steps,
                dt,
            })
            .collect();
        Self::new(stages)
    }

    pub fn stages(&self) -> &[DiffusionStage] {
        &self.stages
    }

    /// Σ n_steps over all stages.
    pub fn total_steps(&self) -> usize {
        self.stages.iter().map(|s| s.n_steps).sum()
    }

    /// Every `(stage index, t, dt)` the integrator will visit, in order.
    pub fn steps(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(i, stage)| stage.times().map(move |t| (i, t, stage.dt)))
    }
}
