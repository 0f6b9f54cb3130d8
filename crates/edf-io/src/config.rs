//! TOML configuration for a sampling job.
//!
//! ```toml
//! rng_seed = 7
//!
//! [schedule]
//! stages = [[1.0, 0.1], [0.1, 0.01]]
//! n_steps = [10, 5]
//! dt = [0.02, 0.01]
//!
//! [model]
//! target = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
//! ang_stiffness = 1.0
//! lin_stiffness = 1.0
//! ```
//!
//! `[noise]`, `[integrator]` and `[seed]` are optional.

use std::fs;
use std::path::Path;

use edf_core::{
    DiffusionSchedule, HarmonicWell, Pose, Quaternion, SampleOptions, ScoreScaling,
    UpdateStrategy,
};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    #[serde(default)]
    pub rng_seed: Option<u64>,
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub noise: NoiseSection,
    #[serde(default)]
    pub integrator: IntegratorSection,
    #[serde(default)]
    pub seed: SeedSection,
    pub model: ModelSection,
}

/// Parallel lists, one entry per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSection {
    pub stages: Vec<[f64; 2]>,
    pub n_steps: Vec<usize>,
    pub dt: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSection {
    pub ang_mult: f64,
    pub lin_mult: f64,
    pub temperature: f64,
    pub linear_schedule: bool,
}

impl Default for NoiseSection {
    fn default() -> Self {
        Self {
            ang_mult: 1.0,
            lin_mult: 1.0,
            temperature: 1.0,
            linear_schedule: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSection {
    pub strategy: UpdateStrategy,
    pub repeat_final_snapshot: bool,
}

/// How the seed batch is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSection {
    pub count: usize,
    /// Uniform random rotations; identity otherwise.
    pub random_rotation: bool,
    /// Per-axis standard deviation of the seed translations.
    pub translation_std: f64,
}

impl Default for SeedSection {
    fn default() -> Self {
        Self {
            count: 8,
            random_rotation: true,
            translation_std: 0.0,
        }
    }
}

/// Parameters of the harmonic reference model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    pub target: [f64; 7],
    pub ang_stiffness: f64,
    pub lin_stiffness: f64,
    #[serde(default = "one")]
    pub ang_mult: f64,
    #[serde(default = "one")]
    pub lin_mult: f64,
}

fn one() -> f64 {
    1.0
}

impl SampleConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            stages = config.schedule.stages.len(),
            "loaded sample config"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.diffusion_schedule()?;
        self.sample_options().validate()?;
        self.model()?;
        if self.seed.count == 0 {
            return Err(IoError::InvalidConfig("seed.count must be at least 1".into()));
        }
        let std = self.seed.translation_std;
        if !std.is_finite() || std < 0.0 {
            return Err(IoError::InvalidConfig(format!(
                "seed.translation_std must be finite and non-negative, got {std}"
            )));
        }
        for (name, k) in [
            ("ang_stiffness", self.model.ang_stiffness),
            ("lin_stiffness", self.model.lin_stiffness),
        ] {
            if !k.is_finite() {
                return Err(IoError::InvalidConfig(format!("model.{name} is not finite")));
            }
        }
        Ok(())
    }

    pub fn diffusion_schedule(&self) -> Result<DiffusionSchedule> {
        let ranges: Vec<(f64, f64)> = self.schedule.stages.iter().map(|s| (s[0], s[1])).collect();
        Ok(DiffusionSchedule::from_parts(
            &ranges,
            &self.schedule.n_steps,
            &self.schedule.dt,
        )?)
    }

    pub fn sample_options(&self) -> SampleOptions {
        SampleOptions {
            ang_noise_mult: self.noise.ang_mult,
            lin_noise_mult: self.noise.lin_mult,
            temperature: self.noise.temperature,
            linear_noise_schedule: self.noise.linear_schedule,
            strategy: self.integrator.strategy,
            repeat_final_snapshot: self.integrator.repeat_final_snapshot,
        }
    }

    pub fn model(&self) -> Result<HarmonicWell> {
        let m = &self.model;
        let target = Pose::from_array(m.target)?;
        let scaling = ScoreScaling::new(m.ang_mult, m.lin_mult)?;
        Ok(HarmonicWell::new(target, m.ang_stiffness, m.lin_stiffness).with_scaling(scaling))
    }

    /// Draw the seed batch described by `[seed]`.
    pub fn seed_batch(&self, rng: &mut impl Rng) -> Result<Vec<Pose>> {
        (0..self.seed.count)
            .map(|_| {
                let rotation = if self.seed.random_rotation {
                    Quaternion::random(rng)
                } else {
                    Quaternion::identity()
                };
                let std = self.seed.translation_std;
                let translation: [f64; 3] =
                    [(); 3].map(|_| std * rng.sample::<f64, _>(StandardNormal));
                Ok(Pose::new(rotation, translation)?)
            })
            .collect()
    }
}
