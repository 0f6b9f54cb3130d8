use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EdfError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("schedule mismatch: {stages} stages, {n_steps} step counts, {dts} step sizes")]
    ScheduleMismatch {
        stages: usize,
        n_steps: usize,
        dts: usize,
    },

    #[error("invalid schedule stage {stage}: {reason}")]
    InvalidSchedule { stage: usize, reason: String },

    #[error("degenerate quaternion (norm = {norm})")]
    DegenerateQuaternion { norm: f64 },

    #[error("numerical divergence: {0}")]
    NumericalDivergence(String),

    #[error("invalid score scaling: ang_mult = {ang_mult}, lin_mult = {lin_mult}")]
    InvalidScaling { ang_mult: f64, lin_mult: f64 },

    #[error("invalid sampling options: {0}")]
    InvalidOptions(String),

    #[error("invalid time value {value} at index {index}")]
    InvalidTime { index: usize, value: f64 },

    #[error("score model failed: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, EdfError>;
