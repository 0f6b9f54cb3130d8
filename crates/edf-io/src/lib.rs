pub mod config;
pub mod error;
pub mod trajectory_file;

pub use config::SampleConfig;
pub use error::{IoError, Result};
pub use trajectory_file::{read_trajectory, write_trajectory};
