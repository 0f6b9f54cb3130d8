use std::fs;
use std::path::Path;

use edf_core::{Trajectory, export_trajectory_json, import_trajectory_json};

use crate::error::{IoError, Result};

/// Write a trajectory as pretty-printed JSON, creating parent directories.
pub fn write_trajectory(path: &Path, traj: &Trajectory) -> Result<()> {
    let json = export_trajectory_json(traj)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| IoError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, json).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        records = traj.len(),
        "wrote trajectory"
    );
    Ok(())
}

pub fn read_trajectory(path: &Path) -> Result<Trajectory> {
    let json = fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(import_trajectory_json(&json)?.into_trajectory()?)
}
