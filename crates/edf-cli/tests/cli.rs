//! CLI command integration tests.
//! Each test writes its config into a fresh temp directory.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
rng_seed = 3

[schedule]
stages = [[1.0, 0.1], [0.1, 0.01]]
n_steps = [20, 10]
dt = [0.05, 0.05]

[noise]
temperature = 0.01

[integrator]
strategy = "exponential"

[seed]
count = 4

[model]
target = [1.0, 0.0, 0.0, 0.0, 0.3, 0.0, 0.0]
ang_stiffness = 10.0
lin_stiffness = 10.0
"#;

fn edf_cmd() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("edf").unwrap()
}

fn write_config(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("job.toml");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn inspect_reports_schedule() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);
    edf_cmd()
        .arg("inspect")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("stage 0:"))
        .stdout(predicate::str::contains("stage 1:"))
        .stdout(predicate::str::contains("total steps: 30"))
        .stdout(predicate::str::contains("records:     124"));
}

#[test]
fn sample_writes_trajectory_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);
    let out = dir.path().join("traj.json");

    edf_cmd()
        .arg("sample")
        .arg(&config)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("sampled 4 poses over 30 steps (124 records)"))
        .stdout(predicate::str::contains("final mean distance"))
        .stdout(predicate::str::contains("wrote trajectory"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["batchSize"], 4);
    assert_eq!(json["snapshots"], 31);
    assert_eq!(json["poses"].as_array().unwrap().len(), 124);
}

#[test]
fn sample_is_reproducible_with_seed_flag() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);
    let run = || {
        let output = edf_cmd()
            .args(["sample", "--seed", "11"])
            .arg(&config)
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    assert_eq!(run(), run());
}

#[test]
fn schedule_mismatch_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &CONFIG.replace("n_steps = [20, 10]", "n_steps = [20]"));
    edf_cmd()
        .arg("sample")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn missing_config_fails() {
    edf_cmd()
        .args(["inspect", "/nonexistent/job.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
