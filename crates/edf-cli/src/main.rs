use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edf_core::{Pose, Sampler};
use edf_io::{SampleConfig, write_trajectory};
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser)]
#[command(name = "edf", about = "SE(3) score diffusion sampler")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample poses with the harmonic reference model
    Sample {
        /// Job config (TOML)
        config: PathBuf,

        /// Write the full trajectory as JSON
        #[arg(long)]
        out: Option<PathBuf>,

        /// RNG seed, overrides `rng_seed` in the config
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the schedule a config describes
    Inspect {
        /// Job config (TOML)
        config: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Sample { config, out, seed } => cmd_sample(config, out.as_deref(), *seed),
        Commands::Inspect { config } => cmd_inspect(config),
    }
}

fn load_config(path: &Path) -> Result<SampleConfig> {
    SampleConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn cmd_sample(config_path: &Path, out: Option<&Path>, seed: Option<u64>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut rng = match seed.or(config.rng_seed) {
        Some(s) => SmallRng::seed_from_u64(s),
        None => SmallRng::from_os_rng(),
    };

    let schedule = config.diffusion_schedule()?;
    let model = config.model().context("invalid model section")?;
    let sampler =
        Sampler::new(&model, config.sample_options()).context("invalid sampler options")?;
    let seed_batch = config
        .seed_batch(&mut rng)
        .context("failed to draw seed batch")?;

    let traj = sampler
        .sample(&seed_batch, &[()], &(), &schedule, &mut rng)
        .context("sampling failed")?;

    println!(
        "sampled {} poses over {} steps ({} records)",
        traj.batch_size(),
        schedule.total_steps(),
        traj.len()
    );
    let (ang, lin) = mean_distance(traj.final_poses(), &model.target);
    println!("final mean distance: angular={ang:.4} rad, linear={lin:.4}");

    if let Some(path) = out {
        write_trajectory(path, &traj)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote trajectory to {}", path.display());
    }
    Ok(())
}

fn cmd_inspect(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let schedule = config.diffusion_schedule()?;
    let options = config.sample_options();

    for (i, stage) in schedule.stages().iter().enumerate() {
        println!(
            "stage {i}:    t {} -> {}, {} steps, dt={}",
            stage.t_start, stage.t_end, stage.n_steps, stage.dt
        );
    }
    let snapshots = 1 + schedule.total_steps() + usize::from(options.repeat_final_snapshot);
    println!("total steps: {}", schedule.total_steps());
    println!("batch:       {}", config.seed.count);
    println!("records:     {}", snapshots * config.seed.count);
    Ok(())
}

fn mean_distance(poses: &[Pose], target: &Pose) -> (f64, f64) {
    if poses.is_empty() {
        return (0.0, 0.0);
    }
    let n = poses.len() as f64;
    let ang: f64 = poses
        .iter()
        .map(|p| p.rotation.angular_distance(target.rotation))
        .sum();
    let lin: f64 = poses
        .iter()
        .map(|p| {
            (0..3)
                .map(|k| (p.translation[k] - target.translation[k]).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .sum();
    (ang / n, lin / n)
}
