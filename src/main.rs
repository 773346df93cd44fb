mod app;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cogex_audio::AudioBackend;
use cogex_core::{SimulationMode, SimulationOptions};
use cogex_experiment::{ExperimentConfig, ExperimentRuntime};
use cogex_plugins::PluginRegistry;
use cogex_timing::HighPrecisionTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::app::App;

pub type Runtime = ExperimentRuntime<HighPrecisionTimer, StdRng>;

#[derive(Parser, Debug)]
#[command(name = "cogex-trials")]
#[command(about = "Run a timeline of cogex trials described in a JSON experiment file")]
struct Args {
    /// Experiment file with runner settings and the trial timeline
    config: PathBuf,

    /// Run every trial without a participant
    #[arg(long, value_enum)]
    simulate: Option<SimulateMode>,

    /// JSON object of result fields forced into simulated trials
    #[arg(long, requires = "simulate")]
    simulation_data: Option<PathBuf>,

    /// Where to write the results, overriding the experiment file
    #[arg(long)]
    results: Option<PathBuf>,

    /// Seed for simulated responses
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SimulateMode {
    DataOnly,
    Visual,
}

impl From<SimulateMode> for SimulationMode {
    fn from(mode: SimulateMode) -> Self {
        match mode {
            SimulateMode::DataOnly => SimulationMode::DataOnly,
            SimulateMode::Visual => SimulationMode::Visual,
        }
    }
}

#[cfg(feature = "cpal")]
fn audio_backend() -> Arc<dyn AudioBackend> {
    Arc::new(cogex_audio::CpalAudioBackend::new())
}

#[cfg(not(feature = "cpal"))]
fn audio_backend() -> Arc<dyn AudioBackend> {
    use cogex_audio::{MediaDeviceInfo, MockAudioBackend};

    log::warn!("built without the `cpal` feature; offering a placeholder microphone");
    Arc::new(MockAudioBackend::new(vec![MediaDeviceInfo::audio_input(
        "placeholder-mic",
        "placeholder",
        "Placeholder Microphone",
    )]))
}

fn simulation_options(args: &Args) -> Result<SimulationOptions> {
    let Some(path) = &args.simulation_data else {
        return Ok(SimulationOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading simulation data {}", path.display()))?;
    let data = serde_json::from_str(&text)
        .with_context(|| format!("parsing simulation data {}", path.display()))?;
    Ok(SimulationOptions { data })
}

fn build_runtime(config: &ExperimentConfig, args: &Args) -> Result<Runtime> {
    let registry = PluginRegistry::new(audio_backend());
    let trials = config
        .timeline
        .iter()
        .enumerate()
        .map(|(i, description)| {
            registry
                .build(description)
                .with_context(|| format!("timeline entry {i}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut runtime = ExperimentRuntime::new(HighPrecisionTimer::new(), rng)
        .with_post_trial_gap(Duration::from_millis(config.post_trial_gap_ms));
    runtime.extend(trials);

    if let Some(mode) = args.simulate {
        runtime.simulate(mode.into(), simulation_options(args)?);
    }
    Ok(runtime)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ExperimentConfig::from_file(&args.config)
        .with_context(|| format!("loading experiment {}", args.config.display()))?;
    if let Some(results) = &args.results {
        config.results_path = results.clone();
    }

    let mut runtime = build_runtime(&config, &args)?;
    log::info!(
        "{} trials loaded from {}",
        config.timeline.len(),
        args.config.display()
    );

    if args.simulate == Some(SimulateMode::DataOnly) {
        let outcome = runtime.run_to_completion();
        runtime.save_results(&config.results_path)?;
        outcome.context("simulated run failed")?;
        return Ok(());
    }

    App::new(config, runtime)?.run()
}
