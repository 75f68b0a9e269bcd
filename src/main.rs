mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use cli::{AnalyzeArgs, Cli, Command, InterpolateArgs};
use config::Config;
use pulsewalk::audio::observer::{
    Component, DumpObserver, LogObserver, ObserverChain, Stage, StageObserver, StageOutput,
};
use pulsewalk::latent::LATENT_DIM;
use pulsewalk::{analyze, decode_audio, interpolate_vectors, AnalysisParams, InterpolationKind, LoadOptions};

/// Shows the current pipeline stage on a spinner.
struct ProgressObserver {
    spinner: ProgressBar,
}

impl StageObserver for ProgressObserver {
    fn on_stage(&self, component: Component, stage: Stage, _output: StageOutput<'_>) {
        self.spinner.set_message(format!("{} {} done", component, stage));
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Analyze(args) => run_analyze(args, &config),
        Command::Interpolate(args) => run_interpolate(args, &config),
    }
}

fn run_analyze(args: AnalyzeArgs, config: &Config) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    // CLI flags win; the config fills in whatever was not given
    let cfg = &config.analysis;
    let mut params = AnalysisParams::for_fps(args.fps.unwrap_or(cfg.fps))?;
    params.start = args.start.unwrap_or(0.0);
    params.duration = args.duration;
    params.section_amount = args.sections.unwrap_or(cfg.sections);
    params.gate_threshold = args.gate.unwrap_or(cfg.gate_threshold);
    params.bass_factor = args.bass.unwrap_or(cfg.bass_factor);
    params.mid_factor = args.mid.unwrap_or(cfg.mid_factor);
    params.treble_factor = args.treble.unwrap_or(cfg.treble_factor);
    params.pulse_perc = !args.harmonic && cfg.pulse_perc;
    params.validate()?;

    log::info!("pulsewalk - audio analysis");
    log::info!("Input: {}", args.input.display());
    log::info!("Output: {}", args.output.display());
    log::info!(
        "Sample rate: {}Hz, hop: {}, sections: {}",
        params.sample_rate,
        params.frame_duration,
        params.section_amount
    );

    // 1. Decode audio
    log::info!("Loading audio file...");
    let load = LoadOptions {
        start: params.start,
        duration: params.duration,
        sample_rate: Some(params.sample_rate),
    };
    let audio = decode_audio(&args.input, &load)?;

    // 2. Analyze
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {msg}")
            .context("Invalid progress template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    let progress = ProgressObserver {
        spinner: spinner.clone(),
    };

    let dump = args.dump_stages.as_ref().map(|dir| {
        log::info!("Dumping stage outputs to {}", dir.display());
        DumpObserver::new(dir)
    });
    let mut observers: Vec<&dyn StageObserver> = vec![&progress, &LogObserver];
    if let Some(ref dump) = dump {
        observers.push(dump);
    }
    let metadata = analyze(&audio, &params, &ObserverChain(observers))?;
    spinner.finish_with_message("Analysis complete");

    log::info!(
        "Pulse frames: {}, sections: {:?}",
        metadata.pulse_data.len(),
        metadata.song_sections
    );

    write_json(&args.output, &metadata)?;
    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

fn run_interpolate(args: InterpolateArgs, config: &Config) -> Result<()> {
    let kind: InterpolationKind = args
        .kind
        .as_deref()
        .unwrap_or(&config.interpolation.kind)
        .parse()?;

    let content = std::fs::read_to_string(&args.anchors)
        .with_context(|| format!("Failed to read anchors: {}", args.anchors.display()))?;
    let anchors: Vec<Vec<f32>> = serde_json::from_str(&content)
        .with_context(|| format!("Anchors must be a JSON array of vectors: {}", args.anchors.display()))?;

    if let Some(first) = anchors.first() {
        if first.len() != LATENT_DIM {
            log::warn!(
                "Anchor dimension is {}, the generator expects {}",
                first.len(),
                LATENT_DIM
            );
        }
    }

    log::info!(
        "Interpolating {} anchors into {} frames ({})",
        anchors.len(),
        args.frames,
        kind
    );
    let path = interpolate_vectors(&anchors, args.frames, kind)?;

    write_json(&args.output, &path)?;
    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}
