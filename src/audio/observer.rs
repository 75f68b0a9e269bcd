//! Stage hooks for diagnostics.
//!
//! The extractor reports every intermediate result to a [`StageObserver`].
//! Observers only see borrowed views and cannot alter what the pipeline
//! returns.

use serde::Serialize;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::features::SpectralFrames;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Harmonic,
    Percussive,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Harmonic => "harmonic",
            Component::Percussive => "percussive",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Split,
    Spectrogram,
    BandScaling,
    Loudness,
    Normalized,
    Gated,
    Sections,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Split => "split",
            Stage::Spectrogram => "spectrogram",
            Stage::BandScaling => "band_scaling",
            Stage::Loudness => "loudness",
            Stage::Normalized => "normalized",
            Stage::Gated => "gated",
            Stage::Sections => "sections",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(untagged)]
pub enum StageOutput<'a> {
    Waveform(&'a [f32]),
    Frames(&'a SpectralFrames),
    Curve(&'a [f32]),
    Sections(&'a [f32]),
}

impl StageOutput<'_> {
    fn values(&self) -> &[f32] {
        match self {
            StageOutput::Waveform(v) | StageOutput::Curve(v) | StageOutput::Sections(v) => v,
            StageOutput::Frames(m) => m.as_slice(),
        }
    }
}

pub trait StageObserver {
    fn on_stage(&self, component: Component, stage: Stage, output: StageOutput<'_>);
}

pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage(&self, _component: Component, _stage: Stage, _output: StageOutput<'_>) {}
}

/// Logs a min/max/mean summary of each stage at debug level.
pub struct LogObserver;

impl StageObserver for LogObserver {
    fn on_stage(&self, component: Component, stage: Stage, output: StageOutput<'_>) {
        let values = output.values();
        if values.is_empty() {
            log::debug!("[{}] {}: empty", component, stage);
            return;
        }
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
        log::debug!(
            "[{}] {}: n={} min={:.4} max={:.4} mean={:.4}",
            component,
            stage,
            values.len(),
            min,
            max,
            mean
        );
    }
}

/// Writes every stage output as `<component>_<stage>.json` into a directory.
pub struct DumpObserver {
    dir: PathBuf,
}

impl DumpObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, component: Component, stage: Stage, output: StageOutput<'_>) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}_{}.json", component, stage));
        let file = std::fs::File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &output)?;
        writer.flush()?;
        Ok(path)
    }
}

impl StageObserver for DumpObserver {
    fn on_stage(&self, component: Component, stage: Stage, output: StageOutput<'_>) {
        match self.write(component, stage, output) {
            Ok(path) => log::debug!("Wrote {}", path.display()),
            Err(err) => log::warn!("Failed to dump {} {} stage: {}", component, stage, err),
        }
    }
}

/// Forwards to several observers in order.
pub struct ObserverChain<'a>(pub Vec<&'a dyn StageObserver>);

impl StageObserver for ObserverChain<'_> {
    fn on_stage(&self, component: Component, stage: Stage, output: StageOutput<'_>) {
        for observer in &self.0 {
            observer.on_stage(component, stage, output);
        }
    }
}
