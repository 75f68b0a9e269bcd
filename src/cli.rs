use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pulsewalk", about = "Audio pulse extraction and latent path interpolation")]
pub struct Cli {
    /// Config file (defaults to pulsewalk.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract pulse data and song sections from an audio file
    Analyze(AnalyzeArgs),
    /// Interpolate a latent path through anchor vectors
    Interpolate(InterpolateArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output JSON file with pulseData and songSections
    #[arg(short, long, default_value = "pulse.json")]
    pub output: PathBuf,

    /// Video frame rate the analysis grid is aligned to
    #[arg(long)]
    pub fps: Option<u32>,

    /// Start offset in seconds
    #[arg(long)]
    pub start: Option<f32>,

    /// Seconds of audio to analyze (default: to the end)
    #[arg(long)]
    pub duration: Option<f32>,

    /// Number of song sections to detect
    #[arg(short, long)]
    pub sections: Option<usize>,

    /// Loudness gate threshold (0.0-1.0)
    #[arg(long)]
    pub gate: Option<f32>,

    /// Bass band scale factor
    #[arg(long)]
    pub bass: Option<f32>,

    /// Mid band scale factor
    #[arg(long)]
    pub mid: Option<f32>,

    /// Treble band scale factor
    #[arg(long)]
    pub treble: Option<f32>,

    /// Take the pulse from the harmonic component instead of the percussive one
    #[arg(long)]
    pub harmonic: bool,

    /// Write every intermediate stage as JSON into this directory
    #[arg(long)]
    pub dump_stages: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InterpolateArgs {
    /// JSON file holding an array of anchor vectors
    pub anchors: PathBuf,

    /// Number of output frames
    #[arg(short = 'n', long)]
    pub frames: usize,

    /// Interpolation type: nearest, linear, quadratic or cubic
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Output JSON file
    #[arg(short, long, default_value = "path.json")]
    pub output: PathBuf,
}
