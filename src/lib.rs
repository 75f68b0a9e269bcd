//! Audio-driven latent walks.
//!
//! [`audio`] turns a waveform into a gated loudness ("pulse") curve and a set
//! of song section boundaries. [`latent`] expands a few anchor vectors into one
//! latent vector per video frame. The two are independent; combining them is
//! left to the consumer.

pub mod audio;
pub mod error;
pub mod latent;

pub use audio::analysis::{analyze, AnalysisParams};
pub use audio::decode::{decode_audio, AudioData, LoadOptions};
pub use audio::features::AudioMetadata;
pub use error::PulseError;
pub use latent::{interpolate_vectors, InterpolationKind};
