use super::decode::AudioData;
use super::features::{AudioMetadata, SpectralFrames};
use super::hpss::hpss;
use super::mel::MelFilterbank;
use super::observer::{Component, Stage, StageObserver, StageOutput};
use super::sections::detect_sections;
use super::stft::{stft_magnitude, N_FFT};
use crate::error::{PulseError, Result};

/// Fraction of bands that count as bass.
const BASS_SPLIT: f64 = 0.01;
/// Upper edge of the mid bands, as a fraction of all bands.
const MID_SPLIT: f64 = 0.26;

/// Samples per video frame used to derive the analysis sample rate.
const SAMPLES_PER_FRAME: u32 = 512;

/// Parameters for one analysis run. Immutable for the duration of the run.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisParams {
    /// Seconds of audio to analyze; `None` analyzes to the end
    pub duration: Option<f32>,
    pub sample_rate: u32,
    /// Offset into the source in seconds
    pub start: f32,
    /// Hop between analysis frames, in samples
    pub frame_duration: usize,
    pub section_amount: usize,
    pub gate_threshold: f32,
    pub bass_factor: f32,
    pub mid_factor: f32,
    pub treble_factor: f32,
    /// Report the percussive component's pulse instead of the harmonic one
    pub pulse_perc: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self::with_rate(25 * SAMPLES_PER_FRAME, 25)
    }
}

impl AnalysisParams {
    /// Parameters whose frame grid lines up with a `fps` video.
    ///
    /// The sample rate is `fps * 512` and the hop is the per-frame sample
    /// count rounded down to a multiple of 64.
    pub fn for_fps(fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(PulseError::InvalidParameters("fps must be positive".into()));
        }
        let sample_rate = fps.checked_mul(SAMPLES_PER_FRAME).ok_or_else(|| {
            PulseError::InvalidParameters(format!("fps {} is too large", fps))
        })?;
        Ok(Self::with_rate(sample_rate, fps))
    }

    fn with_rate(sample_rate: u32, fps: u32) -> Self {
        let per_frame = sample_rate / fps;
        Self {
            duration: None,
            sample_rate,
            start: 0.0,
            frame_duration: (per_frame - per_frame % 64) as usize,
            section_amount: 1,
            gate_threshold: 0.0,
            bass_factor: 1.0,
            mid_factor: 1.0,
            treble_factor: 1.0,
            pulse_perc: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PulseError::InvalidParameters("sample rate must be positive".into()));
        }
        if self.frame_duration == 0 {
            return Err(PulseError::InvalidParameters("frame duration must be positive".into()));
        }
        if self.section_amount == 0 {
            return Err(PulseError::InvalidSectionCount {
                requested: 0,
                available: 0,
            });
        }
        if !(0.0..=1.0).contains(&self.gate_threshold) {
            return Err(PulseError::InvalidParameters(format!(
                "gate threshold {} outside [0, 1]",
                self.gate_threshold
            )));
        }
        for (name, factor) in [
            ("bass", self.bass_factor),
            ("mid", self.mid_factor),
            ("treble", self.treble_factor),
        ] {
            if !factor.is_finite() || factor < 0.0 {
                return Err(PulseError::InvalidParameters(format!(
                    "{} factor must be finite and non-negative, got {}",
                    name, factor
                )));
            }
        }
        if !self.start.is_finite() || self.start < 0.0 {
            return Err(PulseError::InvalidParameters(format!("invalid start offset {}", self.start)));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(PulseError::InvalidParameters(format!("invalid duration {}", duration)));
            }
        }
        Ok(())
    }
}

/// Split the waveform and derive pulse data and song sections from the
/// component selected by `pulse_perc`.
pub fn analyze(
    audio: &AudioData,
    params: &AnalysisParams,
    observer: &dyn StageObserver,
) -> Result<AudioMetadata> {
    params.validate()?;
    if audio.sample_rate != params.sample_rate {
        return Err(PulseError::InvalidParameters(format!(
            "audio is {} Hz but analysis expects {} Hz",
            audio.sample_rate, params.sample_rate
        )));
    }

    log::info!("Splitting audio ({} samples)...", audio.samples.len());
    let (harmonic, percussive) = hpss(&audio.samples);
    observer.on_stage(Component::Harmonic, Stage::Split, StageOutput::Waveform(&harmonic));
    observer.on_stage(Component::Percussive, Stage::Split, StageOutput::Waveform(&percussive));

    let (component, samples) = if params.pulse_perc {
        (Component::Percussive, percussive)
    } else {
        (Component::Harmonic, harmonic)
    };

    log::info!("Analyzing {} content", component);
    analyze_component(&samples, component, params, observer)
}

/// Run the spectral stages on one waveform component.
pub fn analyze_component(
    samples: &[f32],
    component: Component,
    params: &AnalysisParams,
    observer: &dyn StageObserver,
) -> Result<AudioMetadata> {
    params.validate()?;

    log::info!("Pass 1: Spectrogram (hop={})...", params.frame_duration);
    let frames = spectrogram(samples, params.sample_rate, params.frame_duration);
    observer.on_stage(component, Stage::Spectrogram, StageOutput::Frames(&frames));

    log::info!("Pass 2: Scaling frequency bands...");
    let frames = scale_frequency_bands(frames, params.bass_factor, params.mid_factor, params.treble_factor);
    observer.on_stage(component, Stage::BandScaling, StageOutput::Frames(&frames));

    log::info!("Pass 3: Loudness, normalization & gating (gate={:.2})...", params.gate_threshold);
    let loudness = frame_loudness(&frames);
    observer.on_stage(component, Stage::Loudness, StageOutput::Curve(&loudness));

    let normalized = normalize_loudness(loudness)?;
    observer.on_stage(component, Stage::Normalized, StageOutput::Curve(&normalized));

    let pulse_data = gate_loudness(normalized, params.gate_threshold);
    observer.on_stage(component, Stage::Gated, StageOutput::Curve(&pulse_data));

    log::info!("Pass 4: Song sections (k={})...", params.section_amount);
    let song_sections = detect_sections(
        &frames,
        params.section_amount,
        params.frame_duration,
        params.sample_rate,
    )?;
    observer.on_stage(component, Stage::Sections, StageOutput::Sections(&song_sections));

    Ok(AudioMetadata {
        pulse_data,
        song_sections,
    })
}

/// Magnitude spectrogram remapped onto the mel scale.
pub fn spectrogram(samples: &[f32], sample_rate: u32, hop: usize) -> SpectralFrames {
    let linear = stft_magnitude(samples, N_FFT, hop);
    MelFilterbank::standard(sample_rate, N_FFT).apply(&linear)
}

/// Scale the bass, mid and treble bands in place.
///
/// Band edges are `trunc(bins * 0.01)` and `trunc(bins * 0.26)`; with few
/// bins some bands are empty.
pub fn scale_frequency_bands(
    mut frames: SpectralFrames,
    bass_factor: f32,
    mid_factor: f32,
    treble_factor: f32,
) -> SpectralFrames {
    let (bass_end, mid_end) = band_edges(frames.bins());
    frames.scale_rows(0..bass_end, bass_factor);
    frames.scale_rows(bass_end..mid_end, mid_factor);
    frames.scale_rows(mid_end..frames.bins(), treble_factor);
    frames
}

pub fn band_edges(total_bins: usize) -> (usize, usize) {
    let bass_end = (total_bins as f64 * BASS_SPLIT) as usize;
    let mid_end = (total_bins as f64 * MID_SPLIT) as usize;
    (bass_end, mid_end)
}

/// Mean over all bins, one value per frame.
pub fn frame_loudness(frames: &SpectralFrames) -> Vec<f32> {
    let bins = frames.bins();
    if bins == 0 {
        return vec![0.0; frames.frames()];
    }
    (0..frames.frames())
        .map(|t| (frames.column(t).map(f64::from).sum::<f64>() / bins as f64) as f32)
        .collect()
}

/// Rescale so the minimum maps to 0.0 and the maximum to 1.0.
pub fn normalize_loudness(mut curve: Vec<f32>) -> Result<Vec<f32>> {
    if curve.is_empty() {
        return Err(PulseError::DegenerateSignal("loudness curve is empty".into()));
    }
    if curve.iter().any(|v| !v.is_finite()) {
        return Err(PulseError::DegenerateSignal("loudness curve has non-finite values".into()));
    }
    let min = curve.iter().copied().fold(f32::INFINITY, f32::min);
    let max = curve.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return Err(PulseError::DegenerateSignal(format!(
            "loudness range is zero (min = max = {})",
            min
        )));
    }
    for value in &mut curve {
        *value = (*value - min) / range;
    }
    Ok(curve)
}

/// Force every value strictly below `threshold` to zero.
pub fn gate_loudness(mut curve: Vec<f32>, threshold: f32) -> Vec<f32> {
    for value in &mut curve {
        if *value < threshold {
            *value = 0.0;
        }
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::observer::NoopObserver;
    use std::cell::RefCell;

    fn matrix(bins: usize, frames: usize) -> SpectralFrames {
        let rows = (0..bins)
            .map(|b| (0..frames).map(|t| (b * frames + t) as f32 * 0.1).collect())
            .collect();
        SpectralFrames::from_rows(rows)
    }

    #[test]
    fn test_for_fps_matches_job_defaults() {
        let params = AnalysisParams::for_fps(25).unwrap();
        assert_eq!(params.sample_rate, 12800);
        assert_eq!(params.frame_duration, 512);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_for_fps_rejects_zero_and_overflow() {
        assert!(matches!(AnalysisParams::for_fps(0), Err(PulseError::InvalidParameters(_))));
        assert!(matches!(
            AnalysisParams::for_fps(u32::MAX / 2),
            Err(PulseError::InvalidParameters(_))
        ));
        assert_eq!(AnalysisParams::default(), AnalysisParams::for_fps(25).unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut params = AnalysisParams::default();
        params.gate_threshold = 1.5;
        assert!(matches!(params.validate(), Err(PulseError::InvalidParameters(_))));

        let mut params = AnalysisParams::default();
        params.mid_factor = -1.0;
        assert!(matches!(params.validate(), Err(PulseError::InvalidParameters(_))));

        let mut params = AnalysisParams::default();
        params.section_amount = 0;
        assert!(matches!(params.validate(), Err(PulseError::InvalidSectionCount { .. })));
    }

    #[test]
    fn test_band_edges_truncate() {
        assert_eq!(band_edges(128), (1, 33));
        assert_eq!(band_edges(99), (0, 25));
        assert_eq!(band_edges(3), (0, 0));
    }

    #[test]
    fn test_unit_factors_are_a_no_op() {
        let m = matrix(128, 4);
        let scaled = scale_frequency_bands(m.clone(), 1.0, 1.0, 1.0);
        assert_eq!(scaled, m);
    }

    #[test]
    fn test_bands_scaled_independently() {
        let m = SpectralFrames::from_rows(vec![vec![1.0]; 128]);
        let scaled = scale_frequency_bands(m, 2.0, 3.0, 5.0);
        assert_eq!(scaled.get(0, 0), 2.0);
        assert_eq!(scaled.get(1, 0), 3.0);
        assert_eq!(scaled.get(32, 0), 3.0);
        assert_eq!(scaled.get(33, 0), 5.0);
        assert_eq!(scaled.get(127, 0), 5.0);
    }

    #[test]
    fn test_tiny_matrix_only_treble_applies() {
        let m = SpectralFrames::from_rows(vec![vec![1.0], vec![1.0], vec![1.0]]);
        let scaled = scale_frequency_bands(m, 0.0, 0.0, 4.0);
        assert_eq!(scaled.as_slice(), &[4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_loudness_is_column_mean() {
        let m = SpectralFrames::from_rows(vec![vec![1.0, 0.0], vec![3.0, 2.0]]);
        assert_eq!(frame_loudness(&m), vec![2.0, 1.0]);
    }

    #[test]
    fn test_normalize_spans_unit_range() {
        let out = normalize_loudness(vec![2.0, 4.0, 3.0, 6.0]).unwrap();
        assert_eq!(out, vec![0.0, 0.5, 0.25, 1.0]);
    }

    #[test]
    fn test_normalize_rejects_constant_curve() {
        assert!(matches!(
            normalize_loudness(vec![0.7; 10]),
            Err(PulseError::DegenerateSignal(_))
        ));
        assert!(matches!(normalize_loudness(Vec::new()), Err(PulseError::DegenerateSignal(_))));
    }

    #[test]
    fn test_normalize_rejects_non_finite_values() {
        assert!(matches!(
            normalize_loudness(vec![0.1, f32::NAN, 0.9]),
            Err(PulseError::DegenerateSignal(_))
        ));
        assert!(matches!(
            normalize_loudness(vec![0.1, f32::INFINITY, 0.9]),
            Err(PulseError::DegenerateSignal(_))
        ));
    }

    #[test]
    fn test_gate_zeroes_below_threshold_and_is_idempotent() {
        let curve = vec![0.0, 0.1, 0.2, 0.5, 1.0];
        let gated = gate_loudness(curve, 0.2);
        assert_eq!(gated, vec![0.0, 0.0, 0.2, 0.5, 1.0]);
        assert_eq!(gate_loudness(gated.clone(), 0.2), gated);
    }

    fn test_signal(sample_rate: u32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                // quiet first half, loud second half with a click every 0.25s
                let amp = if t < seconds / 2.0 { 0.1 } else { 0.8 };
                let click = if i % (sample_rate as usize / 4) == 0 { 1.0 } else { 0.0 };
                amp * (2.0 * std::f32::consts::PI * 330.0 * t).sin() + click
            })
            .collect()
    }

    #[test]
    fn test_analyze_produces_valid_metadata() {
        let mut params = AnalysisParams::for_fps(25).unwrap();
        params.section_amount = 2;
        params.gate_threshold = 0.1;
        let audio = AudioData {
            samples: test_signal(params.sample_rate, 4.0),
            sample_rate: params.sample_rate,
        };

        let meta = analyze(&audio, &params, &NoopObserver).unwrap();
        assert_eq!(meta.pulse_data.len(), 1 + audio.samples.len() / params.frame_duration);
        assert!(meta.pulse_data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(meta.pulse_data.iter().any(|&v| v == 1.0));
        assert!(meta.pulse_data.iter().all(|&v| v == 0.0 || v >= 0.1));
        assert_eq!(meta.song_sections.len(), 2);
        assert_eq!(meta.song_sections[0], 0.0);
        assert!(meta.song_sections[1] > 0.0);
    }

    #[test]
    fn test_analyze_rejects_rate_mismatch() {
        let params = AnalysisParams::for_fps(25).unwrap();
        let audio = AudioData {
            samples: vec![0.0; 1000],
            sample_rate: 44100,
        };
        assert!(matches!(
            analyze(&audio, &params, &NoopObserver),
            Err(PulseError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_silence_is_degenerate() {
        let params = AnalysisParams::for_fps(25).unwrap();
        let audio = AudioData {
            samples: vec![0.0; 12800],
            sample_rate: params.sample_rate,
        };
        assert!(matches!(
            analyze(&audio, &params, &NoopObserver),
            Err(PulseError::DegenerateSignal(_))
        ));
    }

    #[test]
    fn test_too_many_sections_for_frames() {
        let mut params = AnalysisParams::for_fps(25).unwrap();
        params.section_amount = 1000;
        let audio = AudioData {
            samples: test_signal(params.sample_rate, 1.0),
            sample_rate: params.sample_rate,
        };
        assert!(matches!(
            analyze(&audio, &params, &NoopObserver),
            Err(PulseError::InvalidSectionCount { requested: 1000, .. })
        ));
    }

    #[test]
    fn test_nan_sample_is_degenerate() {
        let params = AnalysisParams::for_fps(25).unwrap();
        let mut samples = test_signal(params.sample_rate, 2.0);
        samples[100] = f32::NAN;
        let audio = AudioData {
            samples,
            sample_rate: params.sample_rate,
        };
        assert!(matches!(
            analyze(&audio, &params, &NoopObserver),
            Err(PulseError::DegenerateSignal(_))
        ));
    }

    #[test]
    fn test_analyze_component_validates_params() {
        let samples = test_signal(12800, 1.0);

        let mut params = AnalysisParams::for_fps(25).unwrap();
        params.frame_duration = 0;
        assert!(matches!(
            analyze_component(&samples, Component::Percussive, &params, &NoopObserver),
            Err(PulseError::InvalidParameters(_))
        ));

        let mut params = AnalysisParams::for_fps(25).unwrap();
        params.gate_threshold = 5.0;
        assert!(matches!(
            analyze_component(&samples, Component::Harmonic, &params, &NoopObserver),
            Err(PulseError::InvalidParameters(_))
        ));
    }

    struct Recorder(RefCell<Vec<(Component, Stage)>>);

    impl StageObserver for Recorder {
        fn on_stage(&self, component: Component, stage: Stage, _output: StageOutput<'_>) {
            self.0.borrow_mut().push((component, stage));
        }
    }

    #[test]
    fn test_observer_sees_stages_in_order() {
        let mut params = AnalysisParams::for_fps(25).unwrap();
        params.pulse_perc = false;
        let audio = AudioData {
            samples: test_signal(params.sample_rate, 1.0),
            sample_rate: params.sample_rate,
        };
        let recorder = Recorder(RefCell::new(Vec::new()));
        analyze(&audio, &params, &recorder).unwrap();

        let seen = recorder.0.into_inner();
        let stages: Vec<Stage> = seen.iter().skip(2).map(|(_, s)| *s).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Spectrogram,
                Stage::BandScaling,
                Stage::Loudness,
                Stage::Normalized,
                Stage::Gated,
                Stage::Sections
            ]
        );
        assert!(seen.iter().skip(2).all(|(c, _)| *c == Component::Harmonic));
    }
}
