//! Perceptual (mel) remapping of linear-frequency spectrograms.
//!
//! Uses the Slaney formulation: linear below 1 kHz, logarithmic above, with
//! area-normalized triangular filters.

use rayon::prelude::*;

use super::features::SpectralFrames;

/// Number of mel bands produced by the default filterbank.
pub const N_MELS: usize = 128;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// One triangular filter, stored only over its non-zero span.
#[derive(Clone, Debug)]
struct MelFilter {
    start_bin: usize,
    weights: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
    num_fft_bins: usize,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Self {
        let num_fft_bins = n_fft / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;
        let fft_freqs: Vec<f64> = (0..num_fft_bins)
            .map(|i| i as f64 * nyquist / (num_fft_bins - 1).max(1) as f64)
            .collect();

        let mel_min = hz_to_mel(fmin as f64);
        let mel_max = hz_to_mel(fmax as f64);
        let mel_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
                let enorm = 2.0 / (hi - lo);
                let weights: Vec<f64> = fft_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - lo) / (center - lo);
                        let upper = (hi - f) / (hi - center);
                        lower.min(upper).max(0.0) * enorm
                    })
                    .collect();

                match weights.iter().position(|&w| w > 0.0) {
                    Some(first) => {
                        let last = weights.iter().rposition(|&w| w > 0.0).unwrap_or(first);
                        MelFilter {
                            start_bin: first,
                            weights: weights[first..=last].iter().map(|&w| w as f32).collect(),
                        }
                    }
                    // Narrow bands at low resolution can fall between FFT bins
                    None => MelFilter {
                        start_bin: 0,
                        weights: Vec::new(),
                    },
                }
            })
            .collect();

        Self {
            filters,
            num_fft_bins,
        }
    }

    /// Filterbank covering 0 Hz to Nyquist with [`N_MELS`] bands.
    pub fn standard(sample_rate: u32, n_fft: usize) -> Self {
        Self::new(sample_rate, n_fft, N_MELS, 0.0, sample_rate as f32 / 2.0)
    }

    pub fn num_bands(&self) -> usize {
        self.filters.len()
    }

    /// Map a linear-frequency magnitude matrix onto the mel bands.
    pub fn apply(&self, linear: &SpectralFrames) -> SpectralFrames {
        debug_assert_eq!(linear.bins(), self.num_fft_bins);
        let frames = linear.frames();

        let rows: Vec<Vec<f32>> = self
            .filters
            .par_iter()
            .map(|filter| {
                let mut row = vec![0.0f32; frames];
                for (offset, &w) in filter.weights.iter().enumerate() {
                    let source = linear.row(filter.start_bin + offset);
                    for (out, &value) in row.iter_mut().zip(source.iter()) {
                        *out += w * value;
                    }
                }
                row
            })
            .collect();

        SpectralFrames::from_rows(rows)
    }
}
