//! Harmonic/percussive source separation by median filtering.
//!
//! Tonal energy is smooth along time, transient energy is smooth along
//! frequency. Median-filtering the magnitude spectrogram in each direction
//! gives two enhanced spectrograms, which become soft masks over the complex
//! spectrum before inverting back to the time domain.

use rayon::prelude::*;

use super::stft::{istft, stft, SpectrumFrame, N_FFT};

/// Median filter length in frames (harmonic) and bins (percussive).
pub const KERNEL_SIZE: usize = 31;

/// Hop size of the separation transform, independent of the analysis hop.
pub const HPSS_HOP: usize = 512;

/// Split `samples` into (harmonic, percussive) components of equal length.
///
/// The masks sum to one in every time-frequency cell, so adding the two
/// outputs reconstructs the input up to transform round-off.
pub fn hpss(samples: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let spectrum = stft(samples, N_FFT, HPSS_HOP);
    let num_frames = spectrum.len();
    let num_bins = N_FFT / 2 + 1;

    // frames x bins
    let magnitude: Vec<Vec<f32>> = spectrum
        .iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect();

    // Harmonic: median along time, one bin at a time
    let harmonic_by_bin: Vec<Vec<f32>> = (0..num_bins)
        .into_par_iter()
        .map(|bin| {
            let line: Vec<f32> = magnitude.iter().map(|frame| frame[bin]).collect();
            median_filter(&line, KERNEL_SIZE)
        })
        .collect();

    // Percussive: median along frequency, one frame at a time
    let percussive: Vec<Vec<f32>> = magnitude
        .par_iter()
        .map(|frame| median_filter(frame, KERNEL_SIZE))
        .collect();

    let mut harmonic_spec: Vec<SpectrumFrame> = Vec::with_capacity(num_frames);
    let mut percussive_spec: Vec<SpectrumFrame> = Vec::with_capacity(num_frames);
    for (t, frame) in spectrum.iter().enumerate() {
        let mut h_frame = Vec::with_capacity(num_bins);
        let mut p_frame = Vec::with_capacity(num_bins);
        for (f, &c) in frame.iter().enumerate() {
            let (h_mask, p_mask) = soft_masks(harmonic_by_bin[f][t], percussive[t][f]);
            h_frame.push(c * h_mask);
            p_frame.push(c * p_mask);
        }
        harmonic_spec.push(h_frame);
        percussive_spec.push(p_frame);
    }

    let harmonic = istft(&harmonic_spec, N_FFT, HPSS_HOP, samples.len());
    let percussive = istft(&percussive_spec, N_FFT, HPSS_HOP, samples.len());

    log::debug!(
        "HPSS: {} frames x {} bins, kernel {}",
        num_frames,
        num_bins,
        KERNEL_SIZE
    );

    (harmonic, percussive)
}

/// Wiener-style masks with power 2. Cells where both enhanced spectrograms
/// are zero split evenly.
fn soft_masks(harmonic: f32, percussive: f32) -> (f32, f32) {
    let reference = harmonic.max(percussive);
    if reference <= f32::MIN_POSITIVE {
        return (0.5, 0.5);
    }
    let h = (harmonic / reference).powi(2);
    let p = (percussive / reference).powi(2);
    let total = h + p;
    (h / total, p / total)
}

/// Sliding median with symmetric (edge-repeating) reflection at the borders.
pub fn median_filter(line: &[f32], size: usize) -> Vec<f32> {
    let n = line.len();
    if n == 0 {
        return Vec::new();
    }
    let half = (size / 2) as isize;
    let mut window = Vec::with_capacity(size);

    (0..n)
        .map(|i| {
            window.clear();
            for offset in -half..=half {
                window.push(line[reflect(i as isize + offset, n)]);
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            *median
        })
        .collect()
}

fn reflect(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let folded = index.rem_euclid(period);
    if folded < len as isize {
        folded as usize
    } else {
        (period - 1 - folded) as usize
    }
}
