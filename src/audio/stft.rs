use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::features::SpectralFrames;

/// FFT size used for every short-time transform in the pipeline.
pub const N_FFT: usize = 2048;

/// Complex spectrum of one frame, `n_fft / 2 + 1` bins.
pub type SpectrumFrame = Vec<Complex<f32>>;

/// Centered short-time Fourier transform.
///
/// The signal is zero-padded by `n_fft / 2` on both sides so frame `t` is
/// centered on sample `t * hop`, giving `1 + len / hop` frames.
pub fn stft(samples: &[f32], n_fft: usize, hop: usize) -> Vec<SpectrumFrame> {
    let pad = n_fft / 2;
    let num_frames = 1 + samples.len() / hop;
    let num_bins = n_fft / 2 + 1;
    let window = hann_window(n_fft);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    (0..num_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let origin = (frame_idx * hop) as isize - pad as isize;
            let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                .map(|i| {
                    let pos = origin + i as isize;
                    let sample = if pos >= 0 && (pos as usize) < samples.len() {
                        samples[pos as usize]
                    } else {
                        0.0
                    };
                    Complex::new(sample * window[i], 0.0)
                })
                .collect();
            fft.process(&mut buffer);
            buffer.truncate(num_bins);
            buffer
        })
        .collect()
}

/// Magnitude of [`stft`], transposed to bins x frames.
pub fn stft_magnitude(samples: &[f32], n_fft: usize, hop: usize) -> SpectralFrames {
    let spectrum = stft(samples, n_fft, hop);
    magnitude(&spectrum, n_fft / 2 + 1)
}

pub fn magnitude(spectrum: &[SpectrumFrame], num_bins: usize) -> SpectralFrames {
    let num_frames = spectrum.len();
    let mut out = SpectralFrames::zeros(num_bins, num_frames);
    for bin in 0..num_bins {
        let row = out.row_mut(bin);
        for (frame_idx, frame) in spectrum.iter().enumerate() {
            row[frame_idx] = frame[bin].norm();
        }
    }
    out
}

/// Inverse of [`stft`] by windowed overlap-add, trimmed to `length` samples.
pub fn istft(spectrum: &[SpectrumFrame], n_fft: usize, hop: usize, length: usize) -> Vec<f32> {
    let pad = n_fft / 2;
    let window = hann_window(n_fft);
    let padded_len = n_fft + hop * spectrum.len().saturating_sub(1);

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let scale = 1.0 / n_fft as f32;

    let frames: Vec<Vec<f32>> = spectrum
        .par_iter()
        .map(|half| {
            // Rebuild the full spectrum from conjugate symmetry
            let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
            for (i, &c) in half.iter().enumerate().take(n_fft / 2 + 1) {
                buffer[i] = c;
                if i > 0 && i < n_fft - i {
                    buffer[n_fft - i] = c.conj();
                }
            }
            ifft.process(&mut buffer);
            buffer
                .iter()
                .zip(window.iter())
                .map(|(c, w)| c.re * scale * w)
                .collect()
        })
        .collect();

    let mut signal = vec![0.0f32; padded_len];
    let mut window_sum = vec![0.0f32; padded_len];
    for (frame_idx, frame) in frames.iter().enumerate() {
        let offset = frame_idx * hop;
        for (i, &value) in frame.iter().enumerate() {
            signal[offset + i] += value;
            window_sum[offset + i] += window[i] * window[i];
        }
    }

    for (value, &norm) in signal.iter_mut().zip(window_sum.iter()) {
        if norm > f32::MIN_POSITIVE {
            *value /= norm;
        }
    }

    let mut out: Vec<f32> = signal.into_iter().skip(pad).take(length).collect();
    out.resize(length, 0.0);
    out
}

/// Periodic Hann window.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}
