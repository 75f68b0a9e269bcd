use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Magnitude matrix laid out as frequency bins x time frames.
///
/// Stored row-major by bin so band scaling touches contiguous memory.
/// All entries are non-negative.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpectralFrames {
    bins: usize,
    frames: usize,
    data: Vec<f32>,
}

impl SpectralFrames {
    pub fn zeros(bins: usize, frames: usize) -> Self {
        Self {
            bins,
            frames,
            data: vec![0.0; bins * frames],
        }
    }

    /// Build from one `Vec` per frequency bin. All rows must share a length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let bins = rows.len();
        let frames = rows.first().map_or(0, |r| r.len());
        debug_assert!(rows.iter().all(|r| r.len() == frames));
        Self {
            bins,
            frames,
            data: rows.into_iter().flatten().collect(),
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn get(&self, bin: usize, frame: usize) -> f32 {
        self.data[bin * self.frames + frame]
    }

    pub fn row(&self, bin: usize) -> &[f32] {
        &self.data[bin * self.frames..(bin + 1) * self.frames]
    }

    pub fn row_mut(&mut self, bin: usize) -> &mut [f32] {
        &mut self.data[bin * self.frames..(bin + 1) * self.frames]
    }

    /// Iterate over the values of one time frame, lowest bin first.
    pub fn column(&self, frame: usize) -> impl Iterator<Item = f32> + '_ {
        (0..self.bins).map(move |bin| self.get(bin, frame))
    }

    /// Multiply every value in the given bin range by `factor`.
    /// An empty or reversed range is a no-op.
    pub fn scale_rows(&mut self, bins: Range<usize>, factor: f32) {
        let end = bins.end.min(self.bins);
        if bins.start >= end {
            return;
        }
        for value in &mut self.data[bins.start * self.frames..end * self.frames] {
            *value *= factor;
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// The two artifacts downstream stages consume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    /// Gated, normalized loudness in [0, 1], one value per analysis frame
    pub pulse_data: Vec<f32>,
    /// Section start times in seconds, first is always 0.0
    pub song_sections: Vec<f32>,
}
