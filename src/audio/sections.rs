//! Structural segmentation into song sections.
//!
//! Agglomerative clustering with Ward linkage, constrained so that only
//! temporally adjacent clusters may merge. Every cluster is therefore a
//! contiguous run of frames and the cluster starts are the section
//! boundaries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::features::SpectralFrames;
use crate::error::{PulseError, Result};

struct Cluster {
    start: usize,
    len: usize,
    sum: Vec<f64>,
    next: Option<usize>,
    prev: Option<usize>,
    version: u32,
    alive: bool,
}

impl Cluster {
    /// Increase in within-cluster variance if `self` and `other` merged.
    fn ward_cost(&self, other: &Cluster) -> f64 {
        let (na, nb) = (self.len as f64, other.len as f64);
        let dist: f64 = self
            .sum
            .iter()
            .zip(other.sum.iter())
            .map(|(a, b)| {
                let d = a / na - b / nb;
                d * d
            })
            .sum();
        na * nb / (na + nb) * dist
    }
}

/// Merge candidate between cluster `left` and its right neighbour.
struct Candidate {
    cost: f64,
    left: usize,
    left_version: u32,
    right_version: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // BinaryHeap is a max-heap: cheapest merge first, earlier pair on ties
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.left.cmp(&self.left))
    }
}

/// Segment `frames` into `k` contiguous sections.
///
/// Returns the first frame index of every section, in increasing order.
pub fn segment_frames(frames: &SpectralFrames, k: usize) -> Result<Vec<usize>> {
    let n = frames.frames();
    if k == 0 || k > n {
        return Err(PulseError::InvalidSectionCount {
            requested: k,
            available: n,
        });
    }

    let mut clusters: Vec<Cluster> = (0..n)
        .map(|t| Cluster {
            start: t,
            len: 1,
            sum: frames.column(t).map(f64::from).collect(),
            next: (t + 1 < n).then_some(t + 1),
            prev: t.checked_sub(1),
            version: 0,
            alive: true,
        })
        .collect();

    let mut heap: BinaryHeap<Candidate> = (0..n.saturating_sub(1))
        .map(|t| Candidate {
            cost: clusters[t].ward_cost(&clusters[t + 1]),
            left: t,
            left_version: 0,
            right_version: 0,
        })
        .collect();

    let mut remaining = n;
    while remaining > k {
        let Some(candidate) = heap.pop() else {
            break;
        };
        let left = candidate.left;
        let Some(right) = clusters[left].next else {
            continue;
        };
        if !clusters[left].alive
            || clusters[left].version != candidate.left_version
            || clusters[right].version != candidate.right_version
        {
            continue;
        }

        // Absorb `right` into `left`
        let (right_len, right_next) = (clusters[right].len, clusters[right].next);
        let right_sum = std::mem::take(&mut clusters[right].sum);
        clusters[right].alive = false;

        let merged = &mut clusters[left];
        merged.len += right_len;
        for (acc, v) in merged.sum.iter_mut().zip(right_sum) {
            *acc += v;
        }
        merged.next = right_next;
        merged.version += 1;
        if let Some(next) = right_next {
            clusters[next].prev = Some(left);
        }
        remaining -= 1;

        if let Some(prev) = clusters[left].prev {
            heap.push(Candidate {
                cost: clusters[prev].ward_cost(&clusters[left]),
                left: prev,
                left_version: clusters[prev].version,
                right_version: clusters[left].version,
            });
        }
        if let Some(next) = clusters[left].next {
            heap.push(Candidate {
                cost: clusters[left].ward_cost(&clusters[next]),
                left,
                left_version: clusters[left].version,
                right_version: clusters[next].version,
            });
        }
    }

    let mut starts = Vec::with_capacity(k);
    let mut cursor = Some(0);
    while let Some(idx) = cursor {
        starts.push(clusters[idx].start);
        cursor = clusters[idx].next;
    }
    Ok(starts)
}

/// Section start times in seconds for a matrix analysed with hop `hop`.
pub fn detect_sections(
    frames: &SpectralFrames,
    k: usize,
    hop: usize,
    sample_rate: u32,
) -> Result<Vec<f32>> {
    let starts = segment_frames(frames, k)?;
    let times: Vec<f32> = starts
        .iter()
        .map(|&frame| (frame as f64 * hop as f64 / sample_rate as f64) as f32)
        .collect();
    log::info!("Section beginnings: {:?}", times);
    Ok(times)
}
