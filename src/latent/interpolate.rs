use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::spline::InterpolatingSpline;
use crate::error::{PulseError, Result};

/// Curve family fitted through each latent dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationKind {
    Nearest,
    Linear,
    Quadratic,
    Cubic,
}

impl InterpolationKind {
    /// The family actually used for `anchors` control points.
    ///
    /// `None` means no curve can be fitted and the single anchor is repeated.
    /// Two anchors always interpolate linearly; three anchors cap the
    /// spline families at quadratic.
    pub fn effective(self, anchors: usize) -> Option<InterpolationKind> {
        match (anchors, self) {
            (0 | 1, _) => None,
            (2, _) => Some(InterpolationKind::Linear),
            (3, InterpolationKind::Cubic) => Some(InterpolationKind::Quadratic),
            (_, kind) => Some(kind),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterpolationKind::Nearest => "nearest",
            InterpolationKind::Linear => "linear",
            InterpolationKind::Quadratic => "quadratic",
            InterpolationKind::Cubic => "cubic",
        }
    }
}

impl fmt::Display for InterpolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationKind {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(InterpolationKind::Nearest),
            "linear" => Ok(InterpolationKind::Linear),
            "quadratic" => Ok(InterpolationKind::Quadratic),
            "cubic" => Ok(InterpolationKind::Cubic),
            other => Err(PulseError::InvalidInterpolationRequest(format!(
                "unknown interpolation type '{}'",
                other
            ))),
        }
    }
}

/// Interpolate `frames` vectors along the path through `anchors`.
///
/// Output vector `K` sits at control-point position `K * (N-1) / (F-1)`, so
/// the first and last outputs equal the first and last anchors. A single
/// output frame is the first anchor.
pub fn interpolate_vectors(
    anchors: &[Vec<f32>],
    frames: usize,
    kind: InterpolationKind,
) -> Result<Vec<Vec<f32>>> {
    if frames == 0 {
        return Err(PulseError::InvalidInterpolationRequest(
            "number of interpolations must be positive".into(),
        ));
    }
    let first = anchors.first().ok_or_else(|| {
        PulseError::InvalidInterpolationRequest("at least one anchor vector is required".into())
    })?;
    let dim = first.len();
    if dim == 0 {
        return Err(PulseError::InvalidInterpolationRequest(
            "anchor vectors must not be empty".into(),
        ));
    }
    if let Some((i, v)) = anchors.iter().enumerate().find(|(_, v)| v.len() != dim) {
        return Err(PulseError::InvalidInterpolationRequest(format!(
            "anchor {} has dimension {}, expected {}",
            i,
            v.len(),
            dim
        )));
    }

    let n = anchors.len();
    let Some(effective) = kind.effective(n) else {
        log::debug!("Single anchor, repeating it for {} frames", frames);
        return Ok(vec![first.clone(); frames]);
    };
    if effective != kind {
        log::debug!("{} anchors: {} interpolation falls back to {}", n, kind, effective);
    }

    let positions = sample_positions(n, frames);
    let weights = weight_matrix(effective, n, &positions)?;

    let path = weights
        .par_iter()
        .map(|row| {
            let mut out = vec![0.0f64; dim];
            for (&w, anchor) in row.iter().zip(anchors) {
                if w == 0.0 {
                    continue;
                }
                for (acc, &value) in out.iter_mut().zip(anchor) {
                    *acc += w * value as f64;
                }
            }
            out.into_iter().map(|v| v as f32).collect()
        })
        .collect();

    Ok(path)
}

/// Evenly spaced positions over `[0, n-1]`, both ends included.
fn sample_positions(n: usize, frames: usize) -> Vec<f64> {
    if frames == 1 {
        return vec![0.0];
    }
    let last = (n - 1) as f64;
    let step = last / (frames - 1) as f64;
    (0..frames)
        .map(|k| if k == frames - 1 { last } else { k as f64 * step })
        .collect()
}

/// Row `K` holds the weight of every anchor in output frame `K`.
fn weight_matrix(kind: InterpolationKind, n: usize, positions: &[f64]) -> Result<Vec<Vec<f64>>> {
    let rows = match kind {
        InterpolationKind::Nearest => positions
            .iter()
            .map(|&x| {
                // Exact halfway points resolve to the lower anchor
                let idx = ((x - 0.5).ceil().max(0.0) as usize).min(n - 1);
                one_hot(n, idx)
            })
            .collect(),
        InterpolationKind::Linear => positions
            .iter()
            .map(|&x| {
                let lo = (x.floor().max(0.0) as usize).min(n - 2);
                let t = x - lo as f64;
                let mut row = vec![0.0; n];
                row[lo] = 1.0 - t;
                row[lo + 1] = t;
                row
            })
            .collect(),
        InterpolationKind::Quadratic | InterpolationKind::Cubic => {
            let degree = if kind == InterpolationKind::Quadratic { 2 } else { 3 };
            let spline = InterpolatingSpline::new(n, degree)?;
            positions.iter().map(|&x| spline.weights(x)).collect()
        }
    };
    Ok(rows)
}

fn one_hot(n: usize, idx: usize) -> Vec<f64> {
    let mut row = vec![0.0; n];
    row[idx] = 1.0;
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InterpolationKind; 4] = [
        InterpolationKind::Nearest,
        InterpolationKind::Linear,
        InterpolationKind::Quadratic,
        InterpolationKind::Cubic,
    ];

    fn anchors(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| (0..dim).map(|d| ((i * 31 + d * 17) % 11) as f32 - 5.0).collect())
            .collect()
    }

    fn assert_close(a: &[Vec<f32>], b: &[Vec<f32>], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (va, vb) in a.iter().zip(b) {
            for (x, y) in va.iter().zip(vb) {
                assert!((x - y).abs() <= tol, "{} vs {}", x, y);
            }
        }
    }

    #[test]
    fn test_degradation_table() {
        use InterpolationKind::*;
        for kind in ALL {
            assert_eq!(kind.effective(1), None);
            assert_eq!(kind.effective(2), Some(Linear));
        }
        assert_eq!(Nearest.effective(3), Some(Nearest));
        assert_eq!(Linear.effective(3), Some(Linear));
        assert_eq!(Quadratic.effective(3), Some(Quadratic));
        assert_eq!(Cubic.effective(3), Some(Quadratic));
        for kind in ALL {
            assert_eq!(kind.effective(4), Some(kind));
        }
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Cubic".parse::<InterpolationKind>().unwrap(), InterpolationKind::Cubic);
        assert_eq!(" nearest ".parse::<InterpolationKind>().unwrap(), InterpolationKind::Nearest);
        assert!("bicubic".parse::<InterpolationKind>().is_err());
    }

    #[test]
    fn test_linear_scenario() {
        let anchors = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![4.0, 4.0]];
        let path = interpolate_vectors(&anchors, 5, InterpolationKind::Linear).unwrap();
        let first: Vec<f32> = path.iter().map(|v| v[0]).collect();
        let expected = [0.0, 0.5, 1.0, 2.5, 4.0];
        for (got, want) in first.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_single_anchor_is_repeated() {
        let anchor = vec![vec![0.25f32; 512]];
        for kind in ALL {
            let path = interpolate_vectors(&anchor, 5, kind).unwrap();
            assert_eq!(path.len(), 5);
            assert!(path.iter().all(|v| *v == anchor[0]));
        }
    }

    #[test]
    fn test_matching_frame_count_reproduces_anchors() {
        for n in 2..7 {
            let anchors = anchors(n, 8);
            for kind in ALL {
                let path = interpolate_vectors(&anchors, n, kind).unwrap();
                assert_close(&path, &anchors, 1e-4);
            }
        }
    }

    #[test]
    fn test_cubic_with_three_anchors_equals_quadratic() {
        let anchors = anchors(3, 16);
        let cubic = interpolate_vectors(&anchors, 40, InterpolationKind::Cubic).unwrap();
        let quadratic = interpolate_vectors(&anchors, 40, InterpolationKind::Quadratic).unwrap();
        assert_eq!(cubic, quadratic);
    }

    #[test]
    fn test_endpoints_always_hit() {
        let anchors = anchors(6, 4);
        for kind in ALL {
            let path = interpolate_vectors(&anchors, 23, kind).unwrap();
            assert_close(&path[..1], &anchors[..1], 1e-4);
            assert_close(&path[22..], &anchors[5..], 1e-4);
        }
    }

    #[test]
    fn test_single_frame_is_first_anchor() {
        let anchors = anchors(4, 3);
        for kind in ALL {
            let path = interpolate_vectors(&anchors, 1, kind).unwrap();
            assert_close(&path, &anchors[..1], 1e-5);
        }
    }

    #[test]
    fn test_nearest_rounds_halfway_down() {
        let anchors = vec![vec![0.0], vec![10.0], vec![20.0]];
        // positions 0, 0.5, 1, 1.5, 2
        let path = interpolate_vectors(&anchors, 5, InterpolationKind::Nearest).unwrap();
        let values: Vec<f32> = path.iter().map(|v| v[0]).collect();
        assert_eq!(values, vec![0.0, 0.0, 10.0, 10.0, 20.0]);
    }

    #[test]
    fn test_cubic_follows_smooth_curve() {
        let anchors: Vec<Vec<f32>> = (0..5).map(|i| vec![(i * i) as f32]).collect();
        let path = interpolate_vectors(&anchors, 9, InterpolationKind::Cubic).unwrap();
        for (k, v) in path.iter().enumerate() {
            let x = k as f32 * 0.5;
            assert!((v[0] - x * x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_invalid_requests() {
        let good = anchors(3, 4);
        assert!(matches!(
            interpolate_vectors(&good, 0, InterpolationKind::Linear),
            Err(PulseError::InvalidInterpolationRequest(_))
        ));
        assert!(matches!(
            interpolate_vectors(&[], 5, InterpolationKind::Linear),
            Err(PulseError::InvalidInterpolationRequest(_))
        ));
        let ragged = vec![vec![0.0; 4], vec![0.0; 3]];
        assert!(matches!(
            interpolate_vectors(&ragged, 5, InterpolationKind::Cubic),
            Err(PulseError::InvalidInterpolationRequest(_))
        ));
    }
}
