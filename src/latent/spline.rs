//! Interpolating B-splines over the integer abscissae `0..n`.
//!
//! The spline through `n` points is linear in the point values, so instead of
//! coefficients it exposes per-point weights for any sample position.

use crate::error::{PulseError, Result};

pub struct InterpolatingSpline {
    degree: usize,
    knots: Vec<f64>,
    /// Inverse of the collocation matrix, `inverse[j][i]` maps point `i` to coefficient `j`
    inverse: Vec<Vec<f64>>,
}

impl InterpolatingSpline {
    /// Spline of `degree` (2 or 3) through `n` points at `x = 0, 1, .., n-1`.
    pub fn new(n: usize, degree: usize) -> Result<Self> {
        if n < degree + 1 {
            return Err(PulseError::InvalidInterpolationRequest(format!(
                "degree {} spline needs at least {} points, got {}",
                degree,
                degree + 1,
                n
            )));
        }

        let knots = interpolation_knots(n, degree);
        let mut spline = Self {
            degree,
            knots,
            inverse: Vec::new(),
        };

        let mut collocation = vec![vec![0.0; n]; n];
        for (i, row) in collocation.iter_mut().enumerate() {
            let (first, basis) = spline.basis(i as f64);
            for (offset, value) in basis.into_iter().enumerate() {
                row[first + offset] = value;
            }
        }
        spline.inverse = invert(collocation)?;
        Ok(spline)
    }

    pub fn len(&self) -> usize {
        self.inverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inverse.is_empty()
    }

    /// Weight of every control point in the spline's value at `x`.
    pub fn weights(&self, x: f64) -> Vec<f64> {
        let n = self.len();
        let (first, basis) = self.basis(x);
        let mut weights = vec![0.0; n];
        for (offset, b) in basis.into_iter().enumerate() {
            let coefficient_row = &self.inverse[first + offset];
            for (w, &c) in weights.iter_mut().zip(coefficient_row.iter()) {
                *w += b * c;
            }
        }
        weights
    }

    /// Non-zero basis functions at `x`: index of the first one and their values.
    fn basis(&self, x: f64) -> (usize, Vec<f64>) {
        let k = self.degree;
        let t = &self.knots;
        let n = t.len() - k - 1;

        // Last span with t[span] <= x, limited to the valid range [k, n-1]
        let mut span = k;
        while span + 1 < n && t[span + 1] <= x {
            span += 1;
        }

        let mut values = vec![0.0; k + 1];
        let mut left = vec![0.0; k + 1];
        let mut right = vec![0.0; k + 1];
        values[0] = 1.0;
        for j in 1..=k {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let temp = values[r] / (right[r + 1] + left[j - r]);
                values[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            values[j] = saved;
        }
        (span - k, values)
    }
}

/// Knot vector with `degree + 1`-fold end knots.
///
/// Cubic splines use the not-a-knot interior (points 2..n-2). Quadratic
/// splines place interior knots at the midpoints between points, skipping the
/// first and last midpoint.
fn interpolation_knots(n: usize, degree: usize) -> Vec<f64> {
    let last = (n - 1) as f64;
    let interior: Vec<f64> = if degree % 2 == 0 {
        (1..n.saturating_sub(2)).map(|i| i as f64 + 0.5).collect()
    } else {
        let m = (degree - 1) / 2;
        (m + 1..n - m - 1).map(|i| i as f64).collect()
    };

    let mut knots = vec![0.0; degree + 1];
    knots.extend(interior);
    knots.extend(std::iter::repeat(last).take(degree + 1));
    knots
}

/// Gauss-Jordan inversion with partial pivoting.
fn invert(mut a: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>> {
    let n = a.len();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(PulseError::InvalidInterpolationRequest(
                "singular spline collocation matrix".into(),
            ));
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..n {
            a[col][j] /= p;
            inv[col][j] /= p;
        }

        let pivot_row = a[col].clone();
        let pivot_inv = inv[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * pivot_row[j];
                inv[row][j] -= factor * pivot_inv[j];
            }
        }
    }
    Ok(inv)
}
