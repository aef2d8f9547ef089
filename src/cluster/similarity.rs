//! Sampled cosine similarity between sparse series.

use crate::series::{SparseTimeSeries, Timestamp};

/// Stabilizing floor added to the denominator.
///
/// A series that is silent over the whole sample set scores ~0 instead of dividing
/// by zero.
pub const SIMILARITY_EPSILON: f64 = 1e-6;

/// Cosine similarity of `x` and `y` restricted to `samples`.
///
/// Missing points read as 0. The result is in `[0, 1)` for non-negative counts
/// (the epsilon keeps it strictly below 1). Symmetric in `x` and `y`.
pub fn similarity(x: &SparseTimeSeries, y: &SparseTimeSeries, samples: &[Timestamp]) -> f64 {
    let (mut sum_xx, mut sum_yy, mut sum_xy) = (0.0f64, 0.0f64, 0.0f64);
    for at in samples {
        let xi = x.get(at) as f64;
        let yi = y.get(at) as f64;
        sum_xx += xi * xi;
        sum_yy += yi * yi;
        sum_xy += xi * yi;
    }
    sum_xy / ((sum_xx * sum_yy).sqrt() + SIMILARITY_EPSILON)
}

/// Dense projection of `series` onto `samples`, in sample order.
pub fn project(series: &SparseTimeSeries, samples: &[Timestamp]) -> Vec<f32> {
    samples.iter().map(|at| series.get(at) as f32).collect()
}

/// Scale `v` to unit L2 norm. All-zero vectors are left as they are.
pub(crate) fn normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v {
            *x /= norm;
        }
    }
}
