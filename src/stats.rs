//! Simulation outcome statistics

use crate::error::CalcError;
use serde::{Deserialize, Serialize};

/// Histograms never have more buckets than this; narrower widths are widened
pub const MAX_HISTOGRAM_BINS: usize = 1000;

/// One histogram bucket: `[start, start + width)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub count: usize,
}

/// p10 / p50 / p90 of a sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

/// Summary of a distribution of simulated outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub samples: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
    pub bin_width: f64,
    pub histogram: Vec<HistogramBin>,
}

/// Value at fraction `p` of an ascending slice (floor of `p * n`)
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Bin widths must be positive and finite
pub fn check_bin_width(bin_width: f64) -> Result<(), CalcError> {
    if bin_width > 0.0 && bin_width.is_finite() {
        Ok(())
    } else {
        Err(CalcError::InvalidBinWidth { width: bin_width })
    }
}

/// `bin_width`, widened when the range would need more than
/// [`MAX_HISTOGRAM_BINS`] buckets
pub fn effective_bin_width(min: f64, max: f64, bin_width: f64) -> f64 {
    let span = max - min;
    // one bucket of slack for the anchor moving below `min`
    let floor = span / (MAX_HISTOGRAM_BINS - 2) as f64;
    if floor.is_finite() && floor > bin_width {
        floor
    } else {
        bin_width
    }
}

/// Fixed-width histogram anchored at a multiple of `bin_width`
pub fn histogram(sorted: &[f64], bin_width: f64) -> Vec<HistogramBin> {
    let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    if check_bin_width(bin_width).is_err() {
        return vec![HistogramBin { start: first, count: sorted.len() }];
    }
    let bin_width = effective_bin_width(first, last, bin_width);

    let origin = (first / bin_width).floor() * bin_width;
    let bins = (((last - origin) / bin_width).floor() as usize + 1).min(MAX_HISTOGRAM_BINS);
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin { start: origin + i as f64 * bin_width, count: 0 })
        .collect();
    for &v in sorted {
        let idx = (((v - origin) / bin_width).floor() as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

impl Distribution {
    /// Summarise a sample; non-finite values are ignored
    pub fn from_samples(samples: &[f64], bin_width: f64) -> Self {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self { bin_width, ..Self::default() };
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            samples: sorted.len(),
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            percentiles: Percentiles {
                p10: percentile(&sorted, 0.10),
                p50: percentile(&sorted, 0.50),
                p90: percentile(&sorted, 0.90),
            },
            bin_width: effective_bin_width(sorted[0], sorted[sorted.len() - 1], bin_width),
            histogram: histogram(&sorted, bin_width),
        }
    }
}

/// Mean of a sample, 0 when empty
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
