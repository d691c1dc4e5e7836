//! Summary statistics consumed by palette scaling.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Extremes and percentiles of a data population, split by sign
///
/// Zero belongs to neither side. Queries on an empty side return 0.
pub trait ScalarStatistics {
    /// Smallest (most negative) negative value
    fn most_negative_value(&self) -> f32;
    /// Negative value closest to zero
    fn least_negative_value(&self) -> f32;
    /// Positive value closest to zero
    fn least_positive_value(&self) -> f32;
    fn most_positive_value(&self) -> f32;
    /// Percentile (0-100) of the positive values
    fn positive_percentile(&self, percent: f32) -> f32;
    /// Percentile (0-100) of the negative values ordered by magnitude;
    /// high percentiles are far from zero
    fn negative_percentile(&self, percent: f32) -> f32;
}

/// Exact statistics over a copy of the data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStatistics {
    /// Ascending
    positives: Vec<f32>,
    /// Descending, i.e. ascending magnitude
    negatives: Vec<f32>,
}

impl DescriptiveStatistics {
    /// Non-finite values are ignored
    pub fn from_values(values: &[f32]) -> Self {
        let (positives, negatives): (Vec<f32>, Vec<f32>) = values
            .iter()
            .copied()
            .filter(|v| v.is_finite() && *v != 0.0)
            .partition(|v| *v > 0.0);
        Self {
            positives: positives.into_iter().sorted_by(f32::total_cmp).collect(),
            negatives: negatives
                .into_iter()
                .sorted_by(|a, b| b.total_cmp(a))
                .collect(),
        }
    }

    pub fn positive_count(&self) -> usize {
        self.positives.len()
    }

    pub fn negative_count(&self) -> usize {
        self.negatives.len()
    }
}

/// Linear interpolation between closest ranks
fn percentile(sorted: &[f32], percent: f32) -> f32 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (percent.clamp(0.0, 100.0) / 100.0) * (n - 1) as f32;
            let low = rank.floor() as usize;
            let high = (low + 1).min(n - 1);
            let fraction = rank - low as f32;
            sorted[low] + (sorted[high] - sorted[low]) * fraction
        }
    }
}

impl ScalarStatistics for DescriptiveStatistics {
    fn most_negative_value(&self) -> f32 {
        self.negatives.last().copied().unwrap_or(0.0)
    }

    fn least_negative_value(&self) -> f32 {
        self.negatives.first().copied().unwrap_or(0.0)
    }

    fn least_positive_value(&self) -> f32 {
        self.positives.first().copied().unwrap_or(0.0)
    }

    fn most_positive_value(&self) -> f32 {
        self.positives.last().copied().unwrap_or(0.0)
    }

    fn positive_percentile(&self, percent: f32) -> f32 {
        percentile(&self.positives, percent)
    }

    fn negative_percentile(&self, percent: f32) -> f32 {
        percentile(&self.negatives, percent)
    }
}
