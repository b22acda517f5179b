// Robust statistics for baseline comparison
//
// This module wraps aprender's descriptive statistics and trueno's vector
// primitives to provide the median/MAD estimators the analyzer and the
// aggregator share. Median and MAD are robust to single-sample outliers from
// system jitter, unlike mean/stddev.

use anyhow::Result;
use aprender::stats::DescriptiveStats;
use trueno::Vector;

/// Scale factor making the modified z-score comparable to a standard z-score
/// for normally distributed data (0.6745 ~= quantile(0.75) of the standard
/// normal; MAD * 1.4826 estimates sigma).
pub const MAD_NORMAL_CONSISTENCY: f32 = 0.6745;

/// Calculate the median of a non-empty slice
///
/// Uses aprender's quantile(0.5) which implements the R-7 method with
/// QuickSelect for O(n) performance. Deterministic for a given multiset of
/// values regardless of input order.
pub fn median(values: &[f32]) -> Result<f32> {
    if values.is_empty() {
        anyhow::bail!("Cannot take the median of an empty slice");
    }
    let vector = Vector::from_slice(values);
    let stats = DescriptiveStats::new(&vector);
    stats
        .quantile(0.5)
        .map_err(|e| anyhow::anyhow!("Failed to compute median: {}", e))
}

/// Calculate the median absolute deviation of a non-empty slice
///
/// MAD = median(|x_i - median(x)|). Zero for a perfectly stable series; the
/// caller applies an epsilon floor before dividing.
pub fn mad(values: &[f32]) -> Result<f32> {
    let center = median(values)?;
    let deviations: Vec<f32> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Compute modified z-scores for a sample
///
/// The unmodified z-score is `(x_i - mean)/stddev`; the modified variant uses
/// `0.6745 * (x_i - median)/MAD`, which a single extreme sample cannot drag.
/// A zero MAD is floored to machine epsilon so identical-but-one series still
/// score their outlier.
pub fn modified_zscores(values: &[f32]) -> Result<Vec<f32>> {
    let center = median(values)?;
    let spread = mad(values)?.max(f32::EPSILON);

    Ok(values
        .iter()
        .map(|v| MAD_NORMAL_CONSISTENCY * (v - center) / spread)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[1.0, 3.0, 5.0, 7.0, 9.0]).unwrap(), 5.0);
    }

    #[test]
    fn test_median_even_length() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_median_empty() {
        assert!(median(&[]).is_err());
    }

    #[test]
    fn test_median_order_independent() {
        let sorted = median(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let shuffled = median(&[4.0, 1.0, 5.0, 3.0, 2.0]).unwrap();
        assert_eq!(sorted, shuffled);
    }

    #[test]
    fn test_mad_basic() {
        // median = 100, |deviations| = [2, 0, 2] -> MAD = 2
        let spread = mad(&[98.0, 100.0, 102.0]).unwrap();
        assert!((spread - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mad_constant_series_is_zero() {
        assert_eq!(mad(&[5.0, 5.0, 5.0, 5.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_mad_single_outlier_bounded() {
        // One wild sample barely moves the MAD
        let stable = mad(&[100.0, 101.0, 100.0, 102.0, 100.0]).unwrap();
        let spiked = mad(&[100.0, 101.0, 100.0, 102.0, 1000.0]).unwrap();
        assert!((stable - spiked).abs() < 2.0);
    }

    #[test]
    fn test_modified_zscores_flag_outlier() {
        let scores = modified_zscores(&[10.0, 11.0, 10.0, 12.0, 500.0]).unwrap();
        let outlier = scores[4].abs();
        assert!(outlier > 14.826, "outlier score {outlier} too small");
        for score in &scores[..4] {
            assert!(score.abs() < 14.826);
        }
    }

    #[test]
    fn test_modified_zscores_stable_series() {
        let scores = modified_zscores(&[10.0, 10.0, 10.0]).unwrap();
        for score in scores {
            assert_eq!(score, 0.0);
        }
    }
}
