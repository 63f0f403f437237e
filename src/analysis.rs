// src/analysis.rs

//! Range and variance statistics for one numeric path.
//!
//! The mapping planner ranks paths by how "interesting" their value
//! distribution is and picks a scaling curve that counteracts the
//! distribution's shape: near-constant data gets an expanding curve, wildly
//! spread data gets a compressing one.

use crate::mapping::Curve;

/// Summary statistics over the numeric values a path resolves to.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub unique_ratio: f64,
    /// `cv * unique_ratio * log10(range + 1)`, the planner's ranking key.
    pub interest_score: f64,
}

impl PathStats {
    /// Computes statistics over the given values. Non-finite values are
    /// filtered out first; with nothing left, every field is zero and the
    /// recommendation is neutral.
    pub fn from_values(values: &[f64]) -> PathStats {
        let mut clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.is_empty() {
            return PathStats::default();
        }

        let count = clean.len();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in &clean {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / count as f64;
        let variance = clean.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let std_dev = variance.sqrt();
        let coefficient_of_variation = if mean.abs() > 0.0 {
            std_dev / mean.abs()
        } else {
            0.0
        };

        clean.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        clean.dedup();
        let unique_ratio = clean.len() as f64 / count as f64;

        let range = max - min;
        let interest_score = coefficient_of_variation * unique_ratio * (range + 1.0).log10();

        PathStats {
            count,
            min,
            max,
            range,
            mean,
            std_dev,
            coefficient_of_variation,
            unique_ratio,
            interest_score,
        }
    }

    /// Picks a curve from the coefficient of variation alone: tiny spreads
    /// get amplified, huge spreads get compressed.
    pub fn recommended_curve(&self) -> Curve {
        if self.count == 0 {
            return Curve::Linear;
        }
        let cv = self.coefficient_of_variation;
        if cv < 0.01 {
            Curve::Cubic
        } else if cv < 0.1 {
            Curve::Exponential
        } else if cv > 5.0 {
            Curve::Logarithmic
        } else {
            Curve::Linear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_basic_statistics() {
        let stats = PathStats::from_values(&[4.5, 3.2, 5.1]);
        assert_eq!(stats.count, 3);
        assert!((stats.min - 3.2).abs() < 1e-12);
        assert!((stats.max - 5.1).abs() < 1e-12);
        assert!((stats.range - 1.9).abs() < 1e-12);
        assert!((stats.mean - 4.266_666_666_666_667).abs() < 1e-9);
        assert!((stats.unique_ratio - 1.0).abs() < 1e-12);
        // Population std-dev of {4.5, 3.2, 5.1}.
        assert!((stats.std_dev - 0.793_025f64).abs() < 1e-5);
    }

    #[test]
    fn non_finite_values_are_filtered() {
        let stats = PathStats::from_values(&[1.0, f64::NAN, 2.0, f64::INFINITY]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, 2.0);
    }

    #[test]
    fn empty_input_is_neutral() {
        let stats = PathStats::from_values(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.interest_score, 0.0);
        assert_eq!(stats.recommended_curve(), Curve::Linear);
    }

    #[test]
    fn curve_recommendation_thresholds() {
        // CV below 0.01: cubic.
        let tight = PathStats::from_values(&[1000.0, 1000.1, 1000.2]);
        assert!(tight.coefficient_of_variation < 0.01);
        assert_eq!(tight.recommended_curve(), Curve::Cubic);

        // CV below 0.1: exponential.
        let narrow = PathStats::from_values(&[100.0, 104.0, 108.0]);
        assert!(narrow.coefficient_of_variation < 0.1);
        assert_eq!(narrow.recommended_curve(), Curve::Exponential);

        // CV above 5: logarithmic.
        let wild = PathStats::from_values(&[-100.0, 1.0, 105.0]);
        assert!(wild.coefficient_of_variation > 5.0);
        assert_eq!(wild.recommended_curve(), Curve::Logarithmic);

        // Moderate spread: linear.
        let moderate = PathStats::from_values(&[1.0, 2.0, 3.0]);
        assert_eq!(moderate.recommended_curve(), Curve::Linear);
    }

    #[test]
    fn repeated_values_shrink_unique_ratio() {
        let stats = PathStats::from_values(&[1.0, 1.0, 2.0, 2.0]);
        assert!((stats.unique_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_mean_has_zero_cv() {
        let stats = PathStats::from_values(&[-1.0, 1.0]);
        assert_eq!(stats.coefficient_of_variation, 0.0);
    }
}
