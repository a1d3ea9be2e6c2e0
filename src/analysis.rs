use serde::{Deserialize, Serialize};

/// Headline statistics for one sample set.
///
/// `min` and `max` are the 1st and 99th percentiles, not literal extrema,
/// and `ml` is the median.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistStats {
    pub min: f64,
    pub ml: f64,
    pub max: f64,
    pub p10: f64,
    pub p90: f64,
    #[serde(default)]
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub ale: DistStats,
    pub pel: DistStats,
}

/// One point of the loss exceedance curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePoint {
    pub x: f64,
    pub exceedance_probability: f64,
}

/// A sample set sorted ascending, ready for order statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSamples(Vec<f64>);

impl SortedSamples {
    pub fn new(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        SortedSamples(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Linear interpolation between the order statistics either side of
    /// rank `q·(n−1)`. 0 for an empty set.
    pub fn quantile(&self, q: f64) -> f64 {
        let values = &self.0;
        let n = values.len();
        match n {
            0 => return 0.0,
            1 => return values[0],
            _ => {}
        }
        let h = q.clamp(0.0, 1.0) * (n - 1) as f64;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = h - lo as f64;
        let (a, b) = (values[lo], values[hi]);
        (a + (b - a) * frac).max(a).min(b)
    }

    pub fn mean(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }

    pub fn stats(&self) -> DistStats {
        DistStats {
            min: self.quantile(0.01),
            ml: self.quantile(0.5),
            max: self.quantile(0.99),
            p10: self.quantile(0.1),
            p90: self.quantile(0.9),
            mean: self.mean(),
        }
    }

    /// `points` evenly spaced quantile ranks from 0 to 1; the point at rank
    /// `q` carries exceedance probability `1 − q`.
    pub fn exceedance_curve(&self, points: usize) -> Vec<CurvePoint> {
        let last = points.saturating_sub(1).max(1) as f64;
        (0..points)
            .map(|i| {
                let q = i as f64 / last;
                CurvePoint { x: self.quantile(q), exceedance_probability: 1.0 - q }
            })
            .collect()
    }
}

/// Quantile of an unsorted sample set.
pub fn quantile(samples: &[f64], q: f64) -> f64 {
    SortedSamples::new(samples.to_vec()).quantile(q)
}

pub fn stats(samples: &[f64]) -> DistStats {
    SortedSamples::new(samples.to_vec()).stats()
}

pub fn exceedance_curve(samples: &[f64], points: usize) -> Vec<CurvePoint> {
    SortedSamples::new(samples.to_vec()).exceedance_curve(points)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn quantile_known_values() {
        let s = SortedSamples::new(vec![5.0, 1.0, 4.0, 2.0, 3.0]);
        assert_eq!(s.quantile(0.0), 1.0);
        assert_eq!(s.quantile(1.0), 5.0);
        assert_eq!(s.quantile(0.5), 3.0);
        assert!((s.quantile(0.1) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn quantile_small_sets() {
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(quantile(&[7.0], 0.0), 7.0);
        assert_eq!(quantile(&[7.0], 0.99), 7.0);
        // Midpoint of two values.
        assert_eq!(quantile(&[1.0, 2.0], 0.5), 1.5);
    }

    #[test]
    fn stats_use_tail_quantiles() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let s = stats(&values);
        assert!((s.min - 1.0).abs() < 1e-9);
        assert!((s.max - 99.0).abs() < 1e-9);
        assert!((s.ml - 50.0).abs() < 1e-9);
        assert!((s.p10 - 10.0).abs() < 1e-9);
        assert!((s.p90 - 90.0).abs() < 1e-9);
        assert!((s.mean - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stats_are_zero() {
        assert_eq!(stats(&[]), DistStats::default());
        assert!(exceedance_curve(&[], 20).iter().all(|p| p.x == 0.0));
    }

    #[test]
    fn constant_set_curve_is_flat_with_linear_probability() {
        let curve = exceedance_curve(&vec![42.0; 1_000], 21);
        assert_eq!(curve.len(), 21);
        for (i, p) in curve.iter().enumerate() {
            assert_eq!(p.x, 42.0);
            let expected = 1.0 - i as f64 / 20.0;
            assert!((p.exceedance_probability - expected).abs() < 1e-12);
        }
        assert_eq!(curve[0].exceedance_probability, 1.0);
        assert_eq!(curve[20].exceedance_probability, 0.0);
    }

    #[test]
    fn curve_point_json_shape() {
        let point = CurvePoint { x: 1.5, exceedance_probability: 0.25 };
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, r#"{"x":1.5,"exceedanceProbability":0.25}"#);
    }

    proptest! {
        #[test]
        fn curve_is_monotone(
            values in prop::collection::vec(0.0f64..1.0e6, 1..200),
            points in 2usize..80,
        ) {
            let curve = exceedance_curve(&values, points);
            prop_assert_eq!(curve.len(), points);
            for w in curve.windows(2) {
                prop_assert!(w[1].x >= w[0].x);
                prop_assert!(w[1].exceedance_probability <= w[0].exceedance_probability);
            }
        }

        #[test]
        fn quantile_extremes_are_min_and_max(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200),
        ) {
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(quantile(&values, 0.0), lo);
            prop_assert_eq!(quantile(&values, 1.0), hi);
        }
    }
}
