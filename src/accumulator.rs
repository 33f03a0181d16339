use average::{Estimate, Merge, Variance};
use std::iter::FromIterator;

/// Running mean and variance over a stream of values.
///
/// Updates follow Welford's rule, accumulating squared deviations from the
/// running mean so no raw values are retained.  Accumulators built for
/// separate chains can be merged into an ensemble accumulator without
/// rescanning the draws.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    inner: Variance,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one observation.
    pub fn push(&mut self, x: f64) {
        self.inner.add(x);
    }

    pub fn count(&self) -> u64 {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Mean of the observations, zero when empty.
    pub fn mean(&self) -> f64 {
        self.inner.mean()
    }

    /// Unbiased sample variance (Bessel's correction).  Zero until at least two
    /// values have been observed.
    pub fn variance(&self) -> f64 {
        self.inner.sample_variance()
    }

    /// True when at least two values have been seen and all of them were
    /// identical.
    pub fn is_frozen(&self) -> bool {
        self.count() >= 2 && self.variance() == 0.0
    }

    /// Combines another accumulator into this one using the parallel variance
    /// update of Chan et al.
    pub fn merge(&mut self, other: &Accumulator) {
        self.inner.merge(&other.inner);
    }

    /// Merges a sequence of accumulators, e.g. one per chain, into one.
    pub fn combine<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a Accumulator>,
    {
        let mut total = Accumulator::new();
        for part in parts {
            total.merge(part);
        }
        total
    }
}

impl Extend<f64> for Accumulator {
    fn extend<T: IntoIterator<Item = f64>>(&mut self, iter: T) {
        for x in iter {
            self.push(x);
        }
    }
}

impl<'a> Extend<&'a f64> for Accumulator {
    fn extend<T: IntoIterator<Item = &'a f64>>(&mut self, iter: T) {
        self.extend(iter.into_iter().copied());
    }
}

impl FromIterator<f64> for Accumulator {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        let mut acc = Accumulator::new();
        acc.extend(iter);
        acc
    }
}

impl<'a> FromIterator<&'a f64> for Accumulator {
    fn from_iter<T: IntoIterator<Item = &'a f64>>(iter: T) -> Self {
        iter.into_iter().copied().collect()
    }
}

/// Single pass `(mean, sample variance)` of a sequence.
pub fn welford_summary(xs: &[f64]) -> (f64, f64) {
    let acc: Accumulator = xs.iter().collect();
    (acc.mean(), acc.variance())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{mean, sample_variance};

    #[test]
    fn test_matches_two_pass_statistics() {
        let arr = vec![
            2.13829088,
            -1.06214379,
            -0.79265699,
            -0.21300888,
            -1.07155142,
            -0.50425317,
            0.95708854,
            -1.23854172,
            1.37124938,
            1.17658286,
        ];
        let (m, v) = welford_summary(&arr);
        assert_abs_diff_eq!(m, mean(&arr).unwrap(), epsilon = 1e-12);
        assert_abs_diff_eq!(v, sample_variance(&arr).unwrap(), epsilon = 1e-12);
        assert_abs_diff_eq!(v, 1.492596054209826, epsilon = 1e-6);
    }

    #[test]
    fn test_constant_values_are_frozen() {
        let acc: Accumulator = vec![3.5; 10].into_iter().collect();
        assert_eq!(acc.count(), 10);
        assert_eq!(acc.mean(), 3.5);
        assert_eq!(acc.variance(), 0.0);
        assert!(acc.is_frozen());
    }

    #[test]
    fn test_single_value_is_not_frozen() {
        let mut acc = Accumulator::new();
        assert!(acc.is_empty());
        acc.push(1.0);
        assert!(!acc.is_frozen());
        acc.push(1.0);
        assert!(acc.is_frozen());
        acc.push(1.5);
        assert!(!acc.is_frozen());
    }

    #[test]
    fn test_large_offset_is_stable() {
        // Naive sum-of-squares loses every digit here.
        let xs: Vec<f64> = (0..1000).map(|i| 1e9 + (i % 2) as f64).collect();
        let (_, v) = welford_summary(&xs);
        assert_abs_diff_eq!(v, 0.25 * 1000.0 / 999.0, epsilon = 1e-6);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let a = [1.0, 2.0, 4.0, 8.0];
        let b = [-1.0, 0.5, 3.0];
        let acc_a: Accumulator = a.iter().collect();
        let acc_b: Accumulator = b.iter().collect();
        let merged = Accumulator::combine(vec![&acc_a, &acc_b]);

        let all: Accumulator = a.iter().chain(b.iter()).collect();
        assert_eq!(merged.count(), 7);
        assert_abs_diff_eq!(merged.mean(), all.mean(), epsilon = 1e-12);
        assert_abs_diff_eq!(merged.variance(), all.variance(), epsilon = 1e-12);
    }
}
