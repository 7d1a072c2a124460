//! The streaming sample aggregator: accumulates magnitude and probability
//! statistics over a run's iterations without ever materializing the full
//! sample list.

use std::ops::{Add, AddAssign};

use crate::error::ConfigError;

const CONFIDENCE_TABLE: [(f64, f64); 5] = [
    (0.80, 1.281),
    (0.85, 1.440),
    (0.90, 1.645),
    (0.95, 1.960),
    (0.995, 2.801),
];

fn z_score(confidence: f64) -> Result<f64, ConfigError> {
    CONFIDENCE_TABLE
        .iter()
        .find(|(c, _)| (*c - confidence).abs() < 1e-9)
        .map(|(_, z)| *z)
        .ok_or(ConfigError::UnknownConfidenceLevel(confidence))
}

/// A streaming accumulator over non-negative samples, some of which may be
/// exactly zero (meaning "no damage this iteration").
///
/// Tracks the magnitude mean/variance (`value_*`) and the probability that
/// a sample is positive at all (`prob_*`), both via Welford's online
/// algorithm so magnitudes in the 2^40+ range don't lose precision to
/// sum-of-squares cancellation. Zero-valued samples participate in the
/// magnitude mean (pulling it toward zero) but not in the positive count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Samples {
    n: u64,
    n_pos: u64,
    mean: f64,
    m2: f64,
}

impl Samples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    fn update_one(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    /// Records one sample. Non-positive values still count toward `n` but
    /// not toward `n_pos`.
    pub fn add(&mut self, x: f64) {
        if x > 0.0 {
            self.n_pos += 1;
        }
        self.update_one(if x > 0.0 { x } else { 0.0 });
    }

    /// Records `k` additional zero-valued samples in O(1).
    pub fn add_zeros(&mut self, k: u64) {
        if k == 0 {
            return;
        }
        let n = self.n;
        let n_new = n + k;
        let delta = 0.0 - self.mean;
        self.mean += delta * (k as f64) / (n_new as f64);
        self.m2 += delta * delta * (n as f64) * (k as f64) / (n_new as f64);
        self.n = n_new;
    }

    pub fn value_mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn value_var(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.m2 / self.n as f64
        }
    }

    pub fn value_dev(&self) -> f64 {
        self.value_var().sqrt()
    }

    pub fn prob_mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.n_pos as f64 / self.n as f64
        }
    }

    pub fn prob_dev(&self) -> f64 {
        let p = self.prob_mean();
        (p * (1.0 - p)).sqrt()
    }

    /// `(value_ci_half, prob_ci_half)` at the given confidence level.
    pub fn ci_half(&self, confidence: f64) -> Result<(f64, f64), ConfigError> {
        let z = z_score(confidence)?;
        let n = self.n.max(1) as f64;
        Ok((
            (z * self.value_dev() / n.sqrt()).abs(),
            (z * self.prob_dev() / n.sqrt()).abs(),
        ))
    }

    pub fn value_re(&self, confidence: f64) -> Result<f64, ConfigError> {
        let (value_ci, _) = self.ci_half(confidence)?;
        let mean = self.value_mean();
        Ok(if mean == 0.0 { 0.0 } else { value_ci / mean })
    }

    pub fn prob_re(&self, confidence: f64) -> Result<f64, ConfigError> {
        let (_, prob_ci) = self.ci_half(confidence)?;
        let mean = self.prob_mean();
        Ok(if mean == 0.0 { 0.0 } else { prob_ci / mean })
    }
}

impl AddAssign for Samples {
    /// Merges another shard's accumulator into this one (Chan's parallel
    /// variance merge), so independent workers can run iterations on
    /// private accumulators and combine them at the end.
    fn add_assign(&mut self, other: Self) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other;
            return;
        }
        let n = self.n;
        let n_new = n + other.n;
        let delta = other.mean - self.mean;
        self.mean += delta * (other.n as f64) / (n_new as f64);
        self.m2 += other.m2 + delta * delta * (n as f64) * (other.n as f64) / (n_new as f64);
        self.n = n_new;
        self.n_pos += other.n_pos;
    }
}

impl Add for Samples {
    type Output = Samples;
    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_stats(values: &[f64]) -> (f64, f64, f64) {
        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let sum2: f64 = values.iter().map(|x| x * x).sum();
        let mean = sum / n;
        let var = sum2 / n - mean * mean;
        let n_pos = values.iter().filter(|x| **x > 0.0).count() as f64;
        (mean, var, n_pos / n)
    }

    #[test]
    fn matches_naive_formula_on_a_small_set() {
        let values = [0.0, 5.0, 0.0, 10.0, 3.0, 0.0, 7.0];
        let mut samples = Samples::new();
        for v in values {
            samples.add(v);
        }
        let (mean, var, prob) = naive_stats(&values);
        assert!((samples.value_mean() - mean).abs() < 1e-9);
        assert!((samples.value_var() - var).abs() < 1e-9);
        assert!((samples.prob_mean() - prob).abs() < 1e-9);
    }

    #[test]
    fn add_zeros_matches_adding_one_at_a_time() {
        let mut batched = Samples::new();
        batched.add(5.0);
        batched.add_zeros(10);

        let mut stepwise = Samples::new();
        stepwise.add(5.0);
        for _ in 0..10 {
            stepwise.add(0.0);
        }

        assert!((batched.value_mean() - stepwise.value_mean()).abs() < 1e-12);
        assert!((batched.value_var() - stepwise.value_var()).abs() < 1e-12);
        assert_eq!(batched.n(), stepwise.n());
    }

    #[test]
    fn all_zero_samples_have_zero_re_and_no_nans() {
        let mut samples = Samples::new();
        samples.add_zeros(1000);
        assert_eq!(samples.value_mean(), 0.0);
        assert_eq!(samples.prob_mean(), 0.0);
        assert_eq!(samples.value_re(0.95).unwrap(), 0.0);
        assert_eq!(samples.prob_re(0.95).unwrap(), 0.0);
        assert!(!samples.value_re(0.95).unwrap().is_nan());
    }

    #[test]
    fn empty_samples_have_zero_stats_not_nan() {
        let samples = Samples::new();
        assert_eq!(samples.value_mean(), 0.0);
        assert_eq!(samples.prob_mean(), 0.0);
        assert!(!samples.value_dev().is_nan());
    }

    #[test]
    fn merging_shards_matches_one_combined_run() {
        let mut a = Samples::new();
        let mut b = Samples::new();
        let mut combined = Samples::new();
        for (i, v) in [1.0, 0.0, 4.0, 0.0, 9.0, 16.0].into_iter().enumerate() {
            combined.add(v);
            if i % 2 == 0 {
                a.add(v);
            } else {
                b.add(v);
            }
        }
        let merged = a + b;
        assert!((merged.value_mean() - combined.value_mean()).abs() < 1e-9);
        assert!((merged.value_var() - combined.value_var()).abs() < 1e-9);
        assert_eq!(merged.n(), combined.n());
    }

    #[test]
    fn unknown_confidence_level_is_an_error() {
        let samples = Samples::new();
        assert!(samples.ci_half(0.93).is_err());
    }
}
