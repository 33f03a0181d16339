//! Threshold configuration for every diagnostic check.
//!
//! The defaults are the values commonly used with Stan's dynamic Hamiltonian
//! Monte Carlo sampler; nothing in the checks themselves hard-codes them.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How much of a sorted chain is treated as its tail when estimating xihat.
///
/// The tail size is `max(min_tail_size, min(floor(fraction * N),
/// floor(sqrt_scale * sqrt(N))))`, clamped to `N - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TailConfig {
    pub fraction: f64,
    pub sqrt_scale: f64,
    pub min_tail_size: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            fraction: 0.2,
            sqrt_scale: 3.0,
            min_tail_size: 5,
        }
    }
}

impl TailConfig {
    /// Number of order statistics in each tail of a chain with `n` draws.
    pub fn tail_size(&self, n: usize) -> usize {
        let by_fraction = (self.fraction * n as f64).floor() as usize;
        let by_sqrt = (self.sqrt_scale * (n as f64).sqrt()).floor() as usize;
        by_fraction
            .min(by_sqrt)
            .max(self.min_tail_size)
            .min(n.saturating_sub(1))
    }
}

/// Thresholds for the expectand checks.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExpectandConfig {
    /// Warn when either tail xihat is at or above this value.
    pub xi_hat_threshold: f64,
    /// Warn when split Rhat exceeds this value.
    pub max_split_rhat: f64,
    /// Warn when a chain's empirical effective sample size is below this value.
    pub min_eess_per_chain: f64,
    /// Suppress frozen-chain warnings for expectands expected to be constant.
    pub exclude_zero_variance: bool,
    /// Collections with more expectands than this are summarized by
    /// [`ReportMode::auto`](crate::expectand::ReportMode::auto).
    pub summary_threshold: usize,
    pub tail: TailConfig,
}

impl Default for ExpectandConfig {
    fn default() -> Self {
        Self {
            xi_hat_threshold: 0.25,
            max_split_rhat: 1.1,
            min_eess_per_chain: 100.0,
            exclude_zero_variance: false,
            summary_threshold: 20,
            tail: TailConfig::default(),
        }
    }
}

/// Thresholds for the Hamiltonian Monte Carlo transition checks.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HmcConfig {
    /// Tree depth at which the sampler stops extending a trajectory.
    pub max_treedepth: u32,
    /// Warn when a chain's E-FMI falls below this value.
    pub efmi_threshold: f64,
    /// Step size adaptation target for the average acceptance statistic.
    pub adapt_target: f64,
    /// Allowed absolute deviation of a chain's average acceptance statistic
    /// from `adapt_target`.
    pub accept_stat_tolerance: f64,
}

impl Default for HmcConfig {
    fn default() -> Self {
        Self {
            max_treedepth: 10,
            efmi_threshold: 0.2,
            adapt_target: 0.801,
            accept_stat_tolerance: 0.1,
        }
    }
}
