use crate::config::TailConfig;
use crate::error::{DiagnosticError, Result};
use crate::utils::validate_chain;
use crate::Statistic;
use std::cmp::Ordering;

/// Returned for tails with no spread to fit, e.g. a bounded or discrete
/// expectand.  Sits well below any sensible warning threshold.
pub const BOUNDED_TAIL_XI_HAT: f64 = -2.0;

/// Scale applied to the first quartile when laying out the theta grid.
const THETA_PRIOR_SCALE: f64 = 3.0;

/// Fixed part of the theta grid size, which grows as `sqrt(n)` on top.
const THETA_GRID_BASE: usize = 20;

/// Generalized Pareto shape estimates for both tails of one chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailXiHats {
    pub lower: f64,
    pub upper: f64,
}

impl TailXiHats {
    /// The xihat reported for the chain, the heavier of the two tails.
    pub fn max(&self) -> f64 {
        self.lower.max(self.upper)
    }
}

/// Estimates the shape parameter xi of a generalized Pareto distribution from
/// non-negative excesses over a threshold.
///
/// Uses the empirical Bayes estimator of Zhang & Stephens (2009),
/// "A new and efficient estimation method for the generalized Pareto
/// distribution", Technometrics 51(3).  The profile log likelihood of
/// `theta = -xi / sigma` is evaluated on a grid anchored at the largest excess
/// and the first quartile, the posterior mean of theta is taken with those
/// likelihoods as weights, and xi is recovered as `mean(log(1 - theta x))`.
///
/// Returns [`BOUNDED_TAIL_XI_HAT`] when the excesses have no spread or the
/// first quartile is zero, and an error for negative or non-finite excesses.
pub fn compute_xi_hat(excesses: &[f64]) -> Result<f64> {
    if let Some((draw, &value)) = excesses
        .iter()
        .enumerate()
        .find(|(_, x)| !x.is_finite())
    {
        return Err(DiagnosticError::NonFinite {
            chain: 0,
            draw,
            value,
        });
    }
    let n = excesses.len();
    if n < 2 {
        return Ok(BOUNDED_TAIL_XI_HAT);
    }
    let mut xs = excesses.to_vec();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    if xs[0] < 0.0 {
        return Err(DiagnosticError::NegativeExcess { value: xs[0] });
    }

    let x_max = xs[n - 1];
    if xs[0] == x_max {
        return Ok(BOUNDED_TAIL_XI_HAT);
    }
    let quartile = xs[(n as f64 / 4.0 + 0.5).floor() as usize - 1];
    if quartile <= 0.0 {
        return Ok(BOUNDED_TAIL_XI_HAT);
    }

    let m = THETA_GRID_BASE + (n as f64).sqrt().floor() as usize;
    let mut thetas = Vec::with_capacity(m);
    let mut log_weights = Vec::with_capacity(m);
    for j in 1..=m {
        let theta = 1.0 / x_max
            + (1.0 - (m as f64 / (j as f64 - 0.5)).sqrt()) / (THETA_PRIOR_SCALE * quartile);
        if theta == 0.0 {
            continue;
        }
        let k = -mean_log1m(theta, &xs);
        let log_w = n as f64 * ((theta / k).ln() + k - 1.0);
        if log_w.is_finite() {
            thetas.push(theta);
            log_weights.push(log_w);
        }
    }
    if thetas.is_empty() {
        return Ok(BOUNDED_TAIL_XI_HAT);
    }

    let max_log_w = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let mut norm = 0.0;
    let mut theta_hat = 0.0;
    for (theta, log_w) in thetas.iter().zip(log_weights.iter()) {
        let w = (log_w - max_log_w).exp();
        norm += w;
        theta_hat += theta * w;
    }
    theta_hat /= norm;

    Ok(mean_log1m(theta_hat, &xs))
}

/// `mean(log(1 - theta * x))` over `xs`.
fn mean_log1m(theta: f64, xs: &[f64]) -> f64 {
    xs.iter().map(|x| (-theta * x).ln_1p()).sum::<f64>() / xs.len() as f64
}

/// xihat of the upper tail of an ascending sorted sequence.
fn upper_tail_xi_hat(sorted: &[f64], tail_size: usize) -> Result<f64> {
    let n = sorted.len();
    if tail_size < 2 || tail_size >= n {
        return Ok(BOUNDED_TAIL_XI_HAT);
    }
    let threshold = sorted[n - tail_size - 1];
    let excesses: Vec<f64> = sorted[n - tail_size..]
        .iter()
        .map(|x| x - threshold)
        .collect();
    compute_xi_hat(&excesses)
}

/// Estimates the generalized Pareto shape of the upper and lower tails of a
/// single chain.  The lower tail is handled by negating the values.
///
/// Returns [`Statistic::Frozen`] when every value in the chain is identical.
pub fn compute_tail_xi_hats(chain: &[f64], tail: &TailConfig) -> Result<Statistic<TailXiHats>> {
    let n = validate_chain(chain)?;
    if n < 2 {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "tail xihat",
            required: 2,
            found: n,
        });
    }

    let mut sorted = chain.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    if sorted[0] == sorted[n - 1] {
        return Ok(Statistic::Frozen);
    }

    let tail_size = tail.tail_size(n);
    let upper = upper_tail_xi_hat(&sorted, tail_size)?;
    let negated: Vec<f64> = sorted.iter().rev().map(|x| -x).collect();
    let lower = upper_tail_xi_hat(&negated, tail_size)?;

    log::trace!(
        "tail xihats over {} of {} draws: lower={:.3}, upper={:.3}",
        tail_size,
        n,
        lower,
        upper
    );
    Ok(Statistic::Value(TailXiHats { lower, upper }))
}
