use crate::error::{DiagnosticError, Result};
use crate::estimate::{equal_weight_estimate, mcmc_estimate, McmcEstimate};
use crate::utils::validate_chains;
use crate::Array1;

/// One bin of a pushforward histogram, `[lower, upper)`.  The last bin of a
/// histogram is closed on the right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub probability: f64,
    pub standard_error: f64,
}

/// Estimated probabilities of every bin.
///
/// `underflow` and `overflow` hold the mass below and above an explicitly
/// requested range, and are `None` when no draw falls outside of it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramEstimate {
    pub bins: Vec<HistogramBin>,
    pub underflow: Option<HistogramBin>,
    pub overflow: Option<HistogramBin>,
}

impl HistogramEstimate {
    /// Sum over all bins, including underflow and overflow.
    pub fn total_probability(&self) -> f64 {
        self.bins
            .iter()
            .chain(self.underflow.iter())
            .chain(self.overflow.iter())
            .map(|b| b.probability)
            .sum()
    }

    pub fn edges(&self) -> Vec<f64> {
        let mut edges: Vec<f64> = self.bins.iter().map(|b| b.lower).collect();
        if let Some(last) = self.bins.last() {
            edges.push(last.upper);
        }
        edges
    }
}

enum Slot {
    Underflow,
    Bin(usize),
    Overflow,
}

/// Estimates the probability of each of `bins` equal-width intervals.
///
/// The range defaults to `[min, max]` over every draw; the maximum value is
/// counted in the last bin.  Each bin probability is the average over chains
/// of the chain mean of the bin indicator, so the probabilities sum to one.
/// The standard error combines the per-chain Monte Carlo standard errors of
/// the indicator, and an indicator that never changes within a chain
/// contributes zero.
pub fn estimate_pushforward(
    chains: &[Array1],
    bins: usize,
    range: Option<(f64, f64)>,
) -> Result<HistogramEstimate> {
    if bins == 0 {
        return Err(DiagnosticError::ZeroBins);
    }
    let (num_chains, num_draws) = validate_chains(chains)?;

    let (lower, upper) = match range {
        Some((lower, upper)) => {
            if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                return Err(DiagnosticError::InvalidRange { lower, upper });
            }
            (lower, upper)
        }
        None => {
            let (min, max) = chains
                .iter()
                .flatten()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                    (lo.min(x), hi.max(x))
                });
            if min == max {
                return Err(DiagnosticError::DegenerateRange { value: min });
            }
            (min, max)
        }
    };

    let width = (upper - lower) / bins as f64;
    let slot = |x: f64| {
        if x < lower {
            Slot::Underflow
        } else if x > upper {
            Slot::Overflow
        } else {
            let index = ((x - lower) / width).floor() as usize;
            Slot::Bin(index.min(bins - 1))
        }
    };

    // Indicator chains: bins, then underflow, then overflow.
    let num_slots = bins + 2;
    let mut indicators = vec![vec![vec![0.0; num_draws]; num_chains]; num_slots];
    for (c, chain) in chains.iter().enumerate() {
        for (i, &x) in chain.iter().enumerate() {
            let k = match slot(x) {
                Slot::Bin(b) => b,
                Slot::Underflow => bins,
                Slot::Overflow => bins + 1,
            };
            indicators[k][c][i] = 1.0;
        }
    }

    let to_bin = |lo: f64, hi: f64, est: McmcEstimate| HistogramBin {
        lower: lo,
        upper: hi,
        probability: est.mean,
        standard_error: est.se,
    };

    let mut result = Vec::with_capacity(bins);
    for (b, slot_chains) in indicators[..bins].iter().enumerate() {
        let lo = lower + b as f64 * width;
        let hi = if b + 1 == bins {
            upper
        } else {
            lower + (b + 1) as f64 * width
        };
        result.push(to_bin(lo, hi, estimate_slot(slot_chains)?));
    }

    let underflow = if has_mass(&indicators[bins]) {
        Some(to_bin(
            f64::NEG_INFINITY,
            lower,
            estimate_slot(&indicators[bins])?,
        ))
    } else {
        None
    };
    let overflow = if has_mass(&indicators[bins + 1]) {
        Some(to_bin(upper, f64::INFINITY, estimate_slot(&indicators[bins + 1])?))
    } else {
        None
    };
    log::trace!(
        "pushforward histogram over [{}, {}] with {} bins",
        lower,
        upper,
        bins
    );

    Ok(HistogramEstimate {
        bins: result,
        underflow,
        overflow,
    })
}

fn estimate_slot(slot_chains: &[Array1]) -> Result<McmcEstimate> {
    let per_chain = slot_chains
        .iter()
        .map(|chain| mcmc_estimate(chain))
        .collect::<Result<Vec<_>>>()?;
    Ok(equal_weight_estimate(&per_chain))
}

fn has_mass(slot_chains: &[Array1]) -> bool {
    slot_chains.iter().flatten().any(|&x| x > 0.0)
}
