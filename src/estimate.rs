use crate::accumulator::Accumulator;
use crate::error::{DiagnosticError, Result};
use crate::ess::{compute_effective_sample_size, MIN_ESS_DRAWS};
use crate::utils::{validate_chain, validate_chains};
use crate::{Array1, Statistic};

/// A Markov chain Monte Carlo estimate of an expectation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct McmcEstimate {
    pub mean: f64,
    /// Monte Carlo standard error of `mean`.
    pub se: f64,
    /// Effective sample size behind the estimate, `None` when the values were
    /// frozen and no autocorrelation could be estimated.
    pub ess: Option<f64>,
}

/// Estimate from a single chain: the empirical mean with standard error
/// `sqrt(var / ess)`.
///
/// A frozen chain has a zero standard error and no effective sample size.
pub fn mcmc_estimate(chain: &[f64]) -> Result<McmcEstimate> {
    let n = validate_chain(chain)?;
    let acc: Accumulator = chain.iter().collect();
    if acc.is_frozen() {
        return Ok(McmcEstimate {
            mean: acc.mean(),
            se: 0.0,
            ess: None,
        });
    }
    if n < MIN_ESS_DRAWS {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "Markov chain Monte Carlo estimate",
            required: MIN_ESS_DRAWS,
            found: n,
        });
    }
    match compute_effective_sample_size(&[chain.to_vec()])? {
        Statistic::Value(ess) => Ok(McmcEstimate {
            mean: acc.mean(),
            se: (acc.variance() / ess).sqrt(),
            ess: Some(ess),
        }),
        Statistic::Frozen => Ok(McmcEstimate {
            mean: acc.mean(),
            se: 0.0,
            ess: None,
        }),
    }
}

/// Combines per-chain estimates, weighting each chain by its effective sample
/// size.
///
/// The combined variance is `sum(ess_c^2 se_c^2) / (sum ess_c)^2`.  When any
/// chain is frozen the weights are undefined and every chain counts equally
/// instead.
pub fn ensemble_mcmc_estimate(chains: &[Array1]) -> Result<McmcEstimate> {
    validate_chains(chains)?;
    let estimates = chains
        .iter()
        .map(|chain| mcmc_estimate(chain))
        .collect::<Result<Vec<_>>>()?;
    Ok(combine_estimates(&estimates))
}

fn combine_estimates(estimates: &[McmcEstimate]) -> McmcEstimate {
    let all_ess: Option<Vec<f64>> = estimates.iter().map(|e| e.ess).collect();
    match all_ess {
        Some(ess) => {
            let total_ess: f64 = ess.iter().sum();
            let mean = estimates
                .iter()
                .zip(&ess)
                .map(|(e, w)| w * e.mean)
                .sum::<f64>()
                / total_ess;
            let var = estimates
                .iter()
                .zip(&ess)
                .map(|(e, w)| (w * e.se).powi(2))
                .sum::<f64>()
                / (total_ess * total_ess);
            McmcEstimate {
                mean,
                se: var.sqrt(),
                ess: Some(total_ess),
            }
        }
        None => equal_weight_estimate(estimates),
    }
}

/// Averages chain estimates with equal weights.  Chains are independent, so
/// the variance of the average is `sum(se_c^2) / C^2`.
pub(crate) fn equal_weight_estimate(estimates: &[McmcEstimate]) -> McmcEstimate {
    let c = estimates.len() as f64;
    let mean = estimates.iter().map(|e| e.mean).sum::<f64>() / c;
    let se = estimates.iter().map(|e| e.se * e.se).sum::<f64>().sqrt() / c;
    let ess = estimates.iter().map(|e| e.ess).sum::<Option<f64>>();
    McmcEstimate { mean, se, ess }
}

/// Probability of the subset of values where `predicate` holds, estimated from
/// the indicator of that subset.
pub fn estimate_probability<F>(chains: &[Array1], predicate: F) -> Result<McmcEstimate>
where
    F: Fn(f64) -> bool,
{
    validate_chains(chains)?;
    let indicators: Vec<Array1> = chains
        .iter()
        .map(|chain| {
            chain
                .iter()
                .map(|&x| if predicate(x) { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();
    ensemble_mcmc_estimate(&indicators)
}
