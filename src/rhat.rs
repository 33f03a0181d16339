use crate::accumulator::Accumulator;
use crate::error::{DiagnosticError, Result};
use crate::expectand::Expectands;
use crate::utils::{is_constant, split_chains, validate_chains};
use crate::{Array1, Statistic};

/// Computes the potential scale reduction (Rhat) for the specified
/// parameter across all kept samples.
///
/// Returns [`Statistic::Frozen`] when every draw of every chain is identical,
/// and positive infinity when every chain is constant but the chains disagree.
///
/// See more details in Stan reference manual section
/// ["Potential Scale Reduction"](https://mc-stan.org/docs/2_24/reference-manual/notation-for-samples-chains-and-draws.html#potential-scale-reduction).
///
/// Based on reference implementation in Stan v2.24.0 at
/// [https://github.com/stan-dev/stan/blob/v2.24.0/src/stan/analyze/mcmc/compute_potential_scale_reduction.hpp]()
pub fn potential_scale_reduction_factor(chains: &[Array1]) -> Result<Statistic> {
    let (m, n) = validate_chains(chains)?;
    if m < 2 {
        return Err(DiagnosticError::TooFewChains {
            statistic: "potential scale reduction",
            required: 2,
            found: m,
        });
    }
    if n < 2 {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "potential scale reduction",
            required: 2,
            found: n,
        });
    }
    if is_constant(chains) {
        return Ok(Statistic::Frozen);
    }

    let summaries: Vec<Accumulator> = chains.iter().map(|c| c.iter().collect()).collect();
    let means: Accumulator = summaries.iter().map(Accumulator::mean).collect();
    let variances: Accumulator = summaries.iter().map(Accumulator::variance).collect();

    let n = n as f64;
    let var_between = n * means.variance();
    let var_within = variances.mean();
    if var_within == 0.0 {
        return Ok(Statistic::Value(f64::INFINITY));
    }
    let result = ((var_between / var_within + n - 1.0) / n).sqrt();

    Ok(Statistic::Value(result))
}

/// Computes the split potential scale reduction (Rhat) for the
/// specified parameter across all kept samples.  When the number of
/// total draws N is odd, the (N+1)/2th draw is ignored.
///
/// Needs at least two draws in each half chain.
///
/// See more details in Stan reference manual section
/// ["Potential Scale Reduction"](https://mc-stan.org/docs/2_24/reference-manual/notation-for-samples-chains-and-draws.html#potential-scale-reduction)
pub fn split_potential_scale_reduction_factor(chains: &[Array1]) -> Result<Statistic> {
    let (_, num_draws) = validate_chains(chains)?;
    if num_draws / 2 < 2 {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "split potential scale reduction",
            required: 4,
            found: num_draws,
        });
    }
    let split = split_chains(chains)?;
    potential_scale_reduction_factor(&split)
}

/// Split Rhat of every expectand in the collection, in insertion order.
pub fn compute_split_rhats(expectands: &Expectands) -> Vec<(String, Result<Statistic>)> {
    expectands
        .iter()
        .map(|(name, chains)| {
            let rhat = split_potential_scale_reduction_factor(chains);
            if let Err(e) = &rhat {
                log::debug!("split rhat undefined for {}: {}", name, e);
            }
            (name.to_string(), rhat)
        })
        .collect()
}
