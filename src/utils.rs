use crate::error::{DiagnosticError, Result};
use crate::{Array1, Array2};

/// Compute the arithmetic mean of an array.
pub fn mean(arr: &[f64]) -> Result<f64> {
    if arr.is_empty() {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "mean",
            required: 1,
            found: 0,
        });
    }
    let sum = arr.iter().sum::<f64>();
    let count = arr.len() as f64;
    Ok(sum / count)
}

/// Compute the sample variance of an array using Bessel's correction.
pub fn sample_variance(arr: &[f64]) -> Result<f64> {
    if arr.len() < 2 {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "sample variance",
            required: 2,
            found: arr.len(),
        });
    }
    let xbar = mean(arr)?;
    Ok(arr.iter().map(|x| (x - xbar).powi(2)).sum::<f64>() / (arr.len() as f64 - 1.0))
}

/// Checks that `chains` is a non-empty rectangular matrix of finite values and
/// returns `(num_chains, num_draws)`.
///
/// Unlike the trimming behaviour of older releases, chains of unequal length
/// are rejected outright.
pub fn validate_chains(chains: &[Array1]) -> Result<(usize, usize)> {
    let first = chains.first().ok_or(DiagnosticError::EmptyChains)?;
    let num_draws = first.len();
    for (c, chain) in chains.iter().enumerate() {
        if chain.is_empty() {
            return Err(DiagnosticError::EmptyChain { chain: c });
        }
        if chain.len() != num_draws {
            return Err(DiagnosticError::UnequalChainLengths {
                chain: c,
                expected: num_draws,
                found: chain.len(),
            });
        }
        if let Some((n, &value)) = chain.iter().enumerate().find(|(_, x)| !x.is_finite()) {
            return Err(DiagnosticError::NonFinite {
                chain: c,
                draw: n,
                value,
            });
        }
    }
    Ok((chains.len(), num_draws))
}

/// Checks a single chain for emptiness and non-finite values and returns its
/// length.
pub fn validate_chain(chain: &[f64]) -> Result<usize> {
    if chain.is_empty() {
        return Err(DiagnosticError::EmptyChain { chain: 0 });
    }
    if let Some((n, &value)) = chain.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(DiagnosticError::NonFinite {
            chain: 0,
            draw: n,
            value,
        });
    }
    Ok(chain.len())
}

/// Returns true when every element of every chain is exactly equal.
pub fn is_constant(chains: &[Array1]) -> bool {
    let mut values = chains.iter().flatten();
    match values.next() {
        Some(first) => values.all(|x| x == first),
        None => true,
    }
}

/// Concatenates all chains into a single array, chain by chain.
pub fn flatten(chains: &[Array1]) -> Array1 {
    chains.iter().flatten().copied().collect()
}

/// Splits each chain into two chains of equal length.  When the
/// number of total draws N is odd, the (N+1)/2th draw is ignored.
///
/// See more details in Stan reference manual section
/// ["Effective Sample Size"](http://mc-stan.org/users/documentation).
pub fn split_chains(chains: &[Array1]) -> Result<Array2> {
    let (_, num_draws) = validate_chains(chains)?;
    if num_draws < 2 {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "chain splitting",
            required: 2,
            found: num_draws,
        });
    }
    let half = num_draws / 2;
    let offset = num_draws % 2;
    let mut split_draws = Vec::with_capacity(2 * chains.len());
    for chain in chains {
        split_draws.push(chain[..half].to_vec());
        split_draws.push(chain[(half + offset)..].to_vec());
    }
    Ok(split_draws)
}
