use crate::accumulator::Accumulator;
use crate::error::{DiagnosticError, Result};
use crate::expectand::Expectands;
use crate::utils::{flatten, mean, sample_variance, split_chains, validate_chain, validate_chains};
use crate::{Array1, Array2, Statistic};
use arima::acf;
use rustfft::{num_complex::Complex, FftPlanner};

/// Fewest draws per chain for which the autocorrelation sum is defined.
pub const MIN_ESS_DRAWS: usize = 4;

/// Longest chain whose autocovariance is computed directly.
const MAX_DIRECT_ACOV_DRAWS: usize = 100;

/// Biased (divide by N) autocovariances of one chain at lags `0..N`.
fn autocovariance(chain: &[f64], index: usize) -> Result<Array1> {
    if chain.len() <= MAX_DIRECT_ACOV_DRAWS {
        acf::acf(chain, None, true).map_err(|_| DiagnosticError::Autocovariance { chain: index })
    } else {
        Ok(autocovariance_fft(chain))
    }
}

/// Autocovariance through the power spectrum.  The chain is zero padded to at
/// least `2N - 1` points so the circular correlation does not wrap around.
fn autocovariance_fft(chain: &[f64]) -> Array1 {
    let n = chain.len();
    let n_padded = (2 * n - 1).next_power_of_two();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_padded);
    let ifft = planner.plan_fft_inverse(n_padded);

    let chain_mean = chain.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<Complex<f64>> = chain
        .iter()
        .map(|x| Complex::new(x - chain_mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(n_padded - n))
        .collect();
    fft.process(&mut buffer);
    buffer.iter_mut().for_each(|x| *x *= x.conj());
    ifft.process(&mut buffer);
    // rustfft leaves the inverse transform unnormalized
    buffer
        .iter()
        .take(n)
        .map(|x| x.re / n_padded as f64 / n as f64)
        .collect()
}

/// Empirical autocorrelations of a single chain at lags `0..N`.
///
/// Returns [`Statistic::Frozen`] for a constant chain, where every lag is 0/0.
pub fn compute_autocorrelations(chain: &[f64]) -> Result<Statistic<Array1>> {
    validate_chain(chain)?;
    if chain.iter().all(|x| *x == chain[0]) {
        return Ok(Statistic::Frozen);
    }
    let acov = autocovariance(chain, 0)?;
    Ok(Statistic::Value(acov.iter().map(|a| a / acov[0]).collect()))
}

/// Computes the integrated autocorrelation time of the specified parameter
/// across all chains.  The result is floored at 1, so the matching effective
/// sample size never exceeds the number of draws.
///
/// Autocorrelations are pooled across chains against the combined
/// within/between chain variance, then summed with Geyer's initial positive
/// sequence and smoothed into an initial monotone sequence.  Summation stops
/// at the first lag pair whose sum is not positive.
///
/// Based on the reference implementation in Stan v2.24.0 at
/// [https://github.com/stan-dev/stan/blob/v2.24.0/src/stan/analyze/mcmc/compute_effective_sample_size.hpp#L32-L138]()
///
/// # Arguments
/// * `chains` - Reference to a vector of chains, each of which is a vector of samples for
///              the same parameter
pub fn compute_tau_hat(chains: &[Array1]) -> Result<Statistic> {
    let (num_chains, num_draws) = validate_chains(chains)?;
    if num_draws < MIN_ESS_DRAWS {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "effective sample size",
            required: MIN_ESS_DRAWS,
            found: num_draws,
        });
    }
    // Zero variance within every chain leaves the autocorrelations undefined,
    // even when the chains sit at different values.
    if chains
        .iter()
        .all(|chain| chain.iter().collect::<Accumulator>().is_frozen())
    {
        return Ok(Statistic::Frozen);
    }

    let n = num_draws as f64;
    let mut chain_acov: Array2 = Vec::with_capacity(num_chains);
    let mut chain_mean: Array1 = Vec::with_capacity(num_chains);
    let mut chain_var: Array1 = Vec::with_capacity(num_chains);
    for (c, chain) in chains.iter().enumerate() {
        let acov = autocovariance(chain, c)?;
        chain_mean.push(mean(chain)?);
        chain_var.push(acov[0] * n / (n - 1.0));
        chain_acov.push(acov);
    }

    let mean_var = mean(&chain_var)?;
    let mut var_plus = mean_var * (n - 1.0) / n;
    if num_chains > 1 {
        var_plus += sample_variance(&chain_mean)?;
    }

    let rho_at = |lag: usize| -> f64 {
        let mean_acov = chain_acov.iter().map(|acov| acov[lag]).sum::<f64>() / num_chains as f64;
        1.0 - (mean_var - mean_acov) / var_plus
    };

    let mut rho_hat_s: Array1 = vec![0.0; num_draws];
    let mut rho_hat_even = 1.0;
    let mut rho_hat_odd = rho_at(1);
    rho_hat_s[0] = rho_hat_even;
    rho_hat_s[1] = rho_hat_odd;

    // Geyer's initial positive sequence.  The last pair of lags is left out
    // and used as a bias term, which helps with antithetic chains.
    let mut s = 1;
    while s < num_draws - 4 && rho_hat_even + rho_hat_odd > 0.0 {
        rho_hat_even = rho_at(s + 1);
        rho_hat_odd = rho_at(s + 2);
        if rho_hat_even + rho_hat_odd >= 0.0 {
            rho_hat_s[s + 1] = rho_hat_even;
            rho_hat_s[s + 2] = rho_hat_odd;
        }
        s += 2;
    }

    let max_s = s;
    if rho_hat_even > 0.0 {
        rho_hat_s[max_s + 1] = rho_hat_even;
    }

    // Initial monotone sequence: no pair sum may exceed the one before it.
    let mut s = 1;
    while max_s >= 3 && s <= max_s - 3 {
        let previous = rho_hat_s[s - 1] + rho_hat_s[s];
        if rho_hat_s[s + 1] + rho_hat_s[s + 2] > previous {
            rho_hat_s[s + 1] = previous / 2.0;
            rho_hat_s[s + 2] = rho_hat_s[s + 1];
        }
        s += 2;
    }

    let tau_hat = -1.0 + 2.0 * rho_hat_s.iter().take(max_s).sum::<f64>() + rho_hat_s[max_s + 1];
    log::trace!(
        "tau_hat={:.4} from {} lags over {} chains x {} draws",
        tau_hat,
        max_s,
        num_chains,
        num_draws
    );
    Ok(Statistic::Value(tau_hat.max(1.0)))
}

/// Computes the effective sample size (ESS) for the specified parameter across
/// all chains, `num_chains * num_draws / tau_hat`.  See [`compute_tau_hat`].
///
/// See more details in Stan reference manual section
/// ["Effective Sample Size"](http://mc-stan.org/users/documentation)
pub fn compute_effective_sample_size(chains: &[Array1]) -> Result<Statistic> {
    let tau_hat = compute_tau_hat(chains)?;
    let total_draws = chains.len() as f64 * chains[0].len() as f64;
    Ok(tau_hat.map(|tau| total_draws / tau))
}

/// Computes the split effective sample size (ESS) for the specified
/// parameter across all kept samples.  When the number of total draws N is
/// odd, the (N+1)/2th draw is ignored.
///
/// Based on reference implementation in Stan v2.24.0 at
/// [https://github.com/stan-dev/stan/blob/v2.24.0/src/stan/analyze/mcmc/compute_effective_sample_size.hpp#L185-L199]()
pub fn compute_split_effective_sample_size(chains: &[Array1]) -> Result<Statistic> {
    let split = split_chains(chains)?;
    compute_effective_sample_size(&split)
}

/// Empirical effective sample size of each chain on its own.
pub fn compute_chain_eesss(chains: &[Array1]) -> Result<Vec<Statistic>> {
    validate_chains(chains)?;
    chains
        .iter()
        .map(|chain| compute_effective_sample_size(std::slice::from_ref(chain)))
        .collect()
}

/// Smallest per-chain effective sample size of every expectand.
///
/// An expectand with any frozen chain reports [`Statistic::Frozen`].  Errors
/// are kept per expectand.
pub fn compute_min_eesss(expectands: &Expectands) -> Vec<(String, Result<Statistic>)> {
    expectands
        .iter()
        .map(|(name, chains)| {
            let min_eess = compute_chain_eesss(chains).map(|eesss| {
                eesss
                    .into_iter()
                    .try_fold(f64::INFINITY, |acc, eess| eess.value().map(|e| acc.min(e)))
                    .map_or(Statistic::Frozen, Statistic::Value)
            });
            (name.to_string(), min_eess)
        })
        .collect()
}

/// Computes the Monte Carlo Standard Error (MCSE) for the specified parameter
/// across all samples, which is the standard deviation of the samples over the
/// square root of effective sample size.
///
/// See the Stan reference manual section
/// ["Estimation of MCMC Standard Error"](https://mc-stan.org/docs/2_24/reference-manual/effective-sample-size-section.html#estimation-of-mcmc-standard-error)
pub fn compute_estimated_mcse(chains: &[Array1]) -> Result<Statistic> {
    let ess = match compute_effective_sample_size(chains)? {
        Statistic::Value(ess) => ess,
        Statistic::Frozen => return Ok(Statistic::Frozen),
    };
    let var = flatten(chains).iter().collect::<Accumulator>().variance();
    Ok(Statistic::Value((var / ess).sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn normal_chains(num_chains: usize, num_draws: usize, seed: u64) -> Array2 {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..num_chains)
            .map(|_| (0..num_draws).map(|_| StandardNormal.sample(&mut rng)).collect())
            .collect()
    }

    fn ar1_chains(rho: f64, num_chains: usize, num_draws: usize, seed: u64) -> Array2 {
        let mut rng = StdRng::seed_from_u64(seed);
        let stationary_sd = (1.0 - rho * rho).sqrt().recip();
        (0..num_chains)
            .map(|_| {
                let first: f64 = StandardNormal.sample(&mut rng);
                let mut x = stationary_sd * first;
                (0..num_draws)
                    .map(|_| {
                        let eps: f64 = StandardNormal.sample(&mut rng);
                        x = rho * x + eps;
                        x
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_identical_autocovariance_in_arima_library_and_stan() {
        let arr = vec![
            0.747858687681513,
            0.290118161168511,
            -0.66263075102762,
            -0.00794439358648058,
            0.612494029879686,
            1.15915333101436,
            0.844402455747637,
            -0.493298834393585,
            0.140306938408938,
            -0.207331367372662,
            0.344322796977632,
            -0.216755313401662,
            -0.704730639551491,
            -0.262457923752462,
            0.338587814578015,
            0.79334841402936,
            -0.495245866959037,
            -0.736378128523917,
            -1.10220108378805,
            2.37069694852591,
        ];
        let stan_acov = vec![
            0.6269672577,
            -0.0113804234,
            -0.1668563930,
            -0.2086591087,
            0.1016590536,
            0.1767212413,
            -0.0059714922,
            -0.1489622883,
            -0.0996503101,
            0.0996094900,
            0.0450098619,
            -0.0109203038,
            -0.2154921627,
            -0.0374684937,
            0.1274360411,
            0.1121981758,
            0.0073812983,
            -0.1254719533,
            -0.0208019612,
            0.0681360996,
        ];
        let acov = autocovariance(&arr, 0).unwrap();
        for i in 0..arr.len() {
            assert_abs_diff_eq!(acov[i], stan_acov[i], epsilon = 1e-10);
        }

        let rho = compute_autocorrelations(&arr).unwrap().value().unwrap();
        assert_eq!(rho[0], 1.0);
        assert_abs_diff_eq!(rho[1], -0.0113804234 / 0.6269672577, epsilon = 1e-8);
    }

    #[test]
    pub fn compute_effective_sample_size_minimum_n() {
        let chains = vec![vec![1.0, 2.0, 3.0]];
        let ess = compute_effective_sample_size(&chains);
        assert_eq!(
            ess,
            Err(DiagnosticError::TooFewDraws {
                statistic: "effective sample size",
                required: 4,
                found: 3
            })
        );
    }

    #[test]
    pub fn compute_effective_sample_size_sufficient_n() {
        let chains = vec![vec![1.0, 2.0, 3.0, 4.0]];
        let ess = compute_effective_sample_size(&chains).unwrap().value().unwrap();
        assert!(ess.is_finite());
        assert!(ess <= 4.0);
    }

    #[test]
    pub fn compute_effective_sample_size_nan() {
        let chains = vec![vec![1.0, f64::NAN, 3.0, 4.0]];
        let ess = compute_effective_sample_size(&chains);
        assert!(ess.is_err());
    }

    #[test]
    pub fn compute_effective_sample_size_constant() {
        let chains = vec![vec![1.0, 1.0, 1.0, 1.0], vec![1.0, 1.0, 1.0, 1.0]];
        assert_eq!(compute_tau_hat(&chains), Ok(Statistic::Frozen));
        assert_eq!(compute_effective_sample_size(&chains), Ok(Statistic::Frozen));
        assert_eq!(compute_estimated_mcse(&chains), Ok(Statistic::Frozen));
        assert_eq!(compute_autocorrelations(&chains[0]), Ok(Statistic::Frozen));
    }

    #[test]
    fn test_constant_chains_at_different_values_are_frozen() {
        let chains = vec![vec![1.0; 8], vec![2.0; 8]];
        assert_eq!(compute_tau_hat(&chains), Ok(Statistic::Frozen));
        assert_eq!(compute_effective_sample_size(&chains), Ok(Statistic::Frozen));
        assert_eq!(compute_split_effective_sample_size(&chains), Ok(Statistic::Frozen));
        assert_eq!(compute_estimated_mcse(&chains), Ok(Statistic::Frozen));
    }

    #[test]
    fn test_fft_autocovariance_matches_direct() {
        let chain = ar1_chains(0.7, 1, 500, 13).remove(0);
        assert!(chain.len() > MAX_DIRECT_ACOV_DRAWS);
        let direct = acf::acf(&chain, None, true).unwrap();
        let fft = autocovariance_fft(&chain);
        assert_eq!(fft.len(), direct.len());
        for (a, b) in fft.iter().zip(&direct) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unequal_chains_are_rejected() {
        let chains = vec![vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![1.0, 2.0, 3.0, 4.0]];
        assert!(compute_effective_sample_size(&chains).is_err());
    }

    #[test]
    fn test_independent_draws_have_full_ess() {
        let chains = normal_chains(4, 1000, 7);
        let ess = compute_effective_sample_size(&chains).unwrap().value().unwrap();
        assert!(ess > 3000.0 && ess <= 4000.0, "ess = {}", ess);
        let tau = compute_tau_hat(&chains).unwrap().value().unwrap();
        assert!(tau >= 1.0);
    }

    #[test]
    fn test_ar1_inflates_tau_by_theoretical_factor() {
        let rho = 0.9;
        let expected_tau = (1.0 + rho) / (1.0 - rho);
        let num_chains = 4;
        let num_draws = 10_000;

        let correlated = ar1_chains(rho, num_chains, num_draws, 13);
        let independent = normal_chains(num_chains, num_draws, 13);
        let tau = compute_tau_hat(&correlated).unwrap().value().unwrap();
        assert_relative_eq!(tau, expected_tau, max_relative = 0.25);

        let ess_correlated = compute_effective_sample_size(&correlated)
            .unwrap()
            .value()
            .unwrap();
        let ess_independent = compute_effective_sample_size(&independent)
            .unwrap()
            .value()
            .unwrap();
        assert_relative_eq!(
            ess_independent / ess_correlated,
            expected_tau,
            max_relative = 0.3
        );
    }

    #[test]
    fn test_split_ess_uses_half_chains() {
        let chains = normal_chains(2, 501, 19);
        let split = compute_split_effective_sample_size(&chains)
            .unwrap()
            .value()
            .unwrap();
        // the middle draw of each chain is dropped
        assert!(split <= 1000.0);
        assert!(split > 700.0, "split ess = {}", split);
    }

    #[test]
    fn test_chain_eesss_and_mcse() {
        let chains = normal_chains(3, 500, 29);
        let eesss = compute_chain_eesss(&chains).unwrap();
        assert_eq!(eesss.len(), 3);
        for eess in eesss {
            let eess = eess.value().unwrap();
            assert!(eess > 300.0 && eess <= 500.0, "eess = {}", eess);
        }

        let mcse = compute_estimated_mcse(&chains).unwrap().value().unwrap();
        // unit variance, roughly 1500 effective draws
        assert!(mcse > 0.02 && mcse < 0.035, "mcse = {}", mcse);
    }

    #[test]
    fn test_min_eesss_per_expectand() {
        let mut expectands = Expectands::new();
        expectands.insert("mixing", normal_chains(2, 400, 31)).unwrap();
        expectands.insert("sticky", ar1_chains(0.95, 2, 400, 37)).unwrap();
        expectands
            .insert("half_frozen", vec![vec![0.5; 400], normal_chains(1, 400, 41).remove(0)])
            .unwrap();
        expectands.insert("short", vec![vec![1.0, 2.0]]).unwrap();

        let min_eesss = compute_min_eesss(&expectands);
        let names: Vec<&str> = min_eesss.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["mixing", "sticky", "half_frozen", "short"]);

        let mixing = min_eesss[0].1.clone().unwrap().value().unwrap();
        let sticky = min_eesss[1].1.clone().unwrap().value().unwrap();
        assert!(mixing > 250.0);
        assert!(sticky < 100.0, "sticky eess = {}", sticky);
        assert_eq!(min_eesss[2].1, Ok(Statistic::Frozen));
        assert!(min_eesss[3].1.is_err());
    }
}
