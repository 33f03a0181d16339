#[macro_use]
extern crate approx;

use mcmc_diagnostics::expectand::{ExpectandWarning, WarningKind};
use mcmc_diagnostics::stan_csv::StanCsv;
use mcmc_diagnostics::{
    check_all_expectand_diagnostics, check_all_hmc_diagnostics, compute_min_eesss,
    compute_split_rhats, estimate_pushforward, Array2, ExpectandConfig, Expectands, HmcConfig,
    ReportMode, Statistic,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::path::Path;

fn normal_chains(num_chains: usize, num_draws: usize, seed: u64) -> Array2 {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_chains)
        .map(|_| (0..num_draws).map(|_| StandardNormal.sample(&mut rng)).collect())
        .collect()
}

#[test]
fn constant_chains_are_frozen_and_skipped() {
    let mut expectands = Expectands::new();
    expectands.insert("x", vec![vec![1.0; 4]; 2]).unwrap();

    let config = ExpectandConfig::default();
    let report = check_all_expectand_diagnostics(&expectands, &config, ReportMode::Full);
    let diagnostics = report.get("x").unwrap().outcome.as_ref().unwrap();
    assert_eq!(diagnostics.frozen_chains, vec![0, 1]);
    assert_eq!(diagnostics.split_rhat, Ok(Statistic::Frozen));
    assert_eq!(diagnostics.tail_xi_hats, Ok(vec![]));
    assert_eq!(diagnostics.chain_eesss, Ok(vec![]));
    assert!(diagnostics
        .warnings
        .iter()
        .all(|w| w.kind() == WarningKind::Frozen));

    assert_eq!(compute_split_rhats(&expectands)[0].1, Ok(Statistic::Frozen));
    assert_eq!(compute_min_eesss(&expectands)[0].1, Ok(Statistic::Frozen));
}

#[test]
fn mirrored_chains_have_reference_split_rhat() {
    let mut expectands = Expectands::new();
    expectands
        .insert("x", vec![vec![1.0, 2.0, 3.0, 4.0], vec![4.0, 3.0, 2.0, 1.0]])
        .unwrap();

    let rhat = compute_split_rhats(&expectands)[0]
        .1
        .clone()
        .unwrap()
        .value()
        .unwrap();
    assert_abs_diff_eq!(rhat, 1.7795130420052185, epsilon = 1e-6);

    let config = ExpectandConfig::default();
    let report = check_all_expectand_diagnostics(&expectands, &config, ReportMode::Full);
    let diagnostics = report.get("x").unwrap().outcome.as_ref().unwrap();
    assert!(diagnostics.frozen_chains.is_empty());
    assert!(diagnostics
        .warnings
        .iter()
        .any(|w| matches!(w, ExpectandWarning::SplitRhat { .. })));
}

#[test]
fn healthy_collection_then_histogram() {
    let mut expectands = Expectands::new();
    for (i, name) in ["alpha", "beta", "gamma"].iter().enumerate() {
        expectands
            .insert(*name, normal_chains(4, 2000, 100 + i as u64))
            .unwrap();
    }
    let config = ExpectandConfig::default();
    let mode = ReportMode::auto(expectands.len(), &config);
    assert_eq!(mode, ReportMode::Full);
    let report = check_all_expectand_diagnostics(&expectands, &config, mode);
    assert!(!report.any_warning(), "{}", report);

    let hist = estimate_pushforward(expectands.get("alpha").unwrap(), 8, None).unwrap();
    assert_abs_diff_eq!(hist.total_probability(), 1.0, epsilon = 1e-9);
    assert!(hist.bins.iter().all(|b| b.standard_error >= 0.0));
}

#[test]
fn stan_csv_run_is_checked() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test/stan");
    let csv = StanCsv::read(&[dir.join("chain1.csv"), dir.join("chain2.csv")]).unwrap();

    let config = HmcConfig {
        max_treedepth: csv.max_treedepth().unwrap(),
        ..HmcConfig::default()
    };
    let report = check_all_hmc_diagnostics(&csv.hmc_diagnostics().unwrap(), &config).unwrap();
    assert_eq!(report.divergences.total(), 1);
    assert_eq!(report.treedepth.total(), 1);

    let expectands = csv.expectands().unwrap();
    let report = check_all_expectand_diagnostics(
        &expectands,
        &ExpectandConfig::default(),
        ReportMode::Summary,
    );
    // Ten draws per chain cannot reach the default effective sample size.
    assert_eq!(report.summary().count(WarningKind::LowEess), 2);
}
