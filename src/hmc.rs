use crate::accumulator::Accumulator;
use crate::config::HmcConfig;
use crate::error::{DiagnosticError, Result};
use crate::utils::validate_chain;
use crate::{Array1, Array2, Statistic};
use std::fmt;

/// Source of the adapted sampler configuration of each chain.
///
/// Keeps the diagnostics independent of how a particular sampler stores its
/// adaptation output.
pub trait AdaptationInfoProvider {
    /// Adapted integrator step size of each chain.
    fn step_sizes(&self) -> Vec<f64>;
    /// Adapted inverse metric (diagonal elements) of each chain.
    fn inv_metrics(&self) -> Vec<Array1>;
}

/// Per-transition and per-chain sampler diagnostics for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct HmcDiagnostics {
    /// Divergence flag of every transition, indexed by chain then iteration.
    pub divergent: Vec<Vec<bool>>,
    /// Tree depth reached by every transition.
    pub treedepth: Vec<Vec<u32>>,
    /// Energy fraction of missing information of each chain.
    pub efmi: Vec<Statistic>,
    /// Acceptance statistic of every transition.
    pub accept_stat: Array2,
    pub step_sizes: Vec<f64>,
    pub inv_metrics: Vec<Array1>,
}

impl HmcDiagnostics {
    /// Builds the diagnostics from per-transition values, computing E-FMI from
    /// the Hamiltonian energy of each transition.
    pub fn new<A: AdaptationInfoProvider>(
        divergent: Vec<Vec<bool>>,
        treedepth: Vec<Vec<u32>>,
        accept_stat: Array2,
        energy: &Array2,
        adaptation: &A,
    ) -> Result<Self> {
        let efmi = energy
            .iter()
            .map(|chain| compute_efmi(chain))
            .collect::<Result<Vec<_>>>()?;
        let diagnostics = Self {
            divergent,
            treedepth,
            efmi,
            accept_stat,
            step_sizes: adaptation.step_sizes(),
            inv_metrics: adaptation.inv_metrics(),
        };
        diagnostics.validate()?;
        Ok(diagnostics)
    }

    pub fn num_chains(&self) -> usize {
        self.divergent.len()
    }

    /// Checks that every field covers the same chains and that the
    /// per-transition fields have one entry per iteration.
    pub fn validate(&self) -> Result<()> {
        let expected = self.num_chains();
        if expected == 0 {
            return Err(DiagnosticError::EmptyChains);
        }
        let counts = [
            ("treedepth", self.treedepth.len()),
            ("efmi", self.efmi.len()),
            ("accept_stat", self.accept_stat.len()),
            ("step size", self.step_sizes.len()),
            ("inverse metric", self.inv_metrics.len()),
        ];
        for &(diagnostic, found) in counts.iter() {
            if found != expected {
                return Err(DiagnosticError::ChainCountMismatch {
                    diagnostic,
                    expected,
                    found,
                });
            }
        }
        for c in 0..expected {
            let num_draws = self.divergent[c].len();
            if num_draws == 0 {
                return Err(DiagnosticError::EmptyChain { chain: c });
            }
            for &found in [self.treedepth[c].len(), self.accept_stat[c].len()].iter() {
                if found != num_draws {
                    return Err(DiagnosticError::UnequalChainLengths {
                        chain: c,
                        expected: num_draws,
                        found,
                    });
                }
            }
            validate_chain(&self.accept_stat[c]).map_err(|e| match e {
                DiagnosticError::NonFinite { draw, value, .. } => DiagnosticError::NonFinite {
                    chain: c,
                    draw,
                    value,
                },
                other => other,
            })?;
        }
        Ok(())
    }
}

impl AdaptationInfoProvider for HmcDiagnostics {
    fn step_sizes(&self) -> Vec<f64> {
        self.step_sizes.clone()
    }

    fn inv_metrics(&self) -> Vec<Array1> {
        self.inv_metrics.clone()
    }
}

/// Energy fraction of missing information of one chain,
/// `sum((E[n] - E[n-1])^2) / sum((E[n] - mean(E))^2)`.
///
/// Small values mean the momentum resampling barely moves the energy, so the
/// sampler struggles to explore the tails of the target.
pub fn compute_efmi(energy: &[f64]) -> Result<Statistic> {
    let n = validate_chain(energy)?;
    if n < 2 {
        return Err(DiagnosticError::TooFewDraws {
            statistic: "E-FMI",
            required: 2,
            found: n,
        });
    }
    let acc: Accumulator = energy.iter().collect();
    if acc.is_frozen() {
        return Ok(Statistic::Frozen);
    }
    let numerator = energy.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>();
    let sum_squares = acc.variance() * (n - 1) as f64;
    Ok(Statistic::Value(numerator / sum_squares))
}

/// Divergent transitions per chain.
#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceCheck {
    pub per_chain: Vec<usize>,
    pub num_transitions: usize,
}

impl DivergenceCheck {
    pub fn total(&self) -> usize {
        self.per_chain.iter().sum()
    }

    pub fn fraction(&self) -> f64 {
        self.total() as f64 / self.num_transitions as f64
    }

    pub fn warning(&self) -> bool {
        self.total() > 0
    }
}

/// Transitions per chain that stopped at the maximum tree depth.
#[derive(Debug, Clone, PartialEq)]
pub struct TreedepthCheck {
    pub max_treedepth: u32,
    pub per_chain: Vec<usize>,
    pub num_transitions: usize,
}

impl TreedepthCheck {
    pub fn total(&self) -> usize {
        self.per_chain.iter().sum()
    }

    pub fn fraction(&self) -> f64 {
        self.total() as f64 / self.num_transitions as f64
    }

    pub fn warning(&self) -> bool {
        self.total() > 0
    }
}

/// E-FMI of each chain against the configured lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct EfmiCheck {
    pub threshold: f64,
    pub per_chain: Vec<Statistic>,
    /// Chains below the threshold.  A frozen energy counts as below.
    pub low_chains: Vec<usize>,
}

impl EfmiCheck {
    pub fn warning(&self) -> bool {
        !self.low_chains.is_empty()
    }
}

/// Average acceptance statistic of each chain against the adaptation target.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptStatCheck {
    pub adapt_target: f64,
    pub tolerance: f64,
    pub per_chain_mean: Vec<f64>,
    pub off_target_chains: Vec<usize>,
}

impl AcceptStatCheck {
    pub fn warning(&self) -> bool {
        !self.off_target_chains.is_empty()
    }
}

/// Identifies one of the checks in an [`HmcReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmcCheck {
    Divergences,
    Treedepth,
    Efmi,
    AcceptStat,
}

/// Results of [`check_all_hmc_diagnostics`].  Every check is independent; none
/// is fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct HmcReport {
    pub divergences: DivergenceCheck,
    pub treedepth: TreedepthCheck,
    pub efmi: EfmiCheck,
    pub accept_stat: AcceptStatCheck,
}

impl HmcReport {
    /// Checks that raised a warning, in reporting order.
    pub fn warnings(&self) -> Vec<HmcCheck> {
        let mut warnings = Vec::new();
        if self.divergences.warning() {
            warnings.push(HmcCheck::Divergences);
        }
        if self.treedepth.warning() {
            warnings.push(HmcCheck::Treedepth);
        }
        if self.efmi.warning() {
            warnings.push(HmcCheck::Efmi);
        }
        if self.accept_stat.warning() {
            warnings.push(HmcCheck::AcceptStat);
        }
        warnings
    }

    pub fn any_warning(&self) -> bool {
        !self.warnings().is_empty()
    }
}

impl fmt::Display for HmcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.any_warning() {
            return writeln!(
                f,
                "All Hamiltonian Monte Carlo diagnostics are consistent with accurate \
                 Markov chain Monte Carlo."
            );
        }
        if self.divergences.warning() {
            for (c, &count) in self.divergences.per_chain.iter().enumerate() {
                if count > 0 {
                    writeln!(f, "Chain {}: {} divergent transitions.", c + 1, count)?;
                }
            }
            writeln!(
                f,
                "  {} of {} transitions ({:.1}%) diverged; divergent trajectories suggest \
                 that the estimators may be biased.",
                self.divergences.total(),
                self.divergences.num_transitions,
                100.0 * self.divergences.fraction()
            )?;
        }
        if self.treedepth.warning() {
            for (c, &count) in self.treedepth.per_chain.iter().enumerate() {
                if count > 0 {
                    writeln!(
                        f,
                        "Chain {}: {} transitions hit the maximum tree depth of {}.",
                        c + 1,
                        count,
                        self.treedepth.max_treedepth
                    )?;
                }
            }
            writeln!(
                f,
                "  Saturated trajectories ({:.1}% of transitions) limit exploration.",
                100.0 * self.treedepth.fraction()
            )?;
        }
        for &c in &self.efmi.low_chains {
            match self.efmi.per_chain[c] {
                Statistic::Value(efmi) => writeln!(
                    f,
                    "Chain {}: E-FMI = {:.3} is below {}.",
                    c + 1,
                    efmi,
                    self.efmi.threshold
                )?,
                Statistic::Frozen => writeln!(f, "Chain {}: the energy never changed.", c + 1)?,
            }
        }
        for &c in &self.accept_stat.off_target_chains {
            writeln!(
                f,
                "Chain {}: average acceptance statistic {:.3} is more than {} from the \
                 adaptation target {}.",
                c + 1,
                self.accept_stat.per_chain_mean[c],
                self.accept_stat.tolerance,
                self.accept_stat.adapt_target
            )?;
        }
        Ok(())
    }
}

pub fn check_divergences(diagnostics: &HmcDiagnostics) -> DivergenceCheck {
    DivergenceCheck {
        per_chain: diagnostics
            .divergent
            .iter()
            .map(|chain| chain.iter().filter(|&&d| d).count())
            .collect(),
        num_transitions: diagnostics.divergent.iter().map(Vec::len).sum(),
    }
}

pub fn check_treedepth(diagnostics: &HmcDiagnostics, config: &HmcConfig) -> TreedepthCheck {
    TreedepthCheck {
        max_treedepth: config.max_treedepth,
        per_chain: diagnostics
            .treedepth
            .iter()
            .map(|chain| chain.iter().filter(|&&d| d >= config.max_treedepth).count())
            .collect(),
        num_transitions: diagnostics.treedepth.iter().map(Vec::len).sum(),
    }
}

pub fn check_efmi(diagnostics: &HmcDiagnostics, config: &HmcConfig) -> EfmiCheck {
    let low_chains = diagnostics
        .efmi
        .iter()
        .enumerate()
        .filter(|(_, efmi)| match efmi {
            Statistic::Value(v) => *v < config.efmi_threshold,
            Statistic::Frozen => true,
        })
        .map(|(c, _)| c)
        .collect();
    EfmiCheck {
        threshold: config.efmi_threshold,
        per_chain: diagnostics.efmi.clone(),
        low_chains,
    }
}

pub fn check_accept_stat(diagnostics: &HmcDiagnostics, config: &HmcConfig) -> AcceptStatCheck {
    let per_chain_mean: Vec<f64> = diagnostics
        .accept_stat
        .iter()
        .map(|chain| chain.iter().collect::<Accumulator>().mean())
        .collect();
    let off_target_chains = per_chain_mean
        .iter()
        .enumerate()
        .filter(|(_, mean)| (**mean - config.adapt_target).abs() > config.accept_stat_tolerance)
        .map(|(c, _)| c)
        .collect();
    AcceptStatCheck {
        adapt_target: config.adapt_target,
        tolerance: config.accept_stat_tolerance,
        per_chain_mean,
        off_target_chains,
    }
}

/// Runs every Hamiltonian Monte Carlo check.
pub fn check_all_hmc_diagnostics(
    diagnostics: &HmcDiagnostics,
    config: &HmcConfig,
) -> Result<HmcReport> {
    diagnostics.validate()?;
    let report = HmcReport {
        divergences: check_divergences(diagnostics),
        treedepth: check_treedepth(diagnostics, config),
        efmi: check_efmi(diagnostics, config),
        accept_stat: check_accept_stat(diagnostics, config),
    };
    for check in report.warnings() {
        log::debug!("hmc check {:?} raised a warning", check);
    }
    Ok(report)
}

/// Adapted configuration of each chain, for comparing adaptation across chains.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationSummary {
    pub step_sizes: Vec<f64>,
    /// `(min, max)` of each chain's inverse metric elements.
    pub inv_metric_ranges: Vec<(f64, f64)>,
}

impl AdaptationSummary {
    pub fn from_provider<A: AdaptationInfoProvider + ?Sized>(adaptation: &A) -> Self {
        let inv_metric_ranges = adaptation
            .inv_metrics()
            .iter()
            .map(|elements| {
                elements
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                        (lo.min(x), hi.max(x))
                    })
            })
            .collect();
        Self {
            step_sizes: adaptation.step_sizes(),
            inv_metric_ranges,
        }
    }

    /// Ratio of the largest to the smallest adapted step size across chains.
    pub fn step_size_spread(&self) -> f64 {
        let (lo, hi) = self
            .step_sizes
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        hi / lo
    }
}
