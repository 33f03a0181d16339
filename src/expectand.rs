use crate::accumulator::Accumulator;
use crate::config::ExpectandConfig;
use crate::error::{DiagnosticError, Result};
use crate::ess::compute_chain_eesss;
use crate::rhat::split_potential_scale_reduction_factor;
use crate::utils::validate_chains;
use crate::xihat::{compute_tail_xi_hats, TailXiHats};
use crate::{Array2, Statistic};
use std::collections::BTreeMap;
use std::fmt;

/// Named chain matrices, one per expectand, kept in insertion order.
///
/// This is the only way expectand values enter the diagnostics, so supporting
/// a new sampler means producing one of these.  Shapes are not checked on
/// insertion; a malformed matrix fails only its own diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectands {
    entries: Vec<(String, Array2)>,
}

impl Expectands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expectand, rejecting names that are already present.
    pub fn insert<S: Into<String>>(&mut self, name: S, chains: Array2) -> Result<()> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(DiagnosticError::DuplicateExpectand(name));
        }
        self.entries.push((name, chains));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Array2> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, chains)| chains)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array2)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Kinds of expectand warnings, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningKind {
    Frozen,
    TailXiHat,
    SplitRhat,
    LowEess,
}

impl WarningKind {
    fn advice(self) -> &'static str {
        match self {
            WarningKind::Frozen => {
                "Zero variance suggests a stuck sampler or an expectand that does not \
                 depend on the sampled state."
            }
            WarningKind::TailXiHat => {
                "Large tail xihats suggest that the expectand might not be sufficiently \
                 integrable for a central limit theorem to hold."
            }
            WarningKind::SplitRhat => {
                "Split Rhat larger than the threshold suggests the chains have not all \
                 reached the same equilibrium."
            }
            WarningKind::LowEess => {
                "Small empirical effective sample sizes make the autocorrelation, and \
                 hence every standard error, unreliable."
            }
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::Frozen => write!(f, "frozen chains"),
            WarningKind::TailXiHat => write!(f, "large tail xihats"),
            WarningKind::SplitRhat => write!(f, "large split Rhat"),
            WarningKind::LowEess => write!(f, "small empirical effective sample size"),
        }
    }
}

/// One threshold violation for one expectand.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectandWarning {
    Frozen { chain: usize },
    TailXiHat { chain: usize, xi_hats: TailXiHats },
    SplitRhat { rhat: f64 },
    LowEess { chain: usize, eess: f64 },
}

impl ExpectandWarning {
    pub fn kind(&self) -> WarningKind {
        match self {
            ExpectandWarning::Frozen { .. } => WarningKind::Frozen,
            ExpectandWarning::TailXiHat { .. } => WarningKind::TailXiHat,
            ExpectandWarning::SplitRhat { .. } => WarningKind::SplitRhat,
            ExpectandWarning::LowEess { .. } => WarningKind::LowEess,
        }
    }

    fn describe(&self, config: &ExpectandConfig) -> String {
        match self {
            ExpectandWarning::Frozen { chain } => {
                format!("Chain {}: values are constant (zero variance).", chain + 1)
            }
            ExpectandWarning::TailXiHat { chain, xi_hats } => {
                let threshold = config.xi_hat_threshold;
                let lower = xi_hats.lower >= threshold;
                let upper = xi_hats.upper >= threshold;
                let which = match (lower, upper) {
                    (true, true) => "Both left and right tail xihats",
                    (true, false) => "Left tail xihat",
                    _ => "Right tail xihat",
                };
                format!(
                    "Chain {}: {} ({:.3}, {:.3}) exceed {}.",
                    chain + 1,
                    which,
                    xi_hats.lower,
                    xi_hats.upper,
                    threshold
                )
            }
            ExpectandWarning::SplitRhat { rhat } => {
                format!("Split Rhat ({:.3}) exceeds {}.", rhat, config.max_split_rhat)
            }
            ExpectandWarning::LowEess { chain, eess } => format!(
                "Chain {}: empirical effective sample size ({:.1}) is below {}.",
                chain + 1,
                eess,
                config.min_eess_per_chain
            ),
        }
    }
}

/// Every statistic computed for one expectand.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectandDiagnostics {
    pub name: String,
    /// Indices of chains whose values never changed.
    pub frozen_chains: Vec<usize>,
    /// Per-chain tail shapes, empty when any chain is frozen.
    pub tail_xi_hats: Result<Vec<TailXiHats>>,
    /// `Frozen` when skipped because a chain is frozen.
    pub split_rhat: Result<Statistic>,
    /// Per-chain empirical effective sample sizes, empty when any chain is frozen.
    pub chain_eesss: Result<Vec<f64>>,
    pub warnings: Vec<ExpectandWarning>,
}

impl ExpectandDiagnostics {
    pub fn is_frozen(&self) -> bool {
        !self.frozen_chains.is_empty()
    }

    /// Statistics that could not be computed, with the reason.
    pub fn undefined(&self) -> Vec<(&'static str, &DiagnosticError)> {
        let mut undefined = Vec::new();
        if let Err(e) = &self.tail_xi_hats {
            undefined.push(("Tail xihats", e));
        }
        if let Err(e) = &self.split_rhat {
            undefined.push(("Split Rhat", e));
        }
        if let Err(e) = &self.chain_eesss {
            undefined.push(("Empirical effective sample size", e));
        }
        undefined
    }

    /// True when there is a warning or a statistic is undefined.
    pub fn needs_attention(&self) -> bool {
        !self.warnings.is_empty() || !self.undefined().is_empty()
    }
}

/// Diagnostics of one expectand, or the reason they could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectandResult {
    pub name: String,
    pub outcome: Result<ExpectandDiagnostics>,
}

/// Runs every expectand check on one chain matrix.
///
/// The frozen check runs first; a frozen chain makes tail shapes, split Rhat
/// and effective sample sizes meaningless, so they are skipped and only the
/// frozen warning is reported.  A statistic that cannot be computed, e.g. for
/// too few draws, is recorded as an error of its own and the remaining checks
/// still run.  Only a malformed chain matrix fails the whole expectand.
pub fn check_expectand(
    name: &str,
    chains: &Array2,
    config: &ExpectandConfig,
) -> Result<ExpectandDiagnostics> {
    validate_chains(chains)?;

    let frozen_chains: Vec<usize> = chains
        .iter()
        .enumerate()
        .filter(|(_, chain)| chain.iter().collect::<Accumulator>().is_frozen())
        .map(|(c, _)| c)
        .collect();

    let mut diagnostics = ExpectandDiagnostics {
        name: name.to_string(),
        frozen_chains,
        tail_xi_hats: Ok(Vec::new()),
        split_rhat: Ok(Statistic::Frozen),
        chain_eesss: Ok(Vec::new()),
        warnings: Vec::new(),
    };

    if diagnostics.is_frozen() {
        if !config.exclude_zero_variance {
            diagnostics.warnings = diagnostics
                .frozen_chains
                .iter()
                .map(|&chain| ExpectandWarning::Frozen { chain })
                .collect();
        }
        log::debug!(
            "{}: frozen chains {:?}, skipping remaining checks",
            name,
            diagnostics.frozen_chains
        );
        return Ok(diagnostics);
    }

    // a non-frozen chain always has two distinct values, so no tail is frozen
    diagnostics.tail_xi_hats = chains
        .iter()
        .map(|values| compute_tail_xi_hats(values, &config.tail))
        .collect::<Result<Vec<_>>>()
        .map(|stats| stats.into_iter().filter_map(Statistic::value).collect());
    if let Ok(tail_xi_hats) = &diagnostics.tail_xi_hats {
        for (chain, &xi_hats) in tail_xi_hats.iter().enumerate() {
            if xi_hats.max() >= config.xi_hat_threshold {
                diagnostics
                    .warnings
                    .push(ExpectandWarning::TailXiHat { chain, xi_hats });
            }
        }
    }

    diagnostics.split_rhat = split_potential_scale_reduction_factor(chains);
    if let Ok(Statistic::Value(rhat)) = diagnostics.split_rhat {
        if rhat > config.max_split_rhat {
            diagnostics.warnings.push(ExpectandWarning::SplitRhat { rhat });
        }
    }

    diagnostics.chain_eesss = compute_chain_eesss(chains)
        .map(|eesss| eesss.into_iter().filter_map(Statistic::value).collect());
    if let Ok(chain_eesss) = &diagnostics.chain_eesss {
        for (chain, &eess) in chain_eesss.iter().enumerate() {
            if eess < config.min_eess_per_chain {
                diagnostics
                    .warnings
                    .push(ExpectandWarning::LowEess { chain, eess });
            }
        }
    }

    for (statistic, e) in diagnostics.undefined() {
        log::debug!("{}: {} undefined: {}", name, statistic, e);
    }

    log::debug!(
        "{}: split rhat {:?}, {} warnings",
        name,
        diagnostics.split_rhat,
        diagnostics.warnings.len()
    );
    Ok(diagnostics)
}

/// How an [`ExpectandReport`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// One line per warning per expectand.
    Full,
    /// Distinct warning kinds with counts and the expectands that raised them.
    Summary,
}

impl ReportMode {
    /// Summarizes once the collection holds more than
    /// `config.summary_threshold` expectands.
    pub fn auto(num_expectands: usize, config: &ExpectandConfig) -> Self {
        if num_expectands > config.summary_threshold {
            ReportMode::Summary
        } else {
            ReportMode::Full
        }
    }
}

/// Results of [`check_all_expectand_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectandReport {
    pub mode: ReportMode,
    pub config: ExpectandConfig,
    pub results: Vec<ExpectandResult>,
}

/// Warning kinds across a collection, with the names of the expectands that
/// raised each kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarningSummary {
    pub by_kind: BTreeMap<WarningKind, Vec<String>>,
    pub failed: Vec<(String, DiagnosticError)>,
}

impl WarningSummary {
    pub fn count(&self, kind: WarningKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }
}

impl ExpectandReport {
    /// True when any expectand raised a warning or could not be checked.
    pub fn any_warning(&self) -> bool {
        self.results.iter().any(|r| match &r.outcome {
            Ok(d) => d.needs_attention(),
            Err(_) => true,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DiagnosticError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.name.as_str(), e)))
    }

    pub fn get(&self, name: &str) -> Option<&ExpectandResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn summary(&self) -> WarningSummary {
        let mut summary = WarningSummary::default();
        for result in &self.results {
            match &result.outcome {
                Ok(diagnostics) => {
                    for warning in &diagnostics.warnings {
                        let names = summary.by_kind.entry(warning.kind()).or_default();
                        if names.last() != Some(&result.name) {
                            names.push(result.name.clone());
                        }
                    }
                    for (_, e) in diagnostics.undefined() {
                        summary.failed.push((result.name.clone(), e.clone()));
                    }
                }
                Err(e) => summary.failed.push((result.name.clone(), e.clone())),
            }
        }
        summary
    }

    fn fmt_full(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clean = true;
        for result in &self.results {
            match &result.outcome {
                Ok(diagnostics) if !diagnostics.needs_attention() => {}
                Ok(diagnostics) => {
                    clean = false;
                    writeln!(f, "{}:", result.name)?;
                    for warning in &diagnostics.warnings {
                        writeln!(f, "  {}", warning.describe(&self.config))?;
                    }
                    for (statistic, e) in diagnostics.undefined() {
                        writeln!(f, "  {} could not be computed: {}.", statistic, e)?;
                    }
                }
                Err(e) => {
                    clean = false;
                    writeln!(f, "{}:", result.name)?;
                    writeln!(f, "  Diagnostics could not be computed: {}.", e)?;
                }
            }
        }
        if clean {
            writeln!(f, "All expectands checked appear to be behaving well.")?;
        }
        Ok(())
    }

    fn fmt_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.summary();
        if summary.by_kind.is_empty() && summary.failed.is_empty() {
            return writeln!(f, "All expectands checked appear to be behaving well.");
        }
        for (kind, names) in &summary.by_kind {
            writeln!(
                f,
                "{} of {} expectands show {}: {}.",
                names.len(),
                self.results.len(),
                kind,
                names.join(", ")
            )?;
            writeln!(f, "  {}", kind.advice())?;
        }
        if !summary.failed.is_empty() {
            let mut names: Vec<&str> = summary.failed.iter().map(|(n, _)| n.as_str()).collect();
            names.dedup();
            writeln!(
                f,
                "{} of {} expectands could not be checked: {}.",
                names.len(),
                self.results.len(),
                names.join(", ")
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ExpectandReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ReportMode::Full => self.fmt_full(f),
            ReportMode::Summary => self.fmt_summary(f),
        }
    }
}

/// Checks every expectand in the collection.  A failure on one expectand is
/// recorded in its result and does not stop the others.
pub fn check_all_expectand_diagnostics(
    expectands: &Expectands,
    config: &ExpectandConfig,
    mode: ReportMode,
) -> ExpectandReport {
    let results = expectands
        .iter()
        .map(|(name, chains)| {
            let outcome = check_expectand(name, chains, config);
            if let Err(e) = &outcome {
                log::warn!("skipping diagnostics for {}: {}", name, e);
            }
            ExpectandResult {
                name: name.to_string(),
                outcome,
            }
        })
        .collect();
    ExpectandReport {
        mode,
        config: config.clone(),
        results,
    }
}
