//! A Rust library implementing convergence and mixing diagnostics for ensembles of Markov
//! chains, such as split Gelman Rubin potential scale reduction (R hat), effective sample
//! size, generalized Pareto tail shape estimates (xi hat), Hamiltonian Monte Carlo
//! transition checks, and histogram estimates with Markov chain Monte Carlo standard errors.
//!
//! This crate is sampler agnostic and intended to work with the outputs of any MCMC sampler
//! (e.g. Stan, PyMC, Turing.jl, etc.).  Samplers are connected by building an
//! [`Expectands`] collection and an [`HmcDiagnostics`] bundle; the [`stan_csv`] module
//! does this for CmdStan output files.
#[macro_use]
extern crate approx;

/// Single-pass mean and variance accumulation
pub mod accumulator;
/// Diagnostic thresholds
pub mod config;
/// Error types
pub mod error;
/// Effective Sample Size (ESS) and integrated autocorrelation time
pub mod ess;
/// Ensemble Markov chain Monte Carlo estimators
pub mod estimate;
/// Collections of named expectands and their diagnostic reports
pub mod expectand;
/// Hamiltonian Monte Carlo transition diagnostics
pub mod hmc;
/// Histogram estimates of pushforward distributions
pub mod pushforward;
/// Gelman-Rubin split potential scale reducation (Rhat)
pub mod rhat;
/// Reading CmdStan CSV output
pub mod stan_csv;
/// Convenience utilities like chain splitting and shape validation
pub mod utils;
/// Generalized Pareto tail shape estimation (xihat)
pub mod xihat;

/// One-dimensional vector of numeric values
pub type Array1 = Vec<f64>;
/// Two dimensional vector of vectors of numeric values, indexed by chain then draw
pub type Array2 = Vec<Array1>;

pub use crate::accumulator::Accumulator;
pub use crate::config::{ExpectandConfig, HmcConfig, TailConfig};
pub use crate::error::DiagnosticError;
pub use crate::ess::compute_min_eesss;
pub use crate::expectand::{check_all_expectand_diagnostics, Expectands, ReportMode};
pub use crate::hmc::{check_all_hmc_diagnostics, AdaptationInfoProvider, HmcDiagnostics};
pub use crate::pushforward::{estimate_pushforward, HistogramEstimate};
pub use crate::rhat::compute_split_rhats;

/// A statistic that is either computed or undefined because the underlying
/// values never moved.
///
/// A constant expectand yields `Frozen` rather than a number, and never passes
/// a threshold check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic<T = f64> {
    Value(T),
    Frozen,
}

impl<T> Statistic<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Statistic::Value(v) => Some(v),
            Statistic::Frozen => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, Statistic::Frozen)
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Statistic<U> {
        match self {
            Statistic::Value(v) => Statistic::Value(f(v)),
            Statistic::Frozen => Statistic::Frozen,
        }
    }
}
