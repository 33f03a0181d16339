use thiserror::Error;

/// Errors raised when a chain matrix (or a request made against one) cannot
/// support the requested statistic.
///
/// Degenerate but well-formed input, like a chain stuck at a single value, is
/// not an error. It is reported through [`Statistic::Frozen`](crate::Statistic).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiagnosticError {
    #[error("no chains supplied")]
    EmptyChains,

    #[error("chain {chain} has no draws")]
    EmptyChain { chain: usize },

    #[error("chain {chain} has {found} draws but chain 0 has {expected}")]
    UnequalChainLengths {
        chain: usize,
        expected: usize,
        found: usize,
    },

    #[error("{statistic} needs at least {required} draws per chain, found {found}")]
    TooFewDraws {
        statistic: &'static str,
        required: usize,
        found: usize,
    },

    #[error("{statistic} needs at least {required} chains, found {found}")]
    TooFewChains {
        statistic: &'static str,
        required: usize,
        found: usize,
    },

    #[error("non-finite value {value} at chain {chain}, draw {draw}")]
    NonFinite { chain: usize, draw: usize, value: f64 },

    #[error("negative excess {value} over the tail threshold")]
    NegativeExcess { value: f64 },

    #[error("histogram needs at least one bin")]
    ZeroBins,

    #[error("invalid histogram range [{lower}, {upper}]")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("all values equal {value}, histogram range is degenerate")]
    DegenerateRange { value: f64 },

    #[error("expectand `{0}` was already added")]
    DuplicateExpectand(String),

    #[error("{diagnostic} covers {found} chains, expected {expected}")]
    ChainCountMismatch {
        diagnostic: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("autocovariance failed for chain {chain}")]
    Autocovariance { chain: usize },
}

pub type Result<T, E = DiagnosticError> = std::result::Result<T, E>;
