//! Structured error types for the Aurelia crates.

use thiserror::Error;

/// Unified error type for all Aurelia operations.
#[derive(Debug, Error)]
pub enum AureliaError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad input data (empty input, too few sequences, unknown symbol,
    /// malformed FASTA)
    #[error("input error: {0}")]
    Input(String),

    /// Nonsensical configuration (negative alpha, zero rate categories,
    /// wrong substitution parameter count)
    #[error("configuration error: {0}")]
    Config(String),

    /// Numerical failure (eigendecomposition did not converge,
    /// probability underflow, non-finite score)
    #[error("numeric error: {0}")]
    Numeric(String),

    /// Lookup of a sequence name or id that does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Broken internal invariant; never expected to surface to users
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the Aurelia crates.
pub type Result<T> = std::result::Result<T, AureliaError>;
