//! Shared primitives for the Aurelia pairwise distance estimator.
//!
//! `aurelia-core` provides the foundation that the other Aurelia crates
//! build on:
//!
//! - **Error types** — [`AureliaError`] and [`Result`] for structured
//!   error handling across the crate boundary
//! - **Log-space arithmetic** — [`log_sum_exp`] and friends for
//!   numerically stable probability sums

pub mod error;
pub mod prob;

pub use error::{AureliaError, Result};
pub use prob::{log_sum_exp, log_sum_exp3, MIN_MATRIX_LIKELIHOOD};
