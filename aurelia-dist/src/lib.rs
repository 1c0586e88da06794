//! Pairwise divergence-time estimation for the Aurelia workspace.
//!
//! Ties the lower layers together:
//!
//! - **Brent minimization** — [`brent_minimize`], the 1-D optimizer run
//!   on every pair's likelihood surface
//! - **Model-parameter estimation** — [`estimate`], the triplet-sampled
//!   pre-pass producing global substitution/indel/alpha parameters
//! - **The pair driver** — [`PairwiseEstimator`], banding, optimizing
//!   and caching one divergence time per sequence pair
//! - **The facade** — [`DistanceEstimator`] and [`Sequences`], opaque
//!   handles with per-handle error slots for external callers

pub mod brent;
pub mod driver;
pub mod estimator;
pub mod facade;

pub use brent::brent_minimize;
pub use driver::PairwiseEstimator;
pub use estimator::{estimate, EstimatedParameters};
pub use facade::{DistanceEstimator, Sequences};
