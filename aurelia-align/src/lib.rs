//! Banded pair-HMM machinery for the Aurelia distance estimator.
//!
//! - **Bands** — per-row column ranges for the three DP matrices plus
//!   the Brent search interval derived from a rough distance
//!   ([`Band`], [`BandPlan`])
//! - **The DP engine** — log-space Forward and Viterbi evaluation of the
//!   three-state pair HMM restricted to a band ([`PairHmm`])

pub mod band;
pub mod pair_hmm;

pub use band::{plan_band, Band, BandPlan};
pub use pair_hmm::{Algorithm, PairHmm};
