//! Evolutionary models for the Aurelia distance estimator.
//!
//! - **Nucleotide models** — GTR and HKY85 rate matrices over the
//!   `T C A G` symbol order ([`GtrParams`], [`hky85_rates`])
//! - **Protein models** — JTT, LG and WAG with the published
//!   exchangeabilities and equilibrium frequencies
//! - **Rate variation** — discrete-gamma site-rate categories
//!   ([`GammaRates`])
//! - **The unified model object** — [`SubstitutionModel`], caching the
//!   eigendecomposition of the symmetrized generator and producing
//!   per-category transition matrices `P_r(t)`
//! - **Indel model** — negative-binomial gap model mapping `(p, λ, t)`
//!   to pair-HMM transition probabilities ([`IndelModel`])

pub mod indel;
pub mod models;
pub mod protein_models;
pub mod subst_model;

pub use indel::{IndelModel, IndelTransitions};
pub use models::{hky85_rates, GammaRates, GtrParams};
pub use subst_model::{ModelKind, SubstitutionModel};
