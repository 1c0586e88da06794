//! Negative-binomial indel model.
//!
//! Two scalar parameters: the negative-binomial success probability `p`
//! (gap continuation is `1 − p`) and the per-site gap-opening rate `λ`.
//! For a divergence time `t` the probability of opening a gap is
//! `g(t) = 1 − exp(−λ·t)`, which yields the row-stochastic transition
//! matrix of the three-state pair HMM.

use aurelia_core::{AureliaError, Result};

/// Hard ceiling on divergence times regardless of λ.
const MAX_DIVERGENCE: f64 = 5.0;

/// Gap-opening probability at which the match row would degenerate; the
/// divergence bound keeps `g` strictly below it.
const MAX_GAP_OPENING: f64 = 0.49;

/// The indel model: `(p, λ)`.
#[derive(Debug, Clone)]
pub struct IndelModel {
    nb_probability: f64,
    rate: f64,
}

/// Log-space pair-HMM transition probabilities at a fixed time.
///
/// Rows sum to 1 in probability space: `M → {M, X, Y}` is
/// `{1−2g, g, g}`, `X → {M, X}` is `{p, 1−p}`, `Y` mirrors `X`. The
/// start distribution equals the M row; end transitions are unit, so the
/// DP total is read directly from the terminal cells.
#[derive(Debug, Clone, Copy)]
pub struct IndelTransitions {
    pub mm: f64,
    pub mx: f64,
    pub my: f64,
    pub xm: f64,
    pub xx: f64,
    pub ym: f64,
    pub yy: f64,
    pub start_m: f64,
    pub start_x: f64,
    pub start_y: f64,
}

impl IndelModel {
    /// Create an indel model with validation.
    ///
    /// # Errors
    ///
    /// `Config` unless `0 < p < 1` and `λ > 0`.
    pub fn new(nb_probability: f64, rate: f64) -> Result<Self> {
        if !(nb_probability > 0.0 && nb_probability < 1.0) {
            return Err(AureliaError::Config(format!(
                "indel NB probability = {} must lie in (0, 1)",
                nb_probability
            )));
        }
        if !(rate > 0.0) || !rate.is_finite() {
            return Err(AureliaError::Config(format!(
                "indel rate = {} must be positive and finite",
                rate
            )));
        }
        Ok(Self {
            nb_probability,
            rate,
        })
    }

    /// The negative-binomial success probability `p`.
    pub fn nb_probability(&self) -> f64 {
        self.nb_probability
    }

    /// The gap-opening rate `λ`.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Gap-opening probability over time `t`.
    pub fn gap_opening(&self, t: f64) -> f64 {
        1.0 - (-self.rate * t).exp()
    }

    /// Largest admissible divergence time for this λ.
    ///
    /// Keeps the gap-opening probability below [`MAX_GAP_OPENING`] so the
    /// M-row self-transition `1 − 2g` stays strictly positive, capped at
    /// [`MAX_DIVERGENCE`] overall.
    pub fn divergence_bound(&self) -> f64 {
        let saturation = -(1.0 - MAX_GAP_OPENING).ln() / self.rate;
        saturation.min(MAX_DIVERGENCE)
    }

    /// Log-space transition probabilities at time `t`.
    ///
    /// # Errors
    ///
    /// `Numeric` if `t` is negative/non-finite or lies beyond the
    /// admissible region (`g ≥ 1/2`).
    pub fn transitions(&self, t: f64) -> Result<IndelTransitions> {
        if !(t >= 0.0) || !t.is_finite() {
            return Err(AureliaError::Numeric(format!(
                "divergence time {} must be finite and non-negative",
                t
            )));
        }
        let g = self.gap_opening(t);
        if g >= 0.5 {
            return Err(AureliaError::Numeric(format!(
                "gap-opening probability {} at t = {} leaves no mass for matches",
                g, t
            )));
        }
        let p = self.nb_probability;
        let extend = 1.0 - p;

        let mm = (1.0 - 2.0 * g).ln();
        let gx = g.ln();
        Ok(IndelTransitions {
            mm,
            mx: gx,
            my: gx,
            xm: p.ln(),
            xx: extend.ln(),
            ym: p.ln(),
            yy: extend.ln(),
            start_m: mm,
            start_x: gx,
            start_y: gx,
        })
    }
}
