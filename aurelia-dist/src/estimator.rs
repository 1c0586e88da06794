//! Model-parameter estimation (the pre-pass).
//!
//! Before any pairwise optimization, global substitution, indel and
//! gamma-shape parameters are estimated from a small, deterministically
//! sampled set of sequence triplets: pairs are ordered by their k-mer
//! guide distance, each pair is completed by the sequence closest to
//! both members, and the joint likelihood of all triplet pairs under a
//! permissive full-band Viterbi pair-HMM is maximized by BFGS over a
//! transformed unconstrained parameter vector.
//!
//! User-supplied parameters are never touched: fixed values stay fixed
//! in the objective and only the requested quantities are estimated.

use std::collections::BTreeSet;

use aurelia_core::{AureliaError, Result};
use aurelia_align::{Algorithm, Band, PairHmm};
use aurelia_phylo::{IndelModel, ModelKind, SubstitutionModel};
use aurelia_seq::{guide_distances, SequenceSet};
use log::debug;

/// Cap on sampled triplets.
const MAX_TRIPLETS: usize = 5;

/// BFGS iteration cap.
const MAX_ITERATIONS: usize = 30;

/// Gradient-norm stopping threshold.
const GRADIENT_TOL: f64 = 1e-4;

/// Relative forward-difference step.
const GRADIENT_STEP: f64 = 1e-4;

/// Starting values for estimated quantities.
const INITIAL_LAMBDA: f64 = 0.05;
const INITIAL_NB_PROBABILITY: f64 = 0.5;
const INITIAL_KAPPA: f64 = 2.0;

/// Output of the pre-pass.
#[derive(Debug, Clone)]
pub struct EstimatedParameters {
    /// Negative-binomial success probability `p`.
    pub nb_probability: f64,
    /// Gap-opening rate `λ`.
    pub rate: f64,
    /// Gamma shape.
    pub alpha: f64,
    /// Substitution parameters (empty for the empirical protein models).
    pub substitution: Vec<f64>,
}

/// Layout of the unconstrained BFGS vector.
struct ParameterLayout {
    subst: Option<(usize, usize)>,
    indel: Option<usize>,
    alpha: Option<usize>,
    times: usize,
    len: usize,
}

impl ParameterLayout {
    fn new(
        kind: ModelKind,
        estimate_subst: bool,
        estimate_indel: bool,
        estimate_alpha: bool,
        pair_count: usize,
    ) -> Self {
        let mut len = 0;
        let subst = if estimate_subst && kind.parameter_count() > 0 {
            let span = (len, kind.parameter_count());
            len += kind.parameter_count();
            Some(span)
        } else {
            None
        };
        let indel = if estimate_indel {
            let at = len;
            len += 2;
            Some(at)
        } else {
            None
        };
        let alpha = if estimate_alpha {
            let at = len;
            len += 1;
            Some(at)
        } else {
            None
        };
        let times = len;
        len += pair_count;
        Self {
            subst,
            indel,
            alpha,
            times,
            len,
        }
    }
}

fn sigmoid(u: f64) -> f64 {
    1.0 / (1.0 + (-u).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Concrete model quantities decoded from the unconstrained vector.
struct DecodedPoint {
    subst: Vec<f64>,
    nb_probability: f64,
    lambda: f64,
    alpha: f64,
    times: Vec<f64>,
}

struct Objective<'a> {
    set: &'a SequenceSet,
    kind: ModelKind,
    categories: usize,
    pairs: Vec<(usize, usize)>,
    freqs: Vec<f64>,
    fixed_subst: Vec<f64>,
    fixed_indel: (f64, f64),
    fixed_alpha: f64,
    layout: ParameterLayout,
}

impl<'a> Objective<'a> {
    fn decode(&self, x: &[f64]) -> DecodedPoint {
        let subst = match self.layout.subst {
            Some((at, count)) => (0..count)
                .map(|i| x[at + i].clamp(-6.0, 6.0).exp())
                .collect(),
            None => self.fixed_subst.clone(),
        };
        let (nb_probability, lambda) = match self.layout.indel {
            Some(at) => (
                sigmoid(x[at].clamp(-7.0, 7.0)),
                x[at + 1].clamp(-9.0, 1.5).exp(),
            ),
            None => self.fixed_indel,
        };
        let alpha = match self.layout.alpha {
            Some(at) => x[at].clamp(-3.0, 3.0).exp(),
            None => self.fixed_alpha,
        };
        let times = (0..self.pairs.len())
            .map(|i| x[self.layout.times + i].clamp(-7.0, 1.8).exp())
            .collect();
        DecodedPoint {
            subst,
            nb_probability,
            lambda,
            alpha,
            times,
        }
    }

    /// Negative joint Viterbi log-likelihood; `+inf` on any
    /// inadmissible point so the line search backs off.
    fn evaluate(&self, x: &[f64]) -> f64 {
        let point = self.decode(x);
        match self.evaluate_point(&point) {
            Ok(value) => value,
            Err(_) => f64::INFINITY,
        }
    }

    fn evaluate_point(&self, point: &DecodedPoint) -> Result<f64> {
        let mut subst = SubstitutionModel::new(self.kind, self.categories, point.alpha)?;
        subst.set_observed_frequencies(&self.freqs)?;
        subst.set_parameters(&point.subst)?;
        subst.calculate()?;
        let indel = IndelModel::new(point.nb_probability, point.lambda)?;
        let bound = indel.divergence_bound() * 0.999;

        let alphabet = self.set.alphabet();
        let mut total = 0.0;
        for (idx, &(i, j)) in self.pairs.iter().enumerate() {
            let s1 = self.set.translated(i);
            let s2 = self.set.translated(j);
            let band = Band::full(s1.len(), s2.len());
            let mut hmm = PairHmm::new(
                s1,
                s2,
                alphabet,
                &subst,
                &indel,
                Algorithm::Viterbi,
                band,
            )?;
            let score = hmm.score(point.times[idx].min(bound))?;
            if !score.is_finite() {
                return Err(AureliaError::Numeric(
                    "triplet likelihood underflow".into(),
                ));
            }
            total += score;
        }
        Ok(-total)
    }
}

/// Deterministic triplet sampling: pairs in ascending guide-distance
/// order, each completed by the sequence minimizing the summed guide
/// distance to both members; duplicate member sets are skipped.
fn select_triplets(set: &SequenceSet, guide: &[f64]) -> Vec<[usize; 3]> {
    let n = set.sequence_count();

    let mut order: Vec<usize> = (0..set.pair_count()).collect();
    order.sort_by(|&a, &b| {
        guide[a]
            .partial_cmp(&guide[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let pair_distance = |a: usize, b: usize| -> f64 {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        guide[set.pair_index(lo, hi)]
    };

    let mut taken: BTreeSet<[usize; 3]> = BTreeSet::new();
    let mut triplets = Vec::new();
    for &k in &order {
        if triplets.len() >= MAX_TRIPLETS {
            break;
        }
        let (i, j) = set.pair_at(k);
        let third = match (0..n).filter(|&c| c != i && c != j).min_by(|&a, &b| {
            let da = pair_distance(i, a) + pair_distance(j, a);
            let db = pair_distance(i, b) + pair_distance(j, b);
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        }) {
            Some(third) => third,
            None => continue,
        };
        let mut members = [i, j, third];
        members.sort_unstable();
        if taken.insert(members) {
            triplets.push(members);
        }
    }
    triplets
}

/// Run the pre-pass.
///
/// `user_indel` / `user_subst` pin those quantities instead of
/// estimating them; `estimate_alpha` controls the gamma shape. `alpha`
/// is both the fixed value and the starting point when estimating.
///
/// # Errors
///
/// Propagates configuration and numeric errors from model construction;
/// `Numeric` if the objective is inadmissible at every probed point.
pub fn estimate(
    set: &SequenceSet,
    kind: ModelKind,
    categories: usize,
    alpha: f64,
    estimate_alpha: bool,
    user_indel: Option<(f64, f64)>,
    user_subst: Option<&[f64]>,
) -> Result<EstimatedParameters> {
    let guide = guide_distances(set);
    let triplets = select_triplets(set, &guide);

    let mut pair_set: BTreeSet<(usize, usize)> = BTreeSet::new();
    for &[a, b, c] in &triplets {
        pair_set.insert((a, b));
        pair_set.insert((a, c));
        pair_set.insert((b, c));
    }
    let pairs: Vec<(usize, usize)> = pair_set.into_iter().collect();

    // Concrete-symbol frequencies, averaged over the sampled triplets.
    let size = set.alphabet().size() as usize;
    let mut freqs = vec![0.0; size];
    for &triplet in &triplets {
        let tf = set.triplet_frequencies(triplet);
        for (f, t) in freqs.iter_mut().zip(tf) {
            *f += t / triplets.len() as f64;
        }
    }

    let estimate_indel = user_indel.is_none();
    let estimate_subst = user_subst.is_none() && kind.parameter_count() > 0;
    let layout = ParameterLayout::new(
        kind,
        estimate_subst,
        estimate_indel,
        estimate_alpha,
        pairs.len(),
    );

    debug!(
        "estimating parameters from {} triplets ({} pairs, {} coordinates)",
        triplets.len(),
        pairs.len(),
        layout.len
    );

    let initial_subst = match kind {
        ModelKind::Hky85 => vec![INITIAL_KAPPA],
        _ => vec![1.0; kind.parameter_count()],
    };

    let mut x0 = vec![0.0; layout.len];
    if let Some((at, count)) = layout.subst {
        for i in 0..count {
            x0[at + i] = initial_subst[i].ln();
        }
    }
    if let Some(at) = layout.indel {
        x0[at] = logit(INITIAL_NB_PROBABILITY);
        x0[at + 1] = INITIAL_LAMBDA.ln();
    }
    if let Some(at) = layout.alpha {
        x0[at] = alpha.clamp(0.05, 20.0).ln();
    }
    for (idx, &(i, j)) in pairs.iter().enumerate() {
        let d = guide[set.pair_index(i, j)].clamp(0.05, 2.0);
        x0[layout.times + idx] = d.ln();
    }

    let objective = Objective {
        set,
        kind,
        categories,
        pairs,
        freqs,
        fixed_subst: user_subst.map(|s| s.to_vec()).unwrap_or(initial_subst),
        fixed_indel: user_indel.unwrap_or((INITIAL_NB_PROBABILITY, INITIAL_LAMBDA)),
        fixed_alpha: alpha,
        layout,
    };

    let solution = bfgs(|x| objective.evaluate(x), x0)?;
    let point = objective.decode(&solution);

    debug!(
        "estimated indel = ({:.4}, {:.4}), alpha = {:.4}, subst = {:?}",
        point.nb_probability, point.lambda, point.alpha, point.subst
    );

    Ok(EstimatedParameters {
        nb_probability: point.nb_probability,
        rate: point.lambda,
        alpha: point.alpha,
        substitution: if kind.parameter_count() > 0 {
            point.subst
        } else {
            Vec::new()
        },
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn forward_gradient<F>(f: &mut F, x: &[f64], fx: f64) -> Vec<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut g = vec![0.0; x.len()];
    let mut probe = x.to_vec();
    for i in 0..x.len() {
        let h = GRADIENT_STEP * x[i].abs().max(1.0);
        probe[i] = x[i] + h;
        let fp = f(&probe);
        probe[i] = x[i];
        g[i] = if fp.is_finite() { (fp - fx) / h } else { 0.0 };
    }
    g
}

/// BFGS with Armijo backtracking on an unconstrained vector.
///
/// Returns the best point found. The inverse Hessian approximation is
/// reset to the identity whenever the search direction stops being a
/// descent direction.
fn bfgs<F>(mut f: F, x0: Vec<f64>) -> Result<Vec<f64>>
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0;
    let mut fx = f(&x);
    if !fx.is_finite() {
        return Err(AureliaError::Numeric(
            "model estimation objective is inadmissible at the starting point".into(),
        ));
    }

    let identity = |h: &mut Vec<Vec<f64>>| {
        for (i, row) in h.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = if i == j { 1.0 } else { 0.0 };
            }
        }
    };

    let mut h = vec![vec![0.0; n]; n];
    identity(&mut h);
    let mut g = forward_gradient(&mut f, &x, fx);

    for _ in 0..MAX_ITERATIONS {
        let norm = dot(&g, &g).sqrt();
        if norm < GRADIENT_TOL {
            break;
        }

        // Direction d = −H·g, with a steepest-descent reset if the
        // quasi-Newton direction is unusable.
        let mut d: Vec<f64> = h
            .iter()
            .map(|row| -dot(row, &g))
            .collect();
        if dot(&d, &g) >= 0.0 {
            identity(&mut h);
            d = g.iter().map(|v| -v).collect();
        }

        // Armijo backtracking.
        let slope = dot(&g, &d);
        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..30 {
            let candidate: Vec<f64> =
                x.iter().zip(&d).map(|(xi, di)| xi + step * di).collect();
            let fc = f(&candidate);
            if fc.is_finite() && fc <= fx + 1e-4 * step * slope {
                accepted = Some((candidate, fc));
                break;
            }
            step *= 0.5;
        }
        let (x_new, fx_new) = match accepted {
            Some(pair) => pair,
            None => break,
        };

        let g_new = forward_gradient(&mut f, &x_new, fx_new);

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            // H ← (I − s yᵀ/sy) H (I − y sᵀ/sy) + s sᵀ/sy
            let hy: Vec<f64> = h.iter().map(|row| dot(row, &y)).collect();
            let yhy = dot(&y, &hy);
            for i in 0..n {
                for j in 0..n {
                    h[i][j] += -(s[i] * hy[j] + hy[i] * s[j]) / sy
                        + (1.0 + yhy / sy) * s[i] * s[j] / sy;
                }
            }
        }

        x = x_new;
        fx = fx_new;
        g = g_new;
    }

    Ok(x)
}
