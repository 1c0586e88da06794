//! The pair driver: band, optimize, cache.
//!
//! For every unordered sequence pair the driver derives a band plan from
//! the k-mer guide distance, binds a Forward (or Viterbi) pair-HMM to
//! the band, minimizes the negative log-likelihood over the divergence
//! time with Brent's method, and caches the optimum. A catastrophic band
//! miss is logged and tolerated: the pair still receives the time the
//! optimizer settled on, and the batch continues.

use aurelia_core::{AureliaError, Result, MIN_MATRIX_LIKELIHOOD};
use aurelia_align::{plan_band, Algorithm, PairHmm};
use aurelia_phylo::{IndelModel, SubstitutionModel};
use aurelia_seq::{guide_distances, SequenceSet};
use log::{info, warn};
use std::fmt::Write as _;

use crate::brent::brent_minimize;

/// Optimizes and caches one divergence time per sequence pair.
pub struct PairwiseEstimator {
    set: SequenceSet,
    subst: SubstitutionModel,
    indel: IndelModel,
    algorithm: Algorithm,
    guide: Vec<f64>,
    times: Vec<Option<f64>>,
    computed: usize,
}

impl PairwiseEstimator {
    /// Bind a driver to a sequence set and fully configured models.
    ///
    /// The substitution model must already be calculated.
    pub fn new(
        set: SequenceSet,
        subst: SubstitutionModel,
        indel: IndelModel,
        algorithm: Algorithm,
    ) -> Result<Self> {
        // Fail fast if the model was handed over uncalculated.
        subst.probability_matrices(0.0)?;
        let guide = guide_distances(&set);
        let times = vec![None; set.pair_count()];
        Ok(Self {
            set,
            subst,
            indel,
            algorithm,
            guide,
            times,
            computed: 0,
        })
    }

    /// The owned sequence set.
    pub fn sequences(&self) -> &SequenceSet {
        &self.set
    }

    /// How many pairs have been optimized so far (each pair runs its DP
    /// exactly once, however often it is queried).
    pub fn pairs_computed(&self) -> usize {
        self.computed
    }

    /// Divergence time between two sequence ids, in either order.
    ///
    /// `distance(i, i)` is 0; other entries are computed on first use
    /// and cached.
    ///
    /// # Errors
    ///
    /// `NotFound` for an id outside the set.
    pub fn distance(&mut self, i: usize, j: usize) -> Result<f64> {
        let n = self.set.sequence_count();
        if i >= n || j >= n {
            return Err(AureliaError::NotFound(format!(
                "sequence id {} outside 0..{}",
                i.max(j),
                n
            )));
        }
        if i == j {
            return Ok(0.0);
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let k = self.set.pair_index(lo, hi);
        self.optimize_pair(k)
    }

    /// Optimize pair `k` (in `pair_index` order), or return its cached
    /// time.
    ///
    /// # Errors
    ///
    /// `NotFound` for an index outside the pair enumeration; numeric
    /// errors from the models propagate.
    pub fn optimize_pair(&mut self, k: usize) -> Result<f64> {
        if k >= self.times.len() {
            return Err(AureliaError::NotFound(format!(
                "pair index {} outside 0..{}",
                k,
                self.times.len()
            )));
        }
        if let Some(t) = self.times[k] {
            return Ok(t);
        }

        let (i, j) = self.set.pair_at(k);
        let s1 = self.set.translated(i);
        let s2 = self.set.translated(j);
        let plan = plan_band(s1.len(), s2.len(), self.guide[k]);

        let bound = self.indel.divergence_bound();
        let hi = plan.t_hi.unwrap_or(bound).min(bound);
        let lo = plan.t_lo.min(hi);
        let seed = plan.t_seed.clamp(lo, hi);

        let mut hmm = PairHmm::new(
            s1,
            s2,
            self.set.alphabet(),
            &self.subst,
            &self.indel,
            self.algorithm,
            plan.band,
        )?;
        let (t_star, neg_score) = brent_minimize(
            |t| match hmm.score(t) {
                Ok(score) => -score,
                Err(_) => f64::INFINITY,
            },
            lo,
            hi,
            seed,
            plan.accuracy,
        );

        let score = -neg_score;
        if !score.is_finite() || score <= MIN_MATRIX_LIKELIHOOD / 2.0 {
            warn!(
                "pair {} (ids {}, {}): zero-probability likelihood at t = {:.6}; band miss or underflow",
                k, i, j, t_star
            );
        } else {
            info!(
                "pair {} (ids {}, {}): t = {:.6}, log-likelihood = {:.4}",
                k, i, j, t_star, score
            );
        }

        self.times[k] = Some(t_star);
        self.computed += 1;
        Ok(t_star)
    }

    /// Optimize every pair in enumeration order.
    ///
    /// # Errors
    ///
    /// Propagates the first model error; individual band misses do not
    /// abort the batch.
    pub fn optimize_all(&mut self) -> Result<()> {
        for k in 0..self.times.len() {
            self.optimize_pair(k)?;
        }
        Ok(())
    }

    /// Lower-triangular distance-matrix text: the first line holds N,
    /// each following line a sequence name and its distances to the
    /// lower-id sequences.
    ///
    /// # Errors
    ///
    /// Propagates errors from pair optimization.
    pub fn distance_matrix(&mut self) -> Result<String> {
        self.optimize_all()?;
        let n = self.set.sequence_count();
        let mut out = String::new();
        let _ = writeln!(out, "{}", n);
        for i in 0..n {
            let _ = write!(out, "{}", self.set.name(i)?);
            for j in 0..i {
                let _ = write!(out, " {:.6}", self.distance(i, j)?);
            }
            out.push('\n');
        }
        Ok(out)
    }
}
