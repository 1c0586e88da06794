//! Banded pair-HMM evaluation.
//!
//! Three log-space matrices — M (aligned pair), X (emission from the
//! first sequence only), Y (from the second only) — are filled inside a
//! [`Band`] with either Forward (log-sum-exp) or Viterbi (max)
//! reductions. Match emissions marginalize over the equilibrium ancestor
//! and the discrete-gamma rate categories; insert emissions use the
//! equilibrium frequencies. Ambiguity symbols average uniformly over
//! their class members.

use aurelia_core::{log_sum_exp, log_sum_exp3, AureliaError, Result};
use aurelia_phylo::{IndelModel, SubstitutionModel};
use aurelia_seq::Alphabet;

use crate::band::Band;

/// Which reduction the DP applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Total probability over all alignments (log-sum-exp).
    Forward,
    /// Probability of the single best alignment (max).
    Viterbi,
}

/// One banded score matrix: per-row ranges plus a contiguous value
/// vector addressed through prefix-sum offsets. Reads outside the band
/// yield −∞.
struct BandedMatrix {
    rows: Vec<Option<(usize, usize)>>,
    offsets: Vec<usize>,
    data: Vec<f64>,
}

impl BandedMatrix {
    fn new(rows: Vec<Option<(usize, usize)>>) -> Self {
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        let mut total = 0;
        offsets.push(0);
        for row in &rows {
            total += row.map_or(0, |(lo, hi)| hi - lo + 1);
            offsets.push(total);
        }
        Self {
            rows,
            offsets,
            data: vec![f64::NEG_INFINITY; total],
        }
    }

    fn reset(&mut self) {
        self.data.fill(f64::NEG_INFINITY);
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        match self.rows[i] {
            Some((lo, hi)) if lo <= j && j <= hi => self.data[self.offsets[i] + (j - lo)],
            _ => f64::NEG_INFINITY,
        }
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        if let Some((lo, hi)) = self.rows[i] {
            if lo <= j && j <= hi {
                self.data[self.offsets[i] + (j - lo)] = value;
            }
        }
    }
}

/// Per-`t` emission tables over the full symbol set (ambiguity codes
/// included), in log space.
struct EmissionTable {
    symbols: usize,
    match_log: Vec<f64>,
    single_log: Vec<f64>,
}

impl EmissionTable {
    fn build(subst: &SubstitutionModel, alphabet: &Alphabet, t: f64) -> Result<Self> {
        let k = subst.size();
        let symbols = alphabet.symbol_count();
        let freqs = subst.frequencies();
        let p_mats = subst.probability_matrices(t)?;
        let categories = p_mats.len();
        let weight = 1.0 / categories as f64;

        // Per-category match probabilities over the concrete residues:
        // e_r(a, b) = Σ_anc π_anc · P_r[anc, a] · P_r[anc, b].
        let mut per_category = Vec::with_capacity(categories);
        for p in &p_mats {
            let mut e = vec![0.0; k * k];
            for anc in 0..k {
                let pi = freqs[anc];
                for a in 0..k {
                    let left = pi * p[anc * k + a];
                    if left == 0.0 {
                        continue;
                    }
                    for b in 0..k {
                        e[a * k + b] += left * p[anc * k + b];
                    }
                }
            }
            per_category.push(e);
        }

        // Class-averaged emissions for every symbol pair, mixed over the
        // rate categories by log-sum-exp.
        let log_weight = weight.ln();
        let mut match_log = vec![f64::NEG_INFINITY; symbols * symbols];
        for a in 0..symbols {
            let sa = alphabet.symbol(a as u8);
            if sa.is_gap {
                continue;
            }
            for b in 0..symbols {
                let sb = alphabet.symbol(b as u8);
                if sb.is_gap {
                    continue;
                }
                let scale = 1.0 / (sa.class.len() * sb.class.len()) as f64;
                let mut acc = f64::NEG_INFINITY;
                for e in &per_category {
                    let mut sum = 0.0;
                    for &ma in &sa.class {
                        for &mb in &sb.class {
                            sum += e[ma as usize * k + mb as usize];
                        }
                    }
                    acc = log_sum_exp(acc, log_weight + (sum * scale).ln());
                }
                match_log[a * symbols + b] = acc;
            }
        }

        // Insert emissions: class-averaged equilibrium frequencies.
        let mut single_log = vec![f64::NEG_INFINITY; symbols];
        for a in 0..symbols {
            let sa = alphabet.symbol(a as u8);
            if sa.is_gap {
                continue;
            }
            let mean: f64 = sa
                .class
                .iter()
                .map(|&m| freqs[m as usize])
                .sum::<f64>()
                / sa.class.len() as f64;
            single_log[a] = mean.ln();
        }

        Ok(Self {
            symbols,
            match_log,
            single_log,
        })
    }

    fn pair(&self, a: u8, b: u8) -> f64 {
        self.match_log[a as usize * self.symbols + b as usize]
    }

    fn single(&self, a: u8) -> f64 {
        self.single_log[a as usize]
    }
}

/// A pair-HMM instance bound to one sequence pair, a band and a DP kind.
///
/// The three banded matrices are owned by the instance and reused across
/// re-evaluations at different divergence times; they are released when
/// the instance is dropped, before the next pair is built.
pub struct PairHmm<'a> {
    s1: &'a [u8],
    s2: &'a [u8],
    alphabet: &'static Alphabet,
    subst: &'a SubstitutionModel,
    indel: &'a IndelModel,
    algorithm: Algorithm,
    band: Band,
    mat_m: BandedMatrix,
    mat_x: BandedMatrix,
    mat_y: BandedMatrix,
}

impl<'a> PairHmm<'a> {
    /// Bind a pair-HMM to two translated sequences and a band.
    ///
    /// # Errors
    ///
    /// `Internal` if the band's dimensions do not match the sequences.
    pub fn new(
        s1: &'a [u8],
        s2: &'a [u8],
        alphabet: &'static Alphabet,
        subst: &'a SubstitutionModel,
        indel: &'a IndelModel,
        algorithm: Algorithm,
        band: Band,
    ) -> Result<Self> {
        if band.m() != s1.len() || band.n() != s2.len() {
            return Err(AureliaError::Internal(format!(
                "band is {}x{} but the sequences are {}x{}",
                band.m(),
                band.n(),
                s1.len(),
                s2.len()
            )));
        }
        let mat_m = BandedMatrix::new((0..=band.m()).map(|i| band.match_row(i)).collect());
        let mat_x = BandedMatrix::new((0..=band.m()).map(|i| band.x_row(i)).collect());
        let mat_y = BandedMatrix::new((0..=band.m()).map(|i| band.y_row(i)).collect());
        Ok(Self {
            s1,
            s2,
            alphabet,
            subst,
            indel,
            algorithm,
            band,
            mat_m,
            mat_x,
            mat_y,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Evaluate the banded total score at divergence time `t`.
    ///
    /// Runs one full sweep: transition probabilities and emission tables
    /// are re-derived for `t`, then every in-band cell is filled. The
    /// return value is the Forward or Viterbi total in log space; −∞
    /// signals that the band admits no alignment at this `t`.
    ///
    /// # Errors
    ///
    /// Propagates `Numeric` from inadmissible times and `Internal` if
    /// the substitution model was not calculated.
    pub fn score(&mut self, t: f64) -> Result<f64> {
        let tr = self.indel.transitions(t)?;
        let emit = EmissionTable::build(self.subst, self.alphabet, t)?;

        self.mat_m.reset();
        self.mat_x.reset();
        self.mat_y.reset();

        let (m, n) = (self.s1.len(), self.s2.len());
        let forward = self.algorithm == Algorithm::Forward;
        let reduce2 = |a: f64, b: f64| if forward { log_sum_exp(a, b) } else { a.max(b) };
        let reduce3 = |a: f64, b: f64, c: f64| {
            if forward {
                log_sum_exp3(a, b, c)
            } else {
                a.max(b).max(c)
            }
        };

        self.mat_m.set(0, 0, tr.start_m);
        self.mat_x.set(0, 0, tr.start_x);
        self.mat_y.set(0, 0, tr.start_y);

        for i in 0..=m {
            if i > 0 {
                if let Some((lo, hi)) = self.band.match_row(i) {
                    for j in lo.max(1)..=hi {
                        let e = emit.pair(self.s1[i - 1], self.s2[j - 1]);
                        let best = reduce3(
                            tr.mm + self.mat_m.get(i - 1, j - 1),
                            tr.xm + self.mat_x.get(i - 1, j - 1),
                            tr.ym + self.mat_y.get(i - 1, j - 1),
                        );
                        self.mat_m.set(i, j, e + best);
                    }
                }
                if let Some((lo, hi)) = self.band.x_row(i) {
                    for j in lo..=hi {
                        let e = emit.single(self.s1[i - 1]);
                        let best = reduce2(
                            tr.mx + self.mat_m.get(i - 1, j),
                            tr.xx + self.mat_x.get(i - 1, j),
                        );
                        self.mat_x.set(i, j, e + best);
                    }
                }
            }
            if let Some((lo, hi)) = self.band.y_row(i) {
                for j in lo.max(1)..=hi {
                    let e = emit.single(self.s2[j - 1]);
                    let best = reduce2(
                        tr.my + self.mat_m.get(i, j - 1),
                        tr.yy + self.mat_y.get(i, j - 1),
                    );
                    self.mat_y.set(i, j, e + best);
                }
            }
        }

        Ok(reduce3(
            self.mat_m.get(m, n),
            self.mat_x.get(m, n),
            self.mat_y.get(m, n),
        ))
    }
}
