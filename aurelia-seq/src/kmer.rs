//! Fast k-mer guide distances.
//!
//! The pair driver needs a rough divergence estimate per pair before any
//! likelihood is computed: it centers the DP band and seeds the Brent
//! search. A shared-k-mer fraction is cheap, alignment-free and fully
//! deterministic.

use std::collections::HashMap;

use crate::sequences::SequenceSet;

/// k-mer length for nucleotide sequences.
const NUCLEOTIDE_K: usize = 7;
/// k-mer length for amino-acid sequences.
const AMINO_ACID_K: usize = 3;

/// Floor on the shared fraction, capping the distance at −ln(1e-3).
const MIN_SHARED_FRACTION: f64 = 1e-3;

/// Guide distance between two translated sequences.
///
/// Counts, with multiplicity, how many of the shorter sequence's k-mers
/// occur in the longer one and returns `−ln` of that fraction. Identical
/// sequences score 0; unrelated sequences saturate near `−ln(1e-3)`.
pub fn guide_distance(a: &[u8], b: &[u8], k: usize) -> f64 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let k = k.min(short.len());
    if k == 0 {
        return -MIN_SHARED_FRACTION.ln();
    }

    let mut counts: HashMap<&[u8], usize> = HashMap::new();
    for window in long.windows(k) {
        *counts.entry(window).or_insert(0) += 1;
    }

    let total = short.len() - k + 1;
    let mut shared = 0usize;
    for window in short.windows(k) {
        if let Some(c) = counts.get_mut(window) {
            if *c > 0 {
                *c -= 1;
                shared += 1;
            }
        }
    }

    let fraction = (shared as f64 / total as f64).max(MIN_SHARED_FRACTION);
    -fraction.ln()
}

/// Guide distances for every unordered pair of a sequence set, indexed
/// by [`SequenceSet::pair_index`].
pub fn guide_distances(set: &SequenceSet) -> Vec<f64> {
    let k = if set.alphabet().size() == 4 {
        NUCLEOTIDE_K
    } else {
        AMINO_ACID_K
    };

    let n = set.sequence_count();
    let mut distances = Vec::with_capacity(set.pair_count());
    for i in 0..n {
        for j in (i + 1)..n {
            distances.push(guide_distance(set.translated(i), set.translated(j), k));
        }
    }
    distances
}
