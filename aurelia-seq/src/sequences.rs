//! Owned sequence sets: translated sequences, pair enumeration and
//! observed symbol frequencies.

use std::cell::OnceCell;
use std::collections::HashMap;

use aurelia_core::{AureliaError, Result};

use crate::alphabet::Alphabet;
use crate::fasta::FastaRecord;

/// A set of N ≥ 3 named sequences translated over one alphabet.
///
/// Owns both the raw strings (kept for lookup/echo) and the translated
/// symbol-id sequences used by the pair-HMM. Unordered pairs are
/// enumerated in lexicographic `(i < j)` order; [`SequenceSet::pair_index`]
/// maps a pair to its position in that enumeration.
pub struct SequenceSet {
    alphabet: &'static Alphabet,
    names: Vec<String>,
    raw: Vec<String>,
    translated: Vec<Vec<u8>>,
    name_to_id: HashMap<String, usize>,
    observed: OnceCell<Vec<f64>>,
}

impl SequenceSet {
    /// Build a sequence set from parsed records.
    ///
    /// Records are expected in their final id order (the FASTA layer
    /// sorts and de-duplicates). `remove_gaps` strips gap columns during
    /// translation; raw strings keep them.
    ///
    /// # Errors
    ///
    /// `Input` if fewer than 3 sequences remain or any sequence contains
    /// a character outside the alphabet.
    pub fn new(
        records: Vec<FastaRecord>,
        alphabet: &'static Alphabet,
        remove_gaps: bool,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(AureliaError::Input(
                "no sequences found in the input".into(),
            ));
        }
        if records.len() < 3 {
            return Err(AureliaError::Input(format!(
                "distance estimation requires at least 3 sequences, got {}",
                records.len()
            )));
        }

        let mut names = Vec::with_capacity(records.len());
        let mut raw = Vec::with_capacity(records.len());
        let mut translated = Vec::with_capacity(records.len());
        let mut name_to_id = HashMap::with_capacity(records.len());

        for (id, record) in records.into_iter().enumerate() {
            translated.push(alphabet.translate(&record.sequence, remove_gaps)?);
            name_to_id.insert(record.name.clone(), id);
            names.push(record.name);
            raw.push(record.sequence);
        }

        Ok(Self {
            alphabet,
            names,
            raw,
            translated,
            name_to_id,
            observed: OnceCell::new(),
        })
    }

    /// The alphabet the sequences were translated over.
    pub fn alphabet(&self) -> &'static Alphabet {
        self.alphabet
    }

    /// Number of sequences N.
    pub fn sequence_count(&self) -> usize {
        self.names.len()
    }

    /// Name of a sequence.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` is out of range.
    pub fn name(&self, id: usize) -> Result<&str> {
        self.names
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| AureliaError::NotFound(format!("sequence id {}", id)))
    }

    /// Id for a sequence name.
    ///
    /// # Errors
    ///
    /// `NotFound` if no sequence carries the name.
    pub fn id_of(&self, name: &str) -> Result<usize> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| AureliaError::NotFound(format!("sequence named '{}'", name)))
    }

    /// Raw (untranslated) sequence string.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` is out of range.
    pub fn raw_sequence(&self, id: usize) -> Result<&str> {
        self.raw
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| AureliaError::NotFound(format!("sequence id {}", id)))
    }

    /// Translated symbol ids of a sequence.
    pub fn translated(&self, id: usize) -> &[u8] {
        &self.translated[id]
    }

    /// Number of unordered pairs, N·(N−1)/2.
    pub fn pair_count(&self) -> usize {
        let n = self.sequence_count();
        n * (n - 1) / 2
    }

    /// Position of the pair `(i, j)` in the lexicographic enumeration.
    ///
    /// Requires `i < j < N`.
    pub fn pair_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < self.sequence_count());
        let n = self.sequence_count();
        ((2 * n - 3) * i - i * i) / 2 + j - 1
    }

    /// Inverse of [`SequenceSet::pair_index`].
    pub fn pair_at(&self, mut k: usize) -> (usize, usize) {
        let n = self.sequence_count();
        let mut i = 0;
        while k >= n - 1 - i {
            k -= n - 1 - i;
            i += 1;
        }
        (i, i + 1 + k)
    }

    /// Observed per-residue frequencies over all sequences, memoized.
    ///
    /// Gaps are skipped; an ambiguity code over k residues contributes
    /// 1/k to each member. The result has [`Alphabet::size`] entries and
    /// sums to 1 for non-empty input.
    pub fn observed_frequencies(&self) -> &[f64] {
        self.observed.get_or_init(|| {
            let size = self.alphabet.size() as usize;
            let mut freqs = vec![0.0; size];
            let mut count = 0.0;

            for seq in &self.translated {
                for &id in seq {
                    let symbol = self.alphabet.symbol(id);
                    if symbol.is_gap {
                        continue;
                    }
                    count += 1.0;
                    let weight = 1.0 / symbol.class.len() as f64;
                    for &member in &symbol.class {
                        freqs[member as usize] += weight;
                    }
                }
            }

            if count > 0.0 {
                for f in &mut freqs {
                    *f /= count;
                }
            }
            freqs
        })
    }

    /// Observed frequencies restricted to a triplet of sequences,
    /// counting only concrete symbols (no gaps, no ambiguity codes).
    ///
    /// Used by the model-parameter estimator. Falls back to uniform
    /// frequencies if the triplet holds no concrete symbol at all.
    pub fn triplet_frequencies(&self, triplet: [usize; 3]) -> Vec<f64> {
        let size = self.alphabet.size() as usize;
        let mut freqs = vec![0.0; size];
        let mut count = 0.0;

        for &seq_id in &triplet {
            for &id in &self.translated[seq_id] {
                let symbol = self.alphabet.symbol(id);
                if symbol.is_concrete() {
                    freqs[id as usize] += 1.0;
                    count += 1.0;
                }
            }
        }

        if count > 0.0 {
            for f in &mut freqs {
                *f /= count;
            }
        } else {
            freqs.fill(1.0 / size as f64);
        }
        freqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasta::parse_fasta_str;

    fn set_from(fasta: &str, alphabet: &'static Alphabet) -> SequenceSet {
        SequenceSet::new(parse_fasta_str(fasta).unwrap(), alphabet, true).unwrap()
    }

    #[test]
    fn requires_three_sequences() {
        let records = parse_fasta_str(">a\nAC*GT\n>a\nTT\n>b\nGG").unwrap();
        let result = SequenceSet::new(records, Alphabet::nucleotide(), true);
        assert!(result.is_err());
    }

    #[test]
    fn three_sequences_accepted() {
        let set = set_from(">a\nACGT\n>b\nACGA\n>c\nACGG\n", Alphabet::nucleotide());
        assert_eq!(set.sequence_count(), 3);
        assert_eq!(set.pair_count(), 3);
    }

    #[test]
    fn ids_follow_sorted_names() {
        let set = set_from(">z\nAAAA\n>a\nCCCC\n>m\nGGGG\n", Alphabet::nucleotide());
        assert_eq!(set.name(0).unwrap(), "a");
        assert_eq!(set.name(1).unwrap(), "m");
        assert_eq!(set.name(2).unwrap(), "z");
        assert_eq!(set.id_of("z").unwrap(), 2);
        assert_eq!(set.raw_sequence(0).unwrap(), "CCCC");
    }

    #[test]
    fn unknown_lookups_are_not_found() {
        let set = set_from(">a\nACGT\n>b\nACGT\n>c\nACGT\n", Alphabet::nucleotide());
        assert!(set.name(3).is_err());
        assert!(set.id_of("d").is_err());
        assert!(set.raw_sequence(99).is_err());
    }

    #[test]
    fn pair_index_is_a_permutation() {
        for n in 3..=8 {
            let fasta: String = (0..n)
                .map(|i| format!(">s{:02}\nACGT\n", i))
                .collect();
            let set = set_from(&fasta, Alphabet::nucleotide());
            let mut seen = vec![false; set.pair_count()];
            for i in 0..n {
                for j in (i + 1)..n {
                    let k = set.pair_index(i, j);
                    assert!(!seen[k], "pair index {} hit twice (n = {})", k, n);
                    seen[k] = true;
                    assert_eq!(set.pair_at(k), (i, j));
                }
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn gaps_dropped_from_translation_kept_in_raw() {
        let set = set_from(">a\nAC-GT\n>b\nACGT\n>c\nACGT\n", Alphabet::nucleotide());
        assert_eq!(set.translated(0).len(), 4);
        assert_eq!(set.raw_sequence(0).unwrap(), "AC-GT");
    }

    #[test]
    fn observed_frequencies_sum_to_one() {
        let set = set_from(">a\nACGT\n>b\nAAAA\n>c\nTTGG\n", Alphabet::nucleotide());
        let freqs = set.observed_frequencies();
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12, "frequencies sum to {}", sum);
        // 12 symbols: 6 A, 2 C, 3 G... recount: ACGT + AAAA + TTGG
        // A: 1+4 = 5, C: 1, G: 1+2 = 3, T: 1+2 = 3. T index 0, C 1, A 2, G 3.
        assert!((freqs[2] - 5.0 / 12.0).abs() < 1e-12);
        assert!((freqs[1] - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn ambiguity_contributes_fractionally() {
        // N spreads 1/4 over each base; frequencies must still sum to 1.
        let set = set_from(">s1\nACN\n>s2\nACN\n>s3\nACG\n", Alphabet::nucleotide());
        let freqs = set.observed_frequencies();
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        // 9 counted sites. T total: 2 * 1/4 = 0.5. A: 3 + 0.5 = 3.5.
        assert!((freqs[0] - 0.5 / 9.0).abs() < 1e-12);
        assert!((freqs[2] - 3.5 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn gaps_skipped_in_frequencies() {
        let gapped = SequenceSet::new(
            parse_fasta_str(">a\nA-CG\n>b\nAC-G\n>c\nACG-\n").unwrap(),
            Alphabet::nucleotide(),
            false,
        )
        .unwrap();
        let freqs = gapped.observed_frequencies();
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn triplet_frequencies_skip_ambiguous() {
        let set = set_from(">s1\nACN\n>s2\nACN\n>s3\nACG\n", Alphabet::nucleotide());
        let freqs = set.triplet_frequencies([0, 1, 2]);
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        // 7 concrete symbols: 3 A, 3 C, 1 G; the two N are skipped.
        assert!((freqs[2] - 3.0 / 7.0).abs() < 1e-12);
        assert!((freqs[3] - 1.0 / 7.0).abs() < 1e-12);
        assert_eq!(freqs[0], 0.0);
    }

    #[test]
    fn amino_acid_set() {
        let set = set_from(
            ">h0\nENVVDD\n>h1\nENVVDE\n>h2\nSPATQS\n",
            Alphabet::amino_acid(),
        );
        assert_eq!(set.sequence_count(), 3);
        let freqs = set.observed_frequencies();
        assert_eq!(freqs.len(), 20);
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
