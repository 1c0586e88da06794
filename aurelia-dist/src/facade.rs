//! The boundary facade: opaque handles for external callers.
//!
//! [`DistanceEstimator`] is the builder: feed it FASTA input and
//! optional parameter overrides, then execute one of the model variants.
//! Execution yields a [`Sequences`] handle owning the sequence set and
//! the pair driver. Both handles keep a single last-error slot: failing
//! operations return `None`/NaN and record a message, successful ones
//! clear it.

use std::path::Path;

use aurelia_align::Algorithm;
use aurelia_phylo::{IndelModel, ModelKind, SubstitutionModel};
use aurelia_seq::{parse_fasta_file, parse_fasta_str, Alphabet, FastaRecord, SequenceSet};
use aurelia_core::{AureliaError, Result};

use crate::driver::PairwiseEstimator;
use crate::estimator;

/// Default gamma shape when the user neither sets nor estimates alpha.
pub const DEFAULT_ALPHA: f64 = 0.5;
/// Default number of gamma rate categories.
pub const DEFAULT_CATEGORIES: usize = 4;

/// Builder handle: input plus parameter configuration.
///
/// Parameters left unset are estimated by the pre-pass; set parameters
/// are used as-is and never overwritten.
pub struct DistanceEstimator {
    records: Option<Vec<FastaRecord>>,
    indel: Option<(f64, f64)>,
    alpha: Option<f64>,
    categories: usize,
    last_error: Option<String>,
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl DistanceEstimator {
    pub fn new() -> Self {
        Self {
            records: None,
            indel: None,
            alpha: None,
            categories: DEFAULT_CATEGORIES,
            last_error: None,
        }
    }

    /// Parse FASTA text as the input. Returns false (and records the
    /// error) on malformed input.
    pub fn set_input(&mut self, fasta: &str) -> bool {
        self.store_input(parse_fasta_str(fasta))
    }

    /// Parse a FASTA file as the input.
    pub fn set_input_file(&mut self, path: impl AsRef<Path>) -> bool {
        self.store_input(parse_fasta_file(path))
    }

    fn store_input(&mut self, parsed: Result<Vec<FastaRecord>>) -> bool {
        match parsed {
            Ok(records) => {
                self.records = Some(records);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.records = None;
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Fix the indel parameters instead of estimating them.
    pub fn set_indel_parameters(&mut self, nb_probability: f64, rate: f64) {
        self.indel = Some((nb_probability, rate));
    }

    /// Estimate the indel parameters again.
    pub fn unset_indel_parameters(&mut self) {
        self.indel = None;
    }

    /// Fix the gamma shape instead of estimating it.
    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = Some(alpha);
    }

    /// Estimate the gamma shape again.
    pub fn unset_alpha(&mut self) {
        self.alpha = None;
    }

    /// Set the number of discrete-gamma rate categories.
    pub fn set_categories(&mut self, categories: usize) {
        self.categories = categories;
    }

    /// Restore the default category count.
    pub fn unset_categories(&mut self) {
        self.categories = DEFAULT_CATEGORIES;
    }

    /// The message recorded by the last failing operation, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// GTR with user-supplied exchangeabilities.
    pub fn execute_gtr(&mut self, params: [f64; 5]) -> Option<Sequences> {
        self.execute(ModelKind::Gtr, Some(params.to_vec()))
    }

    /// GTR with estimated exchangeabilities.
    pub fn execute_gtr_estimated(&mut self) -> Option<Sequences> {
        self.execute(ModelKind::Gtr, None)
    }

    /// HKY85 with a user-supplied transition/transversion ratio.
    pub fn execute_hky85(&mut self, kappa: f64) -> Option<Sequences> {
        self.execute(ModelKind::Hky85, Some(vec![kappa]))
    }

    /// HKY85 with an estimated transition/transversion ratio.
    pub fn execute_hky85_estimated(&mut self) -> Option<Sequences> {
        self.execute(ModelKind::Hky85, None)
    }

    /// The JTT amino-acid model.
    pub fn execute_jtt(&mut self) -> Option<Sequences> {
        self.execute(ModelKind::Jtt, None)
    }

    /// The LG amino-acid model.
    pub fn execute_lg(&mut self) -> Option<Sequences> {
        self.execute(ModelKind::Lg, None)
    }

    /// The WAG amino-acid model.
    pub fn execute_wag(&mut self) -> Option<Sequences> {
        self.execute(ModelKind::Wag, None)
    }

    fn execute(&mut self, kind: ModelKind, user_subst: Option<Vec<f64>>) -> Option<Sequences> {
        match self.run(kind, user_subst) {
            Ok(sequences) => {
                self.last_error = None;
                Some(sequences)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    fn run(&self, kind: ModelKind, user_subst: Option<Vec<f64>>) -> Result<Sequences> {
        let records = self
            .records
            .clone()
            .ok_or_else(|| AureliaError::Input("no input has been set".into()))?;

        let alphabet = if kind.is_nucleotide() {
            Alphabet::nucleotide()
        } else {
            Alphabet::amino_acid()
        };
        let set = SequenceSet::new(records, alphabet, true)?;

        let estimate_alpha = self.alpha.is_none();
        let needs_estimation = estimate_alpha
            || self.indel.is_none()
            || (user_subst.is_none() && kind.parameter_count() > 0);
        let alpha0 = self.alpha.unwrap_or(DEFAULT_ALPHA);

        let (indel_params, alpha, subst_params) = if needs_estimation {
            let estimated = estimator::estimate(
                &set,
                kind,
                self.categories,
                alpha0,
                estimate_alpha,
                self.indel,
                user_subst.as_deref(),
            )?;
            (
                self.indel
                    .unwrap_or((estimated.nb_probability, estimated.rate)),
                if estimate_alpha {
                    estimated.alpha
                } else {
                    alpha0
                },
                user_subst.unwrap_or(estimated.substitution),
            )
        } else {
            // Everything was user-supplied; the pre-pass is skipped and
            // only the guide distances (computed by the driver) remain.
            let indel = self.indel.ok_or_else(|| {
                AureliaError::Internal("indel parameters missing without estimation".into())
            })?;
            (indel, alpha0, user_subst.unwrap_or_default())
        };

        let mut subst = SubstitutionModel::new(kind, self.categories, alpha)?;
        subst.set_observed_frequencies(set.observed_frequencies())?;
        subst.set_parameters(&subst_params)?;
        subst.calculate()?;
        let indel = IndelModel::new(indel_params.0, indel_params.1)?;

        let driver = PairwiseEstimator::new(set, subst, indel, Algorithm::Forward)?;
        Ok(Sequences {
            driver,
            last_error: None,
        })
    }
}

/// Handle over an executed sequence set: queries and lazily computed
/// divergence times.
pub struct Sequences {
    driver: PairwiseEstimator,
    last_error: Option<String>,
}

impl Sequences {
    /// Number of sequences.
    pub fn count(&self) -> usize {
        self.driver.sequences().sequence_count()
    }

    /// Name of a sequence id, or `None` (with the error recorded).
    pub fn name(&mut self, id: usize) -> Option<&str> {
        match self.driver.sequences().name(id) {
            Ok(_) => self.last_error = None,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return None;
            }
        }
        self.driver.sequences().name(id).ok()
    }

    /// Raw sequence string of a sequence id.
    pub fn sequence(&mut self, id: usize) -> Option<&str> {
        match self.driver.sequences().raw_sequence(id) {
            Ok(_) => self.last_error = None,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return None;
            }
        }
        self.driver.sequences().raw_sequence(id).ok()
    }

    /// Raw sequence string looked up by name.
    pub fn sequence_by_name(&mut self, name: &str) -> Option<&str> {
        let id = match self.driver.sequences().id_of(name) {
            Ok(id) => id,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return None;
            }
        };
        self.sequence(id)
    }

    /// Divergence time between two ids, in either order; 0 on the
    /// diagonal. Returns NaN and records the error on failure.
    pub fn distance(&mut self, id1: usize, id2: usize) -> f64 {
        match self.driver.distance(id1, id2) {
            Ok(d) => {
                self.last_error = None;
                d
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                f64::NAN
            }
        }
    }

    /// Divergence time looked up by names; both must resolve.
    pub fn distance_by_names(&mut self, name1: &str, name2: &str) -> f64 {
        let ids = self
            .driver
            .sequences()
            .id_of(name1)
            .and_then(|a| self.driver.sequences().id_of(name2).map(|b| (a, b)));
        match ids {
            Ok((a, b)) => self.distance(a, b),
            Err(e) => {
                self.last_error = Some(e.to_string());
                f64::NAN
            }
        }
    }

    /// Lower-triangular distance-matrix text (first line N, then one
    /// line per sequence: name and the distances to lower ids).
    pub fn distance_matrix(&mut self) -> Option<String> {
        match self.driver.distance_matrix() {
            Ok(text) => {
                self.last_error = None;
                Some(text)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// Test hook: number of pairs whose DP has actually run.
    pub fn pairs_computed(&self) -> usize {
        self.driver.pairs_computed()
    }

    /// The message recorded by the last failing operation, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTEIN_FIXTURE: &str = ">H0\n\
ENVVDDTSDRPTICQKWNTTSAAISKYDFLSFYPHYRPASVETFLNLLLK\n\
>H4\n\
ENVVDDKSDRPTICQKWNATSAAISKYNFLEFYPHVRTASVEMFLNLLLK\n\
>H21\n\
SPATQSSKDDALLSMAATVGEASLDKRSHIFSFPSMHVRTVTSDLSGLAF\n\
>H26\n\
SSLTQSSKDDEILSMIAIVGDACIDWRSHIVSFSYIHVLTVTSNLSGINF\n\
>H35\n\
SKASQENKTDQLLKRDAIVGEACIDKKKHNFGYKSVRVRSVTTNLAGLAF\n";

    fn fixed_param_estimator(fasta: &str) -> DistanceEstimator {
        let mut be = DistanceEstimator::new();
        be.set_indel_parameters(0.5, 0.02);
        be.set_alpha(0.5);
        assert!(be.set_input(fasta));
        be
    }

    #[test]
    fn identical_sequences_have_zero_distance() {
        let mut be = fixed_param_estimator(
            ">s1\nACGTACGT\n>s2\nACGTACGT\n>s3\nACGAACGT\n",
        );
        let mut seqs = be.execute_hky85(2.0).expect("execution failed");
        let d = seqs.distance(0, 1);
        assert!(d < 1e-4, "identical pair distance = {}", d);
        assert_eq!(seqs.distance(0, 0), 0.0);
    }

    #[test]
    fn duplicate_names_collapse_and_fail_the_count_check() {
        let mut be = fixed_param_estimator(">a\nAC*GT\n>a\nTT\n>b\nGG");
        assert!(be.execute_hky85(2.0).is_none());
        let message = be.last_error().expect("error slot must be set");
        assert!(message.contains("3"), "unexpected message: {}", message);
    }

    #[test]
    fn iupac_codes_are_accepted() {
        let mut be = fixed_param_estimator(">s1\nACN\n>s2\nACN\n>s3\nACG\n");
        let mut seqs = be.execute_hky85(2.0).expect("IUPAC input must execute");
        assert_eq!(seqs.count(), 3);
        let d = seqs.distance(0, 2);
        assert!(d.is_finite() && d >= 0.0);
    }

    #[test]
    fn unknown_characters_are_rejected() {
        let mut be = fixed_param_estimator(">s1\nACQT\n>s2\nACGT\n>s3\nACGT\n");
        assert!(be.execute_hky85(2.0).is_none());
        assert!(be.last_error().is_some());
    }

    #[test]
    fn distance_is_symmetric_and_cached() {
        let mut be = fixed_param_estimator(
            ">a\nACGTACGTACGTACGT\n>b\nACGAACGTACGTACGT\n>c\nTTGTACGTACGAACGT\n",
        );
        let mut seqs = be.execute_hky85(2.0).unwrap();
        assert_eq!(seqs.pairs_computed(), 0);
        let ab = seqs.distance(0, 1);
        assert_eq!(seqs.pairs_computed(), 1);
        let ba = seqs.distance(1, 0);
        assert_eq!(
            seqs.pairs_computed(),
            1,
            "the reversed query must hit the cache"
        );
        assert_eq!(ab.to_bits(), ba.to_bits());
    }

    #[test]
    fn queries_resolve_by_name() {
        let mut be = fixed_param_estimator(
            ">beta\nACGTACGT\n>alpha\nACGTACGT\n>gamma\nACGAACGA\n",
        );
        let mut seqs = be.execute_hky85(2.0).unwrap();
        // Ids follow sorted names.
        assert_eq!(seqs.name(0), Some("alpha"));
        assert_eq!(seqs.name(1), Some("beta"));
        assert_eq!(seqs.sequence_by_name("gamma"), Some("ACGAACGA"));

        let by_names = seqs.distance_by_names("alpha", "beta");
        let by_ids = seqs.distance(0, 1);
        assert_eq!(by_names.to_bits(), by_ids.to_bits());

        assert!(seqs.distance_by_names("alpha", "delta").is_nan());
        assert!(seqs.last_error().unwrap().contains("delta"));
        // A successful call clears the slot.
        seqs.distance(0, 1);
        assert!(seqs.last_error().is_none());
    }

    #[test]
    fn out_of_range_queries_record_errors() {
        let mut be = fixed_param_estimator(">a\nACGT\n>b\nACGT\n>c\nACGT\n");
        let mut seqs = be.execute_hky85(2.0).unwrap();
        assert!(seqs.name(7).is_none());
        assert!(seqs.last_error().is_some());
        assert!(seqs.sequence(7).is_none());
        assert!(seqs.distance(0, 9).is_nan());
    }

    #[test]
    fn execute_without_input_fails() {
        let mut be = DistanceEstimator::new();
        assert!(be.execute_jtt().is_none());
        assert!(be.last_error().unwrap().contains("input"));
    }

    #[test]
    fn execution_clears_the_error_slot() {
        let mut be = DistanceEstimator::new();
        assert!(be.execute_jtt().is_none());
        assert!(be.last_error().is_some());
        be.set_indel_parameters(0.5, 0.02);
        be.set_alpha(0.5);
        assert!(be.set_input(">a\nACGT\n>b\nACGT\n>c\nACGA\n"));
        assert!(be.execute_hky85(2.0).is_some());
        assert!(be.last_error().is_none());
    }

    #[test]
    fn gtr_with_explicit_parameters_executes() {
        let mut be = fixed_param_estimator(
            ">a\nACGTACGTACGTACGT\n>b\nACGTACGAACGTACGT\n>c\nACGTACGTACTTACGT\n",
        );
        let mut seqs = be.execute_gtr([0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        let d = seqs.distance(0, 1);
        assert!(d.is_finite() && d > 0.0);
    }

    #[test]
    fn lg_and_wag_execute_on_protein_input() {
        for model in ["lg", "wag"] {
            let mut be = fixed_param_estimator(PROTEIN_FIXTURE);
            let mut seqs = match model {
                "lg" => be.execute_lg().unwrap(),
                _ => be.execute_wag().unwrap(),
            };
            let d = seqs.distance(0, 1);
            assert!(d.is_finite() && d >= 0.0, "{} distance = {}", model, d);
        }
    }

    #[test]
    fn protein_fixture_block_structure_under_jtt() {
        // Full pipeline with estimation: indel and alpha come from the
        // triplet pre-pass.
        let mut be = DistanceEstimator::new();
        assert!(be.set_input(PROTEIN_FIXTURE));
        let mut seqs = be.execute_jtt().expect("JTT execution failed");
        assert_eq!(seqs.count(), 5);

        let n = seqs.count();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                matrix[i][j] = seqs.distance(i, j);
                assert!(matrix[i][j].is_finite());
            }
        }

        // Symmetric with a zero diagonal.
        for i in 0..n {
            assert_eq!(matrix[i][i], 0.0);
            for j in 0..n {
                assert_eq!(matrix[i][j].to_bits(), matrix[j][i].to_bits());
            }
        }

        // Ids are name-sorted: H0, H21, H26, H35, H4.
        let h0 = 0;
        let h21 = 1;
        let h26 = 2;
        let h35 = 3;
        let h4 = 4;
        assert_eq!(seqs.name(h4), Some("H4"));

        // The conserved pair (H0, H4) is the closest pair overall.
        let closest = matrix[h0][h4];
        for i in 0..n {
            for j in (i + 1)..n {
                if (i, j) != (h0, h4) {
                    assert!(
                        closest < matrix[i][j],
                        "(H0, H4) = {} not the closest pair: ({}, {}) = {}",
                        closest,
                        i,
                        j,
                        matrix[i][j]
                    );
                }
            }
        }

        // Pairs inside the second block stay closer than cross-block
        // pairs.
        let within_block = matrix[h21][h26];
        for &cross in &[
            matrix[h0][h21],
            matrix[h0][h26],
            matrix[h0][h35],
            matrix[h4][h21],
            matrix[h4][h26],
            matrix[h4][h35],
        ] {
            assert!(
                within_block < cross,
                "within-block {} should undercut cross-block {}",
                within_block,
                cross
            );
        }
    }

    #[test]
    fn estimated_hky85_runs_the_pre_pass() {
        let mut be = DistanceEstimator::new();
        assert!(be.set_input(
            ">a\nACGTACGTACGTACGTACGTACGTACGTACGT\n\
             >b\nGCGTACGCACGTACGTATGTACGTACGCACGT\n\
             >c\nACATACGTACGTGCGTACGTACGTACGTACAT\n"
        ));
        let mut seqs = be.execute_hky85_estimated().expect("estimated HKY85 failed");
        let d = seqs.distance(0, 1);
        assert!(d.is_finite() && d > 0.0);
    }

    #[test]
    fn distance_matrix_text_is_lower_triangular() {
        let mut be = fixed_param_estimator(
            ">a\nACGTACGT\n>b\nACGTACGT\n>c\nACGAACGA\n",
        );
        let mut seqs = be.execute_hky85(2.0).unwrap();
        let text = seqs.distance_matrix().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "3");
        assert_eq!(lines[1], "a");
        assert_eq!(lines[2].split_whitespace().count(), 2);
        assert_eq!(lines[3].split_whitespace().count(), 3);
    }

    #[test]
    fn unset_restores_estimation_defaults() {
        let mut be = DistanceEstimator::new();
        be.set_alpha(1.0);
        be.set_categories(2);
        be.set_indel_parameters(0.4, 0.03);
        be.unset_alpha();
        be.unset_categories();
        be.unset_indel_parameters();
        assert!(be.set_input(PROTEIN_FIXTURE));
        // Everything unset means the pre-pass estimates the lot; the
        // execution must still succeed end to end.
        let mut seqs = be.execute_jtt().expect("estimated execution failed");
        let d = seqs.distance(0, 4);
        assert!(d.is_finite() && d >= 0.0);
    }
}
